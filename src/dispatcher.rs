//! The Multi-Mode Dispatcher (spec §4.8): resolves a request's origin and
//! destination against the Stop Index, fans a single journey query out to
//! every requested mode's [`ConnectionScanPlanner`] in parallel, applies the
//! Real-time Overlay where asked, and assembles the per-mode result map.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{NaiveDate, Timelike};
use rayon::prelude::*;

use transit_core::catalogue::{Catalogue, CatalogueBuilder, LoadedBundle};
use transit_core::ids::ModeTag;
use transit_core::model::Stop;
use transit_core::planner::{ConnectionScanPlanner, PlanOutcome};
use transit_core::stop_index::StopIndex;
use transit_core::time::Time;

use crate::api::{JourneyRequest, JourneyResponse, ModeOutcome, ModeResults, StopView};
use crate::config::Config;
use crate::error::{LoadError, RequestError};
use crate::realtime::{self, RealtimeClient};
use crate::loader;

/// How many fuzzy suggestions accompany an origin/destination-not-found
/// error (spec §4.3/§6).
const SUGGESTION_LIMIT: usize = 5;

/// Owns the merged catalogue and stop index for the lifetime of the
/// process and answers journey requests against them (spec §5: read-only
/// after construction, safe to share across concurrent requests).
pub struct Dispatcher {
    catalogue: Catalogue,
    stop_index: StopIndex,
    realtime: Option<RealtimeClient>,
    realtime_urls: std::collections::HashMap<ModeTag, String>,
    request_timeout: StdDuration,
    min_transfer_secs: i32,
    max_lookahead_days: u32,
    fuzzy_min_score: u8,
}

impl Dispatcher {
    /// Load every configured mode bundle (spec §4.2), merge them into one
    /// catalogue, build the stop index over it, and assemble a dispatcher
    /// ready to answer requests. This is the usual entry point a binary
    /// wiring this crate reaches for; [`Dispatcher::new`] remains available
    /// for callers that already have a `Catalogue` built some other way.
    pub fn build(config: Config) -> Result<Dispatcher, LoadError> {
        let mut builder = CatalogueBuilder::new();
        for bundle_config in &config.bundles {
            let records = loader::load(&bundle_config.feed_path, &bundle_config.mode_tag)?;
            builder.add_bundle(LoadedBundle {
                mode_tag: bundle_config.mode_tag.clone(),
                stops: records.stops,
                routes: records.routes,
                trips: records.trips,
                stop_times: records.stop_times,
                calendars: records.calendars,
                calendar_exceptions: records.calendar_exceptions,
                transfers: records.transfers,
            });
        }
        let catalogue = builder.build();
        let stop_index =
            StopIndex::build(catalogue.iter_stops().map(|stop| (&stop.stop_id, stop.name.as_str())));
        Ok(Dispatcher::new(catalogue, stop_index, &config))
    }

    /// Assemble a dispatcher from an already-built catalogue, the stop
    /// index derived from it, and the process configuration (spec §9).
    pub fn new(catalogue: Catalogue, stop_index: StopIndex, config: &Config) -> Dispatcher {
        let realtime_urls = config
            .bundles
            .iter()
            .filter_map(|b| b.realtime_url.clone().map(|url| (transit_core::ids::mode_tag(&b.mode_tag), url)))
            .collect();

        Dispatcher {
            catalogue,
            stop_index,
            realtime: RealtimeClient::new(config.realtime_api_key.clone())
                .map(|client| client.with_cache_ttl(config.realtime_cache_ttl)),
            realtime_urls,
            request_timeout: config.request_timeout,
            min_transfer_secs: config.min_transfer_secs,
            max_lookahead_days: config.max_next_day_search,
            fuzzy_min_score: config.fuzzy_min_score,
        }
    }

    /// Answer one journey request (spec §4.8): resolve stops, then plan
    /// independently against every mode the request asks for (or every mode
    /// the catalogue knows, when `modes` is unset).
    pub fn plan(&self, request: &JourneyRequest) -> Result<ModeResults, RequestError> {
        let origin = self.resolve_stop(&request.origin_query, Endpoint::Origin)?;
        let destination = self.resolve_stop(&request.destination_query, Endpoint::Destination)?;

        let date = parse_date(&request.date)?;
        let departure_time = parse_time(&request.departure_time)?;

        let requested_modes: Vec<ModeTag> = match &request.modes {
            Some(names) => names.iter().map(transit_core::ids::mode_tag).collect(),
            None => self.catalogue.modes().cloned().collect(),
        };

        let results: Vec<(ModeTag, ModeOutcome)> = requested_modes
            .par_iter()
            .map(|mode| {
                let outcome = self.plan_one_mode(mode, &origin, &destination, departure_time, date, request.realtime);
                (mode.clone(), outcome)
            })
            .collect();

        Ok(results.into_iter().collect())
    }

    fn plan_one_mode(
        &self,
        mode: &ModeTag,
        origin: &Stop,
        destination: &Stop,
        departure_time: Time,
        date: NaiveDate,
        want_realtime: bool,
    ) -> ModeOutcome {
        let connections = self.catalogue.connections_for_mode(mode);
        let transfers = self.catalogue.transfer_templates_for_mode(mode);
        let planner = ConnectionScanPlanner::new(
            connections,
            transfers,
            self.catalogue.calendar(),
            self.catalogue.stop_names(),
        )
        .with_config(self.min_transfer_secs, self.max_lookahead_days);

        let cancel = Arc::new(AtomicBool::new(false));
        let timeout_cancel = cancel.clone();
        let timeout = self.request_timeout;
        let timer = thread::spawn(move || {
            thread::sleep(timeout);
            timeout_cancel.store(true, Ordering::SeqCst);
        });

        let outcome = planner.plan(&origin.stop_id, &destination.stop_id, departure_time, date, &cancel);

        // The scan finished on its own; the timer thread would otherwise
        // outlive this request for no reason.
        cancel.store(true, Ordering::SeqCst);
        let _ = timer.join();

        match outcome {
            PlanOutcome::Cancelled => ModeOutcome::absent("Timeout"),
            PlanOutcome::NoRoute => ModeOutcome::absent(&RequestError::NoRouteAvailable.to_string()),
            PlanOutcome::NoServiceWithinLookahead => {
                ModeOutcome::absent(&RequestError::NoServiceWithinLookahead.to_string())
            }
            PlanOutcome::Found(mut journey) => {
                let mut has_realtime = false;
                if want_realtime {
                    has_realtime = self.apply_realtime(mode, &mut journey);
                }
                self.backfill_route_names(&mut journey);

                let origin_view = self.stop_view(&journey.origin_stop);
                let destination_view = self.stop_view(&journey.destination_stop);
                ModeOutcome::found(JourneyResponse::from_journey(&journey, origin_view, destination_view, has_realtime))
            }
        }
    }

    /// Fetch and apply this mode's real-time feed, if the dispatcher has
    /// both a client and a URL configured for it (spec §4.7). Any fetch or
    /// decode failure leaves the scheduled journey untouched — the overlay
    /// never turns a found journey into an error.
    fn apply_realtime(&self, mode: &ModeTag, journey: &mut transit_core::model::Journey) -> bool {
        let (Some(client), Some(url)) = (&self.realtime, self.realtime_urls.get(mode)) else {
            return false;
        };
        let bytes = match client.fetch(mode.as_ref(), url) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("real-time fetch failed for mode {mode}: {err}");
                return false;
            }
        };
        let updates = match realtime::decode(&bytes, mode.as_ref()) {
            Ok(updates) => updates,
            Err(err) => {
                log::warn!("real-time decode failed for mode {mode}: {err}");
                return false;
            }
        };
        realtime::apply(journey, &updates)
    }

    /// A planner only ever sets `route_id`, never `route_short_name` (it
    /// has no access to the route table). Fill it in from the catalogue
    /// once a journey is found, rather than threading the whole `Route`
    /// table through the scan's hot loop.
    fn backfill_route_names(&self, journey: &mut transit_core::model::Journey) {
        for leg in &mut journey.legs {
            if let Some(route_id) = &leg.route_id {
                if let Some(route) = self.catalogue.get_route(route_id) {
                    leg.route_short_name = Some(route.short_name.clone());
                }
            }
        }
    }

    fn stop_view(&self, stop_id: &transit_core::ids::StopId) -> StopView {
        match self.catalogue.get_stop(stop_id) {
            Some(stop) => StopView {
                id: stop.stop_id.clone(),
                name: stop.name.clone(),
                lat: stop.latitude,
                lon: stop.longitude,
                platform: stop.platform.clone(),
            },
            None => StopView {
                id: stop_id.clone(),
                name: stop_id.to_string(),
                lat: 0.0,
                lon: 0.0,
                platform: None,
            },
        }
    }

    /// Resolve a free-text query to one stop (spec §4.3/§4.8): an exact
    /// name match wins outright; otherwise the best fuzzy match above the
    /// configured floor is taken, and a miss reports the top candidates as
    /// suggestions.
    fn resolve_stop(&self, query: &str, endpoint: Endpoint) -> Result<Stop, RequestError> {
        if let Some(stop_id) = self.stop_index.lookup_exact(query).into_iter().next() {
            if let Some(stop) = self.catalogue.get_stop(&stop_id) {
                return Ok(stop.clone());
            }
        }

        let fuzzy = self.stop_index.lookup_fuzzy(query, SUGGESTION_LIMIT, Some(self.fuzzy_min_score));
        if let Some((stop_id, _, _)) = fuzzy.first() {
            if let Some(stop) = self.catalogue.get_stop(stop_id) {
                return Ok(stop.clone());
            }
        }

        let suggestions = fuzzy.into_iter().map(|(_, name, _)| name).collect();
        Err(match endpoint {
            Endpoint::Origin => RequestError::OriginNotFound { query: query.to_string(), suggestions },
            Endpoint::Destination => RequestError::DestinationNotFound { query: query.to_string(), suggestions },
        })
    }
}

#[derive(Clone, Copy)]
enum Endpoint {
    Origin,
    Destination,
}

/// `YYYY-MM-DD` or the literal `"today"` (spec §6). There is no wall-clock
/// access inside `transit-core`, so "today" is resolved here at the
/// dispatcher boundary.
fn parse_date(raw: &str) -> Result<NaiveDate, RequestError> {
    if raw.eq_ignore_ascii_case("today") {
        return Ok(chrono::Local::now().date_naive());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| RequestError::BadRequest(format!("unparseable date: {raw}")))
}

/// `HH:MM[:SS]` or the literal `"now"` (spec §6). `Time`'s own `FromStr`
/// only accepts the `:SS` form, so a bare `HH:MM` gets `:00` appended here
/// before parsing.
fn parse_time(raw: &str) -> Result<Time, RequestError> {
    if raw.eq_ignore_ascii_case("now") {
        let now = chrono::Local::now().time();
        return Ok(Time::from_secs(now.num_seconds_from_midnight() as i64));
    }
    let with_seconds = match raw.matches(':').count() {
        1 => format!("{raw}:00"),
        _ => raw.to_string(),
    };
    with_seconds
        .parse::<Time>()
        .map_err(|_| RequestError::BadRequest(format!("unparseable time: {raw}")))
}
