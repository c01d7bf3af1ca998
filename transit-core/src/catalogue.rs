//! The Multi-Mode Catalogue (spec §4.2): merges one or more mode-scoped
//! GTFS bundles into a single read-only view with a uniform lookup API.

use std::collections::HashMap;

use crate::calendar::CalendarOracle;
use crate::connections::{build_connections, build_transfer_templates};
use crate::ids::{mode_tag, ModeTag, RouteId, ServiceId, StopId, TripId};
use crate::model::{
    Calendar, CalendarException, Connection, Route, Stop, StopTime, TransferRecord, Trip,
};

/// One mode-scoped bundle handed to [`CatalogueBuilder::add_bundle`]: the
/// records a single invocation of the Schedule Loader (spec §4.1) produced.
pub struct LoadedBundle {
    pub mode_tag: String,
    pub stops: Vec<Stop>,
    pub routes: Vec<Route>,
    pub trips: Vec<Trip>,
    pub stop_times: Vec<StopTime>,
    pub calendars: Vec<Calendar>,
    pub calendar_exceptions: Vec<CalendarException>,
    pub transfers: Vec<TransferRecord>,
}

/// Which of two bundles a merged entity's record came from, kept so
/// mode-scoped planning (spec §4.8) can partition the connection array by
/// origin mode.
#[derive(Debug, Clone)]
struct Origin {
    mode_tag: ModeTag,
}

#[derive(Default)]
pub struct CatalogueBuilder {
    stops: HashMap<StopId, (Stop, Origin)>,
    routes: HashMap<RouteId, (Route, Origin)>,
    trips: HashMap<TripId, (Trip, Origin)>,
    stop_times: HashMap<TripId, Vec<StopTime>>,
    calendars: Vec<Calendar>,
    calendar_exceptions: Vec<CalendarException>,
    transfers: Vec<TransferRecord>,
    stop_order: Vec<StopId>,
}

impl CatalogueBuilder {
    pub fn new() -> CatalogueBuilder {
        CatalogueBuilder::default()
    }

    /// Merge one loaded bundle in. Bundles should be added in the order
    /// they were listed in configuration; the merge policy favours the
    /// earlier-listed bundle on a genuine id collision (spec §4.2).
    pub fn add_bundle(&mut self, bundle: LoadedBundle) {
        let mode = mode_tag(&bundle.mode_tag);

        for stop in bundle.stops {
            // `Stop`'s `PartialEq` is id-only (see model.rs), so the
            // byte-identical dedupe check here compares every field itself.
            merge_entity(&mut self.stops, stop.stop_id.clone(), stop, &mode, "stop", |a, b| {
                a.name == b.name
                    && a.latitude == b.latitude
                    && a.longitude == b.longitude
                    && a.platform == b.platform
                    && a.mode_tag == b.mode_tag
            });
        }
        for route in bundle.routes {
            merge_entity(&mut self.routes, route.route_id.clone(), route, &mode, "route", PartialEq::eq);
        }
        for trip in bundle.trips {
            merge_entity(&mut self.trips, trip.trip_id.clone(), trip, &mode, "trip", PartialEq::eq);
        }
        for stop_time in bundle.stop_times {
            self.stop_times
                .entry(stop_time.trip_id.clone())
                .or_default()
                .push(stop_time);
        }
        self.calendars.extend(bundle.calendars);
        self.calendar_exceptions.extend(bundle.calendar_exceptions);
        self.transfers.extend(bundle.transfers);
    }

    /// Build the connection array for every mode and hand back the
    /// immutable catalogue. Stop insertion order is preserved in
    /// `stop_order` for a deterministic `iter_stops()`.
    pub fn build(mut self) -> Catalogue {
        self.stop_order = self.stops.keys().cloned().collect();
        self.stop_order.sort();

        let route_lookup: HashMap<TripId, (RouteId, ServiceId, crate::model::RouteType)> = self
            .trips
            .iter()
            .filter_map(|(trip_id, (trip, _))| {
                self.routes
                    .get(&trip.route_id)
                    .map(|(route, _)| (trip_id.clone(), (route.route_id.clone(), trip.service_id.clone(), route.route_type)))
            })
            .collect();

        let connections = build_connections(&self.stop_times, |trip_id| {
            route_lookup.get(trip_id).cloned()
        });
        let transfer_templates = build_transfer_templates(&self.transfers);

        let stop_names = self
            .stops
            .iter()
            .map(|(id, (stop, _))| (id.clone(), stop.name.clone()))
            .collect();

        let calendar = CalendarOracle::new(self.calendars, self.calendar_exceptions);

        let stops: HashMap<StopId, Stop> =
            self.stops.into_iter().map(|(k, (v, _))| (k, v)).collect();
        let routes: HashMap<RouteId, Route> =
            self.routes.into_iter().map(|(k, (v, _))| (k, v)).collect();
        let trips: HashMap<TripId, Trip> =
            self.trips.into_iter().map(|(k, (v, _))| (k, v)).collect();

        let connections_by_mode = partition_by_mode(&connections, &trips, &routes);
        let transfer_templates_by_mode = partition_transfers_by_mode(&transfer_templates, &stops);

        Catalogue {
            stops,
            routes,
            trips,
            stop_times: self.stop_times,
            connections,
            connections_by_mode,
            transfer_templates,
            transfer_templates_by_mode,
            calendar,
            stop_names,
            stop_order: self.stop_order,
        }
    }
}

/// A transit connection's mode is the mode of the trip that produced it,
/// found via its route (every connection here came from `build_connections`,
/// which only ever emits transit legs — transfer templates are mode-scoped
/// separately by [`partition_transfers_by_mode`]).
fn connection_mode(
    connection: &Connection,
    trips: &HashMap<TripId, Trip>,
    routes: &HashMap<RouteId, Route>,
) -> Option<ModeTag> {
    connection
        .trip_id
        .as_ref()
        .and_then(|trip_id| trips.get(trip_id))
        .and_then(|trip| routes.get(&trip.route_id))
        .map(|route| route.mode_tag.clone())
}

/// Partition the merged connection array by mode once at build time (spec
/// §4.8: each mode-scoped planner only scans the connections that belong
/// to its mode), so per-request planning never has to re-filter.
fn partition_by_mode(
    connections: &[Connection],
    trips: &HashMap<TripId, Trip>,
    routes: &HashMap<RouteId, Route>,
) -> HashMap<ModeTag, Vec<Connection>> {
    let mut by_mode: HashMap<ModeTag, Vec<Connection>> = HashMap::new();
    for connection in connections {
        if let Some(mode) = connection_mode(connection, trips, routes) {
            by_mode.entry(mode).or_default().push(connection.clone());
        }
    }
    by_mode
}

/// Partition the transfer-template adjacency by mode, same rationale as
/// [`partition_by_mode`]: a footpath is scoped to the mode of the stop it
/// departs from, so it never lets one mode's planner hop into another's
/// (spec §9 defers cross-mode chaining).
fn partition_transfers_by_mode(
    transfer_templates: &HashMap<StopId, Vec<Connection>>,
    stops: &HashMap<StopId, Stop>,
) -> HashMap<ModeTag, HashMap<StopId, Vec<Connection>>> {
    let mut by_mode: HashMap<ModeTag, HashMap<StopId, Vec<Connection>>> = HashMap::new();
    for (from_stop, templates) in transfer_templates {
        if let Some(stop) = stops.get(from_stop) {
            by_mode
                .entry(stop.mode_tag.clone())
                .or_default()
                .insert(from_stop.clone(), templates.clone());
        }
    }
    by_mode
}

/// Insert one record, applying the merge policy of spec §4.2: a
/// byte-identical record already present is silently deduped; a
/// conflicting one keeps the earlier-listed bundle's record and logs a
/// warning naming both sources.
fn merge_entity<K, V>(
    map: &mut HashMap<K, (V, Origin)>,
    id: K,
    record: V,
    mode: &ModeTag,
    kind: &str,
    content_eq: impl Fn(&V, &V) -> bool,
) where
    K: Clone + std::fmt::Display + Eq + std::hash::Hash,
{
    match map.get(&id) {
        None => {
            map.insert(
                id,
                (
                    record,
                    Origin {
                        mode_tag: mode.clone(),
                    },
                ),
            );
        }
        Some((existing, _)) if content_eq(existing, &record) => {
            // byte-identical record in both bundles: silent dedupe (spec §4.2)
        }
        Some((_, origin)) => {
            log::warn!(
                "duplicate {} id {} from mode {:?}; keeping the earlier-listed bundle's record from mode {:?}",
                kind,
                id,
                mode,
                origin.mode_tag,
            );
        }
    }
}

/// The merged, read-only view spec §4.2 calls for. Built once at process
/// start and shared (by reference) across every subsequent request (spec
/// §5).
pub struct Catalogue {
    stops: HashMap<StopId, Stop>,
    routes: HashMap<RouteId, Route>,
    trips: HashMap<TripId, Trip>,
    stop_times: HashMap<TripId, Vec<StopTime>>,
    connections: Vec<Connection>,
    connections_by_mode: HashMap<ModeTag, Vec<Connection>>,
    transfer_templates: HashMap<StopId, Vec<Connection>>,
    transfer_templates_by_mode: HashMap<ModeTag, HashMap<StopId, Vec<Connection>>>,
    calendar: CalendarOracle,
    stop_names: HashMap<StopId, String>,
    stop_order: Vec<StopId>,
}

static EMPTY_TRANSFER_TEMPLATES: std::sync::OnceLock<HashMap<StopId, Vec<Connection>>> =
    std::sync::OnceLock::new();

impl Catalogue {
    pub fn get_stop(&self, id: &StopId) -> Option<&Stop> {
        self.stops.get(id)
    }

    pub fn get_route(&self, id: &RouteId) -> Option<&Route> {
        self.routes.get(id)
    }

    pub fn get_trip(&self, id: &TripId) -> Option<&Trip> {
        self.trips.get(id)
    }

    pub fn iter_stop_times(&self, trip_id: &TripId) -> &[StopTime] {
        self.stop_times
            .get(trip_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn iter_stops(&self) -> impl Iterator<Item = &Stop> {
        self.stop_order.iter().filter_map(move |id| self.stops.get(id))
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// The pre-partitioned connection array for one mode (spec §4.8): a
    /// mode-scoped planner scans only this slice, never the full catalogue.
    pub fn connections_for_mode(&self, mode_tag: &ModeTag) -> &[Connection] {
        self.connections_by_mode
            .get(mode_tag)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn modes(&self) -> impl Iterator<Item = &ModeTag> {
        self.connections_by_mode.keys()
    }

    /// The full transfer-template adjacency, unpartitioned (spec §4.4 point
    /// 3). Most callers want [`Catalogue::transfer_templates_for_mode`].
    pub fn transfer_templates(&self) -> &HashMap<StopId, Vec<Connection>> {
        &self.transfer_templates
    }

    /// The transfer-template adjacency scoped to one mode, mirroring
    /// [`Catalogue::connections_for_mode`]: a mode-scoped planner only
    /// relaxes footpaths that depart from a stop of its own mode.
    pub fn transfer_templates_for_mode(&self, mode_tag: &ModeTag) -> &HashMap<StopId, Vec<Connection>> {
        self.transfer_templates_by_mode
            .get(mode_tag)
            .unwrap_or_else(|| EMPTY_TRANSFER_TEMPLATES.get_or_init(HashMap::new))
    }

    pub fn calendar(&self) -> &CalendarOracle {
        &self.calendar
    }

    pub fn stop_names(&self) -> &HashMap<StopId, String> {
        &self.stop_names
    }
}
