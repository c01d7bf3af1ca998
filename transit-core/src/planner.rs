//! The Connection-Scan Planner (spec §4.6): earliest-arrival search over a
//! single mode's pre-sorted connection array.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate};
use itertools::Itertools;
use thiserror::Error;

use crate::calendar::CalendarOracle;
use crate::ids::StopId;
use crate::model::{Connection, Journey, Leg};
use crate::time::{Duration, Time};

/// Connections are re-checked for cancellation at this grain (spec §5).
const CANCEL_CHECK_INTERVAL: usize = 4096;

/// The default transfer-time floor enforced between two different trips at
/// the same stop (spec §4.6, §9's `min_transfer_secs` config option).
/// Transfer connections synthesised by the Connection Builder already
/// encode the feed's own minimum, so this only guards trip-to-trip
/// interchanges that do not go through an explicit Transfer record.
pub const DEFAULT_MIN_TRANSFER_SECS: i32 = 120;

/// How many calendar days the next-service search will advance before
/// giving up (spec §4.6).
const MAX_LOOKAHEAD_DAYS: u32 = 7;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("origin stop {0:?} is not present in this mode's connection array")]
    UnknownOrigin(StopId),
    #[error("destination stop {0:?} is not present in this mode's connection array")]
    UnknownDestination(StopId),
}

/// The outcome of one planner invocation, per the state machine in spec
/// §4.8: `Found` / `NoRoute` / `Exhausted` / `Cancelled`.
#[derive(Debug)]
pub enum PlanOutcome {
    Found(Journey),
    /// Origin and destination are not connected by any sequence of
    /// connections or transfers in this mode's graph, on any date. Reported
    /// immediately rather than burning `max_lookahead_days` of retries that
    /// can never succeed.
    NoRoute,
    NoServiceWithinLookahead,
    Cancelled,
}

/// A single mode's immutable, pre-sorted connection array plus the
/// calendar oracle it consults. Built once by the catalogue, scanned many
/// times, once per request (spec §5: read-only after construction).
pub struct ConnectionScanPlanner<'a> {
    connections: &'a [Connection],
    transfers: &'a HashMap<StopId, Vec<Connection>>,
    calendar: &'a CalendarOracle,
    stop_names: &'a HashMap<StopId, String>,
    min_transfer_secs: i32,
    max_lookahead_days: u32,
}

impl<'a> ConnectionScanPlanner<'a> {
    pub fn new(
        connections: &'a [Connection],
        transfers: &'a HashMap<StopId, Vec<Connection>>,
        calendar: &'a CalendarOracle,
        stop_names: &'a HashMap<StopId, String>,
    ) -> Self {
        ConnectionScanPlanner {
            connections,
            transfers,
            calendar,
            stop_names,
            min_transfer_secs: DEFAULT_MIN_TRANSFER_SECS,
            max_lookahead_days: MAX_LOOKAHEAD_DAYS,
        }
    }

    /// Override the transfer-time floor and next-service lookahead from
    /// their defaults (spec §9's `min_transfer_secs` / `max_next_day_search`
    /// config options).
    pub fn with_config(mut self, min_transfer_secs: i32, max_lookahead_days: u32) -> Self {
        self.min_transfer_secs = min_transfer_secs;
        self.max_lookahead_days = max_lookahead_days;
        self
    }

    /// Plan an earliest-arrival journey from `origin` to `destination`,
    /// departing no earlier than `earliest_departure` on `date`. Retries on
    /// subsequent days up to `MAX_LOOKAHEAD_DAYS` (spec §4.6's next-service
    /// search) before giving up.
    pub fn plan(
        &self,
        origin: &StopId,
        destination: &StopId,
        earliest_departure: Time,
        date: NaiveDate,
        cancel: &Arc<AtomicBool>,
    ) -> PlanOutcome {
        if origin == destination {
            return PlanOutcome::Found(zero_leg_journey(origin, earliest_departure, date));
        }

        if !self.is_structurally_reachable(origin, destination) {
            return PlanOutcome::NoRoute;
        }

        let mut day_offset = 0u32;
        let mut departure_floor = earliest_departure;
        loop {
            if day_offset > self.max_lookahead_days {
                return PlanOutcome::NoServiceWithinLookahead;
            }
            let scan_date = date + ChronoDuration::days(day_offset as i64);
            match self.scan_one_day(origin, destination, departure_floor, scan_date, cancel) {
                ScanResult::Found(mut journey) => {
                    journey.date_shifted_by_days = day_offset;
                    return PlanOutcome::Found(journey);
                }
                ScanResult::Cancelled => return PlanOutcome::Cancelled,
                ScanResult::NotFound => {
                    day_offset += 1;
                    departure_floor = Time::midnight();
                }
            }
        }
    }

    /// Calendar- and time-independent graph reachability: is there any
    /// sequence of connections or transfers at all linking `origin` to
    /// `destination`, ignoring service days and departure ordering? This is
    /// a necessary condition for `Found` on any date, so a `false` here
    /// means no amount of next-day retrying will ever help (spec §4.8's
    /// `NoRoute` state, distinct from `NoServiceWithinLookahead`).
    fn is_structurally_reachable(&self, origin: &StopId, destination: &StopId) -> bool {
        let mut adjacency: HashMap<&StopId, Vec<&StopId>> = HashMap::new();
        for connection in self.connections {
            adjacency.entry(&connection.from_stop).or_default().push(&connection.to_stop);
        }
        for (from_stop, footpaths) in self.transfers {
            adjacency.entry(from_stop).or_default().extend(footpaths.iter().map(|t| &t.to_stop));
        }

        let mut visited: HashSet<&StopId> = HashSet::new();
        let mut queue: VecDeque<&StopId> = VecDeque::new();
        visited.insert(origin);
        queue.push_back(origin);

        while let Some(stop) = queue.pop_front() {
            if stop == destination {
                return true;
            }
            if let Some(neighbours) = adjacency.get(stop) {
                for &next in neighbours {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }
        false
    }

    fn scan_one_day(
        &self,
        origin: &StopId,
        destination: &StopId,
        earliest_departure: Time,
        date: NaiveDate,
        cancel: &Arc<AtomicBool>,
    ) -> ScanResult {
        let mut earliest_arrival: HashMap<StopId, Time> = HashMap::new();
        earliest_arrival.insert(origin.clone(), earliest_departure);
        let mut incoming: HashMap<StopId, Connection> = HashMap::new();
        let mut best_arrival: Option<Time> = None;
        self.relax_footpaths(
            origin,
            earliest_departure,
            destination,
            &mut earliest_arrival,
            &mut incoming,
            &mut best_arrival,
        );

        for (index, connection) in self.wrap_aware_stream(date) {
            if index % CANCEL_CHECK_INTERVAL == 0 && cancel.load(AtomicOrdering::Relaxed) {
                return ScanResult::Cancelled;
            }

            if let Some(best) = best_arrival {
                if connection.departure > best {
                    break; // (e): early exit once nothing left can beat the best arrival
                }
            }

            let from_known = match earliest_arrival.get(&connection.from_stop) {
                Some(&t) => t,
                None => continue,
            };
            if connection.departure < from_known {
                continue; // (a) unreachable
            }

            // (b) service-day filtering already happened in `wrap_aware_stream`,
            // which knows whether each connection is being considered against
            // `date` or the previous day's wrapped tail.

            if let Some(prior) = incoming.get(&connection.from_stop) {
                if !prior.is_transfer()
                    && !same_trip(prior, &connection)
                    && (connection.departure.as_secs() - from_known.as_secs())
                        < self.min_transfer_secs as i64
                {
                    continue; // (c) transfer-time floor; a declared in-feed
                              // transfer already encodes its own minimum
                }
            }

            let improves_to = earliest_arrival
                .get(&connection.to_stop)
                .map_or(true, |&existing| connection.arrival < existing);
            if improves_to {
                earliest_arrival.insert(connection.to_stop.clone(), connection.arrival);
                incoming.insert(connection.to_stop.clone(), connection.clone());
                if &connection.to_stop == destination {
                    best_arrival = Some(connection.arrival);
                }
                self.relax_footpaths(
                    &connection.to_stop,
                    connection.arrival,
                    destination,
                    &mut earliest_arrival,
                    &mut incoming,
                    &mut best_arrival,
                );
            }
        }

        match best_arrival {
            Some(_) => match self.reconstruct(origin, destination, &incoming, earliest_departure)
            {
                Some(journey) => ScanResult::Found(journey),
                None => ScanResult::NotFound,
            },
            None => ScanResult::NotFound,
        }
    }

    /// Relax the footpath templates departing `stop` (spec §4.4 point 3)
    /// onto the actual time a rider reaches `stop`. A footpath has no
    /// scheduled departure of its own — it is available the instant the
    /// rider arrives — so unlike a transit connection it cannot wait to be
    /// scanned at its position in the pre-sorted array; it is relaxed
    /// immediately whenever `stop`'s earliest-arrival improves, including
    /// the very first relaxation from `origin` itself.
    fn relax_footpaths(
        &self,
        stop: &StopId,
        arrival_at_stop: Time,
        destination: &StopId,
        earliest_arrival: &mut HashMap<StopId, Time>,
        incoming: &mut HashMap<StopId, Connection>,
        best_arrival: &mut Option<Time>,
    ) {
        let templates = match self.transfers.get(stop) {
            Some(templates) => templates,
            None => return,
        };
        for template in templates {
            let walk_time = template.arrival - template.departure;
            let arrival_via_transfer = arrival_at_stop + walk_time;
            let improves = earliest_arrival
                .get(&template.to_stop)
                .map_or(true, |&existing| arrival_via_transfer < existing);
            if !improves {
                continue;
            }
            earliest_arrival.insert(template.to_stop.clone(), arrival_via_transfer);
            incoming.insert(
                template.to_stop.clone(),
                Connection {
                    from_stop: stop.clone(),
                    to_stop: template.to_stop.clone(),
                    departure: arrival_at_stop,
                    arrival: arrival_via_transfer,
                    trip_id: None,
                    route_id: None,
                    route_type: None,
                    service_id: None,
                },
            );
            if &template.to_stop == destination {
                *best_arrival = match *best_arrival {
                    Some(existing) if existing <= arrival_via_transfer => Some(existing),
                    _ => Some(arrival_via_transfer),
                };
            }
        }
    }

    /// The two-stream merge of spec §4.6: today's connections at their
    /// recorded time, merged with yesterday's next-day-wrap tail shifted
    /// back by 86,400s, both individually sorted by departure so the merge
    /// stays O(|C|).
    fn wrap_aware_stream(
        &self,
        date: NaiveDate,
    ) -> impl Iterator<Item = (usize, Connection)> + '_ {
        let previous_date = date - ChronoDuration::days(1);
        let today = self.connections.iter().filter(move |c| {
            c.service_id
                .as_ref()
                .map_or(true, |s| self.calendar.is_active(s, date))
        });
        let yesterdays_tail = self
            .connections
            .iter()
            .filter(|c| c.departure.is_next_day())
            .filter(move |c| {
                c.service_id
                    .as_ref()
                    .map_or(true, |s| self.calendar.is_active(s, previous_date))
            })
            .map(|c| shift_back_a_day(c));

        today
            .cloned()
            .merge_by(yesterdays_tail, |a, b| a.departure <= b.departure)
            .enumerate()
    }

    fn reconstruct(
        &self,
        origin: &StopId,
        destination: &StopId,
        incoming: &HashMap<StopId, Connection>,
        requested_departure: Time,
    ) -> Option<Journey> {
        let mut chain = Vec::new();
        let mut cursor = destination.clone();
        while &cursor != origin {
            let connection = incoming.get(&cursor)?;
            chain.push(connection.clone());
            cursor = connection.from_stop.clone();
        }
        chain.reverse();

        let legs = self.group_into_legs(chain);
        if legs.is_empty() {
            return None;
        }

        let first_transit = legs.iter().find(|l| !l.is_transfer);
        let last_transit = legs.iter().rev().find(|l| !l.is_transfer);
        let (departure_time, arrival_time) = match (first_transit, last_transit) {
            (Some(f), Some(l)) => (f.departure_time, l.arrival_time),
            _ => (requested_departure, requested_departure),
        };

        let mut duration = arrival_time.as_secs() - departure_time.as_secs();
        if duration < 0 {
            duration += 86_400;
        }

        Some(Journey {
            origin_stop: origin.clone(),
            destination_stop: destination.clone(),
            departure_time,
            arrival_time,
            duration_seconds: duration,
            num_transfers: legs.iter().filter(|l| l.is_transfer).count() as u32,
            legs,
            date_shifted_by_days: 0,
            valid_after_realtime: true,
            broken_transfer: None,
        })
    }

    /// Group a reconstructed chain of elementary connections into Legs:
    /// consecutive connections sharing a `trip_id` become one transit Leg. A
    /// trip boundary becomes a transfer Leg (spec §4.6 "Reconstruction") —
    /// either the explicit in-feed transfer connection that sits between
    /// the two trips, or, when no `transfers.txt` record covers the change
    /// (the rider simply waits for the next trip at the same platform), a
    /// synthetic dwell Leg spanning the interchange so every trip boundary
    /// still surfaces as one `is_transfer` Leg (I4/I5) rather than two
    /// transit Legs silently abutting.
    fn group_into_legs(&self, chain: Vec<Connection>) -> Vec<Leg> {
        let mut legs = Vec::new();
        let mut run: Vec<Connection> = Vec::new();

        for connection in chain {
            if connection.is_transfer() {
                if !run.is_empty() {
                    legs.push(self.transit_leg(std::mem::take(&mut run)));
                }
                legs.push(self.transfer_leg(&connection));
                continue;
            }
            if let Some(last) = run.last() {
                if last.trip_id != connection.trip_id {
                    let interchange = last.to_stop.clone();
                    let dwell_start = last.arrival;
                    let dwell_end = connection.departure;
                    legs.push(self.transit_leg(std::mem::take(&mut run)));
                    legs.push(self.dwell_leg(&interchange, dwell_start, dwell_end));
                }
            }
            run.push(connection);
        }
        if !run.is_empty() {
            legs.push(self.transit_leg(run));
        }
        legs
    }

    fn stop_name(&self, stop_id: &StopId) -> String {
        self.stop_names
            .get(stop_id)
            .cloned()
            .unwrap_or_else(|| stop_id.to_string())
    }

    fn transit_leg(&self, connections: Vec<Connection>) -> Leg {
        let first = connections.first().expect("non-empty run");
        let last = connections.last().expect("non-empty run");
        let intermediate_stops = connections[..connections.len() - 1]
            .iter()
            .map(|c| self.stop_name(&c.to_stop))
            .collect();

        Leg {
            from_stop: first.from_stop.clone(),
            from_stop_name: self.stop_name(&first.from_stop),
            to_stop: last.to_stop.clone(),
            to_stop_name: self.stop_name(&last.to_stop),
            departure_time: first.departure,
            arrival_time: last.arrival,
            trip_id: first.trip_id.clone(),
            route_id: first.route_id.clone(),
            route_short_name: None,
            route_type: first.route_type,
            is_transfer: false,
            is_declared_transfer: false,
            intermediate_stops,
            num_stops: connections.len() as u32 + 1,
            scheduled_departure: first.departure,
            scheduled_arrival: last.arrival,
            actual_departure: None,
            actual_arrival: None,
            delay_seconds: 0,
            cancelled: false,
            platform: None,
        }
    }

    fn transfer_leg(&self, connection: &Connection) -> Leg {
        Leg {
            from_stop: connection.from_stop.clone(),
            from_stop_name: self.stop_name(&connection.from_stop),
            to_stop: connection.to_stop.clone(),
            to_stop_name: self.stop_name(&connection.to_stop),
            departure_time: connection.departure,
            arrival_time: connection.arrival,
            trip_id: None,
            route_id: None,
            route_short_name: None,
            route_type: None,
            is_transfer: true,
            is_declared_transfer: true,
            intermediate_stops: Vec::new(),
            num_stops: 2,
            scheduled_departure: connection.departure,
            scheduled_arrival: connection.arrival,
            actual_departure: None,
            actual_arrival: None,
            delay_seconds: 0,
            cancelled: false,
            platform: None,
        }
    }

    /// A same-stop interchange with no `transfers.txt` record of its own:
    /// the rider just waits at `stop` for the next trip. `from_stop` and
    /// `to_stop` are both `stop` (spec §4.6's "`from_stop=to_stop=interchange`").
    fn dwell_leg(&self, stop: &StopId, depart_at: Time, arrive_at: Time) -> Leg {
        Leg {
            from_stop: stop.clone(),
            from_stop_name: self.stop_name(stop),
            to_stop: stop.clone(),
            to_stop_name: self.stop_name(stop),
            departure_time: depart_at,
            arrival_time: arrive_at,
            trip_id: None,
            route_id: None,
            route_short_name: None,
            route_type: None,
            is_transfer: true,
            is_declared_transfer: false,
            intermediate_stops: Vec::new(),
            num_stops: 2,
            scheduled_departure: depart_at,
            scheduled_arrival: arrive_at,
            actual_departure: None,
            actual_arrival: None,
            delay_seconds: 0,
            cancelled: false,
            platform: None,
        }
    }
}

enum ScanResult {
    Found(Journey),
    NotFound,
    Cancelled,
}

fn same_trip(a: &Connection, b: &Connection) -> bool {
    matches!((&a.trip_id, &b.trip_id), (Some(x), Some(y)) if x == y)
}

fn shift_back_a_day(connection: &Connection) -> Connection {
    let shift = Duration::seconds(-86_400);
    Connection {
        departure: connection.departure + shift,
        arrival: connection.arrival + shift,
        ..connection.clone()
    }
}

fn zero_leg_journey(stop: &StopId, at: Time, _date: NaiveDate) -> Journey {
    Journey {
        origin_stop: stop.clone(),
        destination_stop: stop.clone(),
        departure_time: at,
        arrival_time: at,
        duration_seconds: 0,
        num_transfers: 0,
        legs: Vec::new(),
        date_shifted_by_days: 0,
        valid_after_realtime: true,
        broken_transfer: None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::{RouteId, ServiceId, TripId};
    use std::sync::atomic::AtomicBool;

    fn always_active_calendar() -> CalendarOracle {
        CalendarOracle::new(vec![], vec![])
    }

    fn stop_names() -> HashMap<StopId, String> {
        [
            (StopId::from("A"), "Stop A".to_string()),
            (StopId::from("B"), "Stop B".to_string()),
            (StopId::from("C"), "Stop C".to_string()),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn finds_direct_connection() {
        let connections = vec![Connection {
            from_stop: StopId::from("A"),
            to_stop: StopId::from("B"),
            departure: Time::from_hms(10, 0, 0),
            arrival: Time::from_hms(10, 10, 0),
            trip_id: Some(TripId::from("T1")),
            route_id: Some(RouteId::from("R1")),
            route_type: Some(3),
            service_id: Some(ServiceId::from("S1")),
        }];
        let calendar = always_active_calendar();
        let names = stop_names();
        let transfers = HashMap::new();
        let planner = ConnectionScanPlanner::new(&connections, &transfers, &calendar, &names);
        let cancel = Arc::new(AtomicBool::new(false));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        match planner.plan(
            &StopId::from("A"),
            &StopId::from("B"),
            Time::from_hms(9, 0, 0),
            date,
            &cancel,
        ) {
            PlanOutcome::Found(journey) => {
                assert_eq!(journey.legs.len(), 1);
                assert!(!journey.legs[0].is_transfer);
                assert_eq!(journey.arrival_time, Time::from_hms(10, 10, 0));
            }
            other => panic!("expected a journey, got {:?}", other_debug(&other)),
        }
    }

    #[test]
    fn enforces_transfer_floor_between_different_trips() {
        let connections = vec![
            Connection {
                from_stop: StopId::from("A"),
                to_stop: StopId::from("B"),
                departure: Time::from_hms(10, 0, 0),
                arrival: Time::from_hms(10, 10, 0),
                trip_id: Some(TripId::from("T1")),
                route_id: Some(RouteId::from("R1")),
                route_type: Some(3),
                service_id: Some(ServiceId::from("S1")),
            },
            Connection {
                from_stop: StopId::from("B"),
                to_stop: StopId::from("C"),
                departure: Time::from_hms(10, 10, 30), // 30s later, below the 120s floor
                arrival: Time::from_hms(10, 20, 0),
                trip_id: Some(TripId::from("T2")),
                route_id: Some(RouteId::from("R2")),
                route_type: Some(3),
                service_id: Some(ServiceId::from("S1")),
            },
        ];
        let calendar = always_active_calendar();
        let names = stop_names();
        let transfers = HashMap::new();
        let planner = ConnectionScanPlanner::new(&connections, &transfers, &calendar, &names);
        let cancel = Arc::new(AtomicBool::new(false));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        match planner.plan(
            &StopId::from("A"),
            &StopId::from("C"),
            Time::from_hms(9, 0, 0),
            date,
            &cancel,
        ) {
            PlanOutcome::NoServiceWithinLookahead => {}
            other => panic!("expected no journey, got {:?}", other_debug(&other)),
        }
    }

    #[test]
    fn inserts_a_synthetic_dwell_leg_at_an_undeclared_trip_boundary() {
        let connections = vec![
            Connection {
                from_stop: StopId::from("A"),
                to_stop: StopId::from("B"),
                departure: Time::from_hms(10, 0, 0),
                arrival: Time::from_hms(10, 10, 0),
                trip_id: Some(TripId::from("T1")),
                route_id: Some(RouteId::from("R1")),
                route_type: Some(3),
                service_id: Some(ServiceId::from("S1")),
            },
            Connection {
                from_stop: StopId::from("B"),
                to_stop: StopId::from("C"),
                departure: Time::from_hms(10, 15, 0),
                arrival: Time::from_hms(10, 25, 0),
                trip_id: Some(TripId::from("T2")),
                route_id: Some(RouteId::from("R2")),
                route_type: Some(3),
                service_id: Some(ServiceId::from("S1")),
            },
        ];
        let calendar = always_active_calendar();
        let names = stop_names();
        let transfers = HashMap::new();
        let planner = ConnectionScanPlanner::new(&connections, &transfers, &calendar, &names);
        let cancel = Arc::new(AtomicBool::new(false));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        match planner.plan(
            &StopId::from("A"),
            &StopId::from("C"),
            Time::from_hms(9, 0, 0),
            date,
            &cancel,
        ) {
            PlanOutcome::Found(journey) => {
                // No transfers.txt record links T1 to T2, but the trip_id
                // change at B still has to surface as a transfer leg.
                assert_eq!(journey.num_transfers, 1);
                assert_eq!(journey.legs.len(), 3);
                assert!(!journey.legs[0].is_transfer);
                assert!(journey.legs[1].is_transfer);
                assert_eq!(journey.legs[1].from_stop, StopId::from("B"));
                assert_eq!(journey.legs[1].to_stop, StopId::from("B"));
                assert_eq!(journey.legs[1].departure_time, Time::from_hms(10, 10, 0));
                assert_eq!(journey.legs[1].arrival_time, Time::from_hms(10, 15, 0));
                assert!(!journey.legs[2].is_transfer);
            }
            other => panic!("expected a journey, got {:?}", other_debug(&other)),
        }
    }

    #[test]
    fn same_origin_and_destination_is_zero_leg() {
        let connections: Vec<Connection> = vec![];
        let calendar = always_active_calendar();
        let names = stop_names();
        let transfers = HashMap::new();
        let planner = ConnectionScanPlanner::new(&connections, &transfers, &calendar, &names);
        let cancel = Arc::new(AtomicBool::new(false));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        match planner.plan(
            &StopId::from("A"),
            &StopId::from("A"),
            Time::from_hms(9, 0, 0),
            date,
            &cancel,
        ) {
            PlanOutcome::Found(journey) => {
                assert!(journey.legs.is_empty());
                assert_eq!(journey.duration_seconds, 0);
            }
            other => panic!("expected a zero-leg journey, got {:?}", other_debug(&other)),
        }
    }

    #[test]
    fn disconnected_stop_reports_no_route_without_exhausting_lookahead() {
        let connections = vec![Connection {
            from_stop: StopId::from("A"),
            to_stop: StopId::from("B"),
            departure: Time::from_hms(10, 0, 0),
            arrival: Time::from_hms(10, 10, 0),
            trip_id: Some(TripId::from("T1")),
            route_id: Some(RouteId::from("R1")),
            route_type: Some(3),
            service_id: Some(ServiceId::from("S1")),
        }];
        let calendar = always_active_calendar();
        let names = stop_names();
        let transfers = HashMap::new();
        let planner = ConnectionScanPlanner::new(&connections, &transfers, &calendar, &names);
        let cancel = Arc::new(AtomicBool::new(false));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        // "ISOLATED" never appears in any connection or transfer, so no
        // date could ever connect it to "A".
        match planner.plan(
            &StopId::from("A"),
            &StopId::from("ISOLATED"),
            Time::from_hms(9, 0, 0),
            date,
            &cancel,
        ) {
            PlanOutcome::NoRoute => {}
            other => panic!("expected NoRoute, got {:?}", other_debug(&other)),
        }
    }

    #[test]
    fn uses_a_declared_transfer_to_bridge_two_trips() {
        // T1 reaches B at 10:05; a transfers.txt record says B -> C takes a
        // minimum of 180s on foot; T2 leaves C at 10:10, which only a
        // footpath relaxed at the moment of arrival (not a fixed position in
        // the sorted connection array) can make reachable.
        let connections = vec![
            Connection {
                from_stop: StopId::from("A"),
                to_stop: StopId::from("B"),
                departure: Time::from_hms(10, 0, 0),
                arrival: Time::from_hms(10, 5, 0),
                trip_id: Some(TripId::from("T1")),
                route_id: Some(RouteId::from("R1")),
                route_type: Some(3),
                service_id: Some(ServiceId::from("S1")),
            },
            Connection {
                from_stop: StopId::from("C"),
                to_stop: StopId::from("D"),
                departure: Time::from_hms(10, 10, 0),
                arrival: Time::from_hms(10, 20, 0),
                trip_id: Some(TripId::from("T2")),
                route_id: Some(RouteId::from("R2")),
                route_type: Some(3),
                service_id: Some(ServiceId::from("S1")),
            },
        ];
        let mut transfers = HashMap::new();
        transfers.insert(
            StopId::from("B"),
            vec![Connection {
                from_stop: StopId::from("B"),
                to_stop: StopId::from("C"),
                departure: Time::midnight(),
                arrival: Time::midnight() + Duration::seconds(180),
                trip_id: None,
                route_id: None,
                route_type: None,
                service_id: None,
            }],
        );
        let calendar = always_active_calendar();
        let names = stop_names();
        let planner = ConnectionScanPlanner::new(&connections, &transfers, &calendar, &names);
        let cancel = Arc::new(AtomicBool::new(false));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        match planner.plan(
            &StopId::from("A"),
            &StopId::from("D"),
            Time::from_hms(9, 0, 0),
            date,
            &cancel,
        ) {
            PlanOutcome::Found(journey) => {
                assert_eq!(journey.num_transfers, 1);
                assert_eq!(journey.legs.len(), 3);
                assert!(!journey.legs[0].is_transfer);
                assert!(journey.legs[1].is_transfer);
                assert_eq!(journey.legs[1].from_stop, StopId::from("B"));
                assert_eq!(journey.legs[1].to_stop, StopId::from("C"));
                assert_eq!(journey.legs[1].departure_time, Time::from_hms(10, 5, 0));
                assert_eq!(journey.legs[1].arrival_time, Time::from_hms(10, 8, 0));
                assert!(!journey.legs[2].is_transfer);
                assert_eq!(journey.arrival_time, Time::from_hms(10, 20, 0));
            }
            other => panic!("expected a journey, got {:?}", other_debug(&other)),
        }
    }

    #[test]
    fn declared_transfer_exempts_the_120s_floor() {
        // The transfer's own 60s is below DEFAULT_MIN_TRANSFER_SECS (120s);
        // because it is a declared transfer and not a same-trip hop, the
        // floor must not apply on top of it (spec §4.6 point c).
        let connections = vec![
            Connection {
                from_stop: StopId::from("A"),
                to_stop: StopId::from("B"),
                departure: Time::from_hms(10, 0, 0),
                arrival: Time::from_hms(10, 5, 0),
                trip_id: Some(TripId::from("T1")),
                route_id: Some(RouteId::from("R1")),
                route_type: Some(3),
                service_id: Some(ServiceId::from("S1")),
            },
            Connection {
                from_stop: StopId::from("C"),
                to_stop: StopId::from("D"),
                departure: Time::from_hms(10, 6, 0),
                arrival: Time::from_hms(10, 20, 0),
                trip_id: Some(TripId::from("T2")),
                route_id: Some(RouteId::from("R2")),
                route_type: Some(3),
                service_id: Some(ServiceId::from("S1")),
            },
        ];
        let mut transfers = HashMap::new();
        transfers.insert(
            StopId::from("B"),
            vec![Connection {
                from_stop: StopId::from("B"),
                to_stop: StopId::from("C"),
                departure: Time::midnight(),
                arrival: Time::midnight() + Duration::seconds(60),
                trip_id: None,
                route_id: None,
                route_type: None,
                service_id: None,
            }],
        );
        let calendar = always_active_calendar();
        let names = stop_names();
        let planner = ConnectionScanPlanner::new(&connections, &transfers, &calendar, &names);
        let cancel = Arc::new(AtomicBool::new(false));
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        match planner.plan(
            &StopId::from("A"),
            &StopId::from("D"),
            Time::from_hms(9, 0, 0),
            date,
            &cancel,
        ) {
            PlanOutcome::Found(journey) => assert_eq!(journey.num_transfers, 1),
            other => panic!("expected a journey, got {:?}", other_debug(&other)),
        }
    }

    fn other_debug(outcome: &PlanOutcome) -> &'static str {
        match outcome {
            PlanOutcome::Found(_) => "Found",
            PlanOutcome::NoRoute => "NoRoute",
            PlanOutcome::NoServiceWithinLookahead => "NoServiceWithinLookahead",
            PlanOutcome::Cancelled => "Cancelled",
        }
    }
}
