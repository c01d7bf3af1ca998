//! The Connection Builder (spec §4.4): turns per-trip stop times into the
//! flat, time-sorted array of elementary connections the planner scans.

use std::collections::HashMap;

use crate::ids::{StopId, TripId};
use crate::model::{Connection, StopTime, TransferRecord};
use crate::time::Time;

/// Build the connection array for one mode's trips, stable-sorted by
/// `departure_time` ascending, then `arrival_time`, then `from_stop_id`,
/// then `trip_id` (spec §4.4 — this ordering is the scan's single source
/// of truth). Transfer connections are built separately by
/// [`build_transfer_templates`]: an in-feed transfer has no departure time
/// of its own, so it cannot share this array's "scan in temporal order"
/// contract (see that function's docs).
pub fn build_connections(
    stop_times_by_trip: &HashMap<TripId, Vec<StopTime>>,
    route_lookup: impl Fn(&TripId) -> Option<(crate::ids::RouteId, crate::ids::ServiceId, crate::model::RouteType)>,
) -> Vec<Connection> {
    let mut connections = Vec::new();

    for (trip_id, stop_times) in stop_times_by_trip {
        let (route_id, service_id, route_type) = match route_lookup(trip_id) {
            Some(found) => found,
            None => continue, // unresolved trip reference; loader already flagged this
        };
        // stop_times are sorted by stop_sequence by the loader (invariant I2);
        // a defensive sort here keeps the builder correct even if a caller
        // hands in an unsorted slice.
        let mut stop_times = stop_times.clone();
        stop_times.sort_by_key(|st| st.stop_sequence);

        for pair in stop_times.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            connections.push(Connection {
                from_stop: a.stop_id.clone(),
                to_stop: b.stop_id.clone(),
                departure: a.departure_time,
                arrival: b.arrival_time,
                trip_id: Some(trip_id.clone()),
                route_id: Some(route_id.clone()),
                route_type: Some(route_type),
                service_id: Some(service_id.clone()),
            });
        }
    }

    sort_connections(&mut connections);
    connections
}

/// Build the per-stop adjacency of in-feed transfers (spec §4.4 point 3):
/// keyed by `from_stop_id`, each template's own `departure`/`arrival` are
/// placeholders (`arrival - departure == min_transfer_time`) rather than a
/// literal point in the schedule — a transfer connection becomes available
/// the instant a rider reaches its `from_stop`, which varies request to
/// request, so it cannot be scanned at a fixed position in the pre-sorted
/// connection array the way a transit connection can. Spec §4.4's own
/// parenthetical says as much: "absolute times are assigned dynamically by
/// the planner when it considers the transfer". The planner re-bases each
/// template onto the actual arrival time at its `from_stop` as it scans.
pub fn build_transfer_templates(transfers: &[TransferRecord]) -> HashMap<StopId, Vec<Connection>> {
    let mut by_stop: HashMap<StopId, Vec<Connection>> = HashMap::new();
    for transfer in transfers {
        let min_transfer = transfer.min_transfer_time.unwrap_or_default();
        by_stop
            .entry(transfer.from_stop_id.clone())
            .or_default()
            .push(Connection {
                from_stop: transfer.from_stop_id.clone(),
                to_stop: transfer.to_stop_id.clone(),
                departure: Time::midnight(),
                arrival: Time::midnight() + min_transfer,
                trip_id: None,
                route_id: None,
                route_type: None,
                service_id: None,
            });
    }
    by_stop
}

fn sort_connections(connections: &mut [Connection]) {
    connections.sort_by(|a, b| {
        a.departure
            .cmp(&b.departure)
            .then_with(|| a.arrival.cmp(&b.arrival))
            .then_with(|| a.from_stop.cmp(&b.from_stop))
            .then_with(|| a.trip_id.cmp(&b.trip_id))
    });
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ids::{RouteId, ServiceId, StopId, TripId};
    use crate::time::Time;

    #[test]
    fn emits_one_connection_per_consecutive_pair() {
        let trip = TripId::from("T1");
        let mut by_trip = HashMap::new();
        by_trip.insert(
            trip.clone(),
            vec![
                StopTime {
                    trip_id: trip.clone(),
                    stop_sequence: 0,
                    stop_id: StopId::from("A"),
                    arrival_time: Time::from_hms(10, 0, 0),
                    departure_time: Time::from_hms(10, 0, 0),
                },
                StopTime {
                    trip_id: trip.clone(),
                    stop_sequence: 1,
                    stop_id: StopId::from("B"),
                    arrival_time: Time::from_hms(10, 5, 0),
                    departure_time: Time::from_hms(10, 5, 0),
                },
                StopTime {
                    trip_id: trip.clone(),
                    stop_sequence: 2,
                    stop_id: StopId::from("C"),
                    arrival_time: Time::from_hms(10, 10, 0),
                    departure_time: Time::from_hms(10, 10, 0),
                },
            ],
        );

        let connections = build_connections(
            &by_trip,
            |_| Some((RouteId::from("R1"), ServiceId::from("S1"), 2)),
        );

        assert_eq!(connections.len(), 2);
        assert_eq!(connections[0].from_stop, StopId::from("A"));
        assert_eq!(connections[0].to_stop, StopId::from("B"));
        assert_eq!(connections[1].from_stop, StopId::from("B"));
        assert_eq!(connections[1].to_stop, StopId::from("C"));
    }

    #[test]
    fn sorted_by_departure_ascending() {
        let mut by_trip = HashMap::new();
        by_trip.insert(
            TripId::from("LATE"),
            vec![
                StopTime {
                    trip_id: TripId::from("LATE"),
                    stop_sequence: 0,
                    stop_id: StopId::from("A"),
                    arrival_time: Time::from_hms(12, 0, 0),
                    departure_time: Time::from_hms(12, 0, 0),
                },
                StopTime {
                    trip_id: TripId::from("LATE"),
                    stop_sequence: 1,
                    stop_id: StopId::from("B"),
                    arrival_time: Time::from_hms(12, 5, 0),
                    departure_time: Time::from_hms(12, 5, 0),
                },
            ],
        );
        by_trip.insert(
            TripId::from("EARLY"),
            vec![
                StopTime {
                    trip_id: TripId::from("EARLY"),
                    stop_sequence: 0,
                    stop_id: StopId::from("A"),
                    arrival_time: Time::from_hms(9, 0, 0),
                    departure_time: Time::from_hms(9, 0, 0),
                },
                StopTime {
                    trip_id: TripId::from("EARLY"),
                    stop_sequence: 1,
                    stop_id: StopId::from("B"),
                    arrival_time: Time::from_hms(9, 5, 0),
                    departure_time: Time::from_hms(9, 5, 0),
                },
            ],
        );

        let connections = build_connections(
            &by_trip,
            |_| Some((RouteId::from("R1"), ServiceId::from("S1"), 2)),
        );
        assert!(connections.windows(2).all(|w| w[0].departure <= w[1].departure));
    }

    #[test]
    fn transfer_templates_are_keyed_by_from_stop_with_a_relative_duration() {
        use crate::model::TransferRecord;
        use crate::time::Duration;

        let templates = build_transfer_templates(&[TransferRecord {
            from_stop_id: StopId::from("A"),
            to_stop_id: StopId::from("B"),
            transfer_type: 2,
            min_transfer_time: Some(Duration::seconds(180)),
        }]);

        let from_a = templates.get(&StopId::from("A")).expect("template for A");
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].to_stop, StopId::from("B"));
        assert_eq!(from_a[0].arrival - from_a[0].departure, Duration::seconds(180));
        assert!(templates.get(&StopId::from("B")).is_none());
    }
}
