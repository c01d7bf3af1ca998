//! The data model of §3: stops, routes, trips, stop times, calendars,
//! transfers, connections, legs and journeys. Records produced by the
//! loader are immutable once built; the only thing built more than once
//! per process is a `Journey`, which is synthesised fresh for every
//! request.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::ids::{ModeTag, RouteId, ServiceId, StopId, TripId};
use crate::time::{Duration, Time};

#[derive(Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Serialize, Deserialize)]
pub enum Day {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Day {
    /// Index into the Monday-first weekday bitmap carried by `calendar.txt`.
    pub fn index(self) -> usize {
        match self {
            Day::Monday => 0,
            Day::Tuesday => 1,
            Day::Wednesday => 2,
            Day::Thursday => 3,
            Day::Friday => 4,
            Day::Saturday => 5,
            Day::Sunday => 6,
        }
    }

    pub fn from_chrono(weekday: chrono::Weekday) -> Day {
        match weekday {
            chrono::Weekday::Mon => Day::Monday,
            chrono::Weekday::Tue => Day::Tuesday,
            chrono::Weekday::Wed => Day::Wednesday,
            chrono::Weekday::Thu => Day::Thursday,
            chrono::Weekday::Fri => Day::Friday,
            chrono::Weekday::Sat => Day::Saturday,
            chrono::Weekday::Sun => Day::Sunday,
        }
    }

    pub fn of(date: NaiveDate) -> Day {
        use chrono::Datelike;
        Day::from_chrono(date.weekday())
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Day::Monday => "mon",
            Day::Tuesday => "tue",
            Day::Wednesday => "wed",
            Day::Thursday => "thu",
            Day::Friday => "fri",
            Day::Saturday => "sat",
            Day::Sunday => "sun",
        })
    }
}

/// The GTFS `route_type` numeric code, preserved verbatim end-to-end (spec
/// §3) because mode display is derived from it by the external façade, not
/// by this crate.
pub type RouteType = u16;

/// A human-readable label for the handful of `route_type` codes this system
/// expects to see (regional rail, metro rail, trams, buses). Anything else
/// still round-trips through the system with its raw code intact; this is
/// a display convenience, not a validation gate.
pub fn mode_display(route_type: RouteType) -> &'static str {
    match route_type {
        0 | 900 => "tram",
        2 | 102 => "rail",
        3 | 700 | 204 | 701 => "bus",
        400 => "metro",
        _ => "other",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stop {
    pub stop_id: StopId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub platform: Option<String>,
    pub mode_tag: ModeTag,
}

impl PartialEq for Stop {
    fn eq(&self, rhs: &Self) -> bool {
        self.stop_id == rhs.stop_id
    }
}
impl Eq for Stop {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub route_id: RouteId,
    pub route_type: RouteType,
    pub short_name: String,
    pub long_name: String,
    pub agency_id: Option<String>,
    pub mode_tag: ModeTag,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trip {
    pub trip_id: TripId,
    pub route_id: RouteId,
    pub service_id: ServiceId,
    pub direction_id: Option<u8>,
    pub headsign: Option<String>,
}

/// `(trip_id, stop_sequence, stop_id, arrival_time, departure_time)` from
/// spec §3. Times are seconds-from-midnight of the trip's service day and
/// may exceed 86,400 (next-day wrap, §4.6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopTime {
    pub trip_id: TripId,
    pub stop_sequence: u32,
    pub stop_id: StopId,
    pub arrival_time: Time,
    pub departure_time: Time,
}

/// `service_id -> {weekday_bitmap[7], start_date, end_date}` from spec §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Calendar {
    pub service_id: ServiceId,
    pub weekdays: [bool; 7],
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Calendar {
    pub fn runs_on(&self, day: Day) -> bool {
        self.weekdays[day.index()]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExceptionType {
    Added,
    Removed,
}

/// `(service_id, date) -> {added|removed}` override of the calendar bitmap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarException {
    pub service_id: ServiceId,
    pub date: NaiveDate,
    pub exception_type: ExceptionType,
}

/// `(from_stop_id, to_stop_id, transfer_type, min_transfer_time)` from spec
/// §3 — an in-feed, authorised walk between two physical stops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransferRecord {
    pub from_stop_id: StopId,
    pub to_stop_id: StopId,
    pub transfer_type: u8,
    pub min_transfer_time: Option<Duration>,
}

/// One elementary point-to-point hop, the scan's atomic unit (spec §3/§4.4).
/// `trip_id = None` and `service_id = None` mark a transfer connection,
/// which is always available and whose `arrival - departure` equals the
/// feed's declared minimum transfer time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub from_stop: StopId,
    pub to_stop: StopId,
    pub departure: Time,
    pub arrival: Time,
    pub trip_id: Option<TripId>,
    pub route_id: Option<RouteId>,
    pub route_type: Option<RouteType>,
    pub service_id: Option<ServiceId>,
}

impl Connection {
    pub fn is_transfer(&self) -> bool {
        self.trip_id.is_none()
    }
}

/// One contiguous segment of a `Journey`: either a transit leg on one trip,
/// or a transfer leg (spec §3, invariant I5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Leg {
    pub from_stop: StopId,
    pub from_stop_name: String,
    pub to_stop: StopId,
    pub to_stop_name: String,
    pub departure_time: Time,
    pub arrival_time: Time,
    pub trip_id: Option<TripId>,
    pub route_id: Option<RouteId>,
    pub route_short_name: Option<String>,
    pub route_type: Option<RouteType>,
    pub is_transfer: bool,
    /// Only meaningful when `is_transfer`: `true` for a `transfers.txt`
    /// record (`scheduled_arrival - scheduled_departure` is that record's
    /// own declared `min_transfer_time`), `false` for a synthetic same-
    /// platform dwell with no record of its own (spec §4.6's
    /// `from_stop=to_stop=interchange`). Both can have `from_stop ==
    /// to_stop` — a feed may declare a same-stop minimum connection time —
    /// so this is the only reliable way to tell them apart after the fact.
    pub is_declared_transfer: bool,
    pub intermediate_stops: Vec<String>,
    pub num_stops: u32,
    pub scheduled_departure: Time,
    pub scheduled_arrival: Time,
    pub actual_departure: Option<Time>,
    pub actual_arrival: Option<Time>,
    pub delay_seconds: i32,
    pub cancelled: bool,
    pub platform: Option<String>,
}

impl Leg {
    /// The time this leg's rider would actually experience: the real-time
    /// estimate if the overlay has set one, otherwise the schedule.
    pub fn effective_departure(&self) -> Time {
        self.actual_departure.unwrap_or(self.departure_time)
    }

    pub fn effective_arrival(&self) -> Time {
        self.actual_arrival.unwrap_or(self.arrival_time)
    }
}

/// `{origin_stop, destination_stop, departure_time, arrival_time,
/// duration_seconds, num_transfers, legs}` from spec §3. `departure_time`
/// and `arrival_time` are the first/last **non-transfer** leg's times —
/// see §9's "Duration fix" note; a zero-leg journey (same origin and
/// destination) carries the requested departure time for both and a
/// duration of zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journey {
    pub origin_stop: StopId,
    pub destination_stop: StopId,
    pub departure_time: Time,
    pub arrival_time: Time,
    pub duration_seconds: i64,
    pub num_transfers: u32,
    pub legs: Vec<Leg>,
    /// Set by the planner's next-day retry (spec §4.6); 0 if service was
    /// found on the date originally requested.
    pub date_shifted_by_days: u32,
    pub valid_after_realtime: bool,
    pub broken_transfer: Option<String>,
}
