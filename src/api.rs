//! External Collaborator Interfaces (spec §6): the request/response shapes
//! an HTTP façade or CLI would consume. This crate defines the types only;
//! it carries no transport code of its own.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use transit_core::ids::{ModeTag, StopId};
use transit_core::model::{Journey, Leg, RouteType};
use transit_core::time::Time;

#[derive(Debug, Clone, Deserialize)]
pub struct JourneyRequest {
    pub origin_query: String,
    pub destination_query: String,
    /// `HH:MM[:SS]` or the literal `"now"`.
    pub departure_time: String,
    /// `YYYY-MM-DD` or the literal `"today"`.
    pub date: String,
    #[serde(default)]
    pub realtime: bool,
    /// `None` means "all modes" (spec §6).
    #[serde(default)]
    pub modes: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopView {
    pub id: StopId,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub platform: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LegView {
    pub from_stop: StopId,
    pub to_stop: StopId,
    pub departure_time: Time,
    pub arrival_time: Time,
    pub duration_seconds: i64,
    pub route_short_name: Option<String>,
    pub route_type: Option<RouteType>,
    pub mode_display: &'static str,
    pub num_stops: u32,
    pub intermediate_stops: Vec<String>,
    pub is_transfer: bool,
    pub scheduled_departure: Time,
    pub scheduled_arrival: Time,
    pub actual_departure: Option<Time>,
    pub actual_arrival: Option<Time>,
    pub delay_seconds: i32,
    pub cancelled: bool,
    pub platform: Option<String>,
}

impl From<&Leg> for LegView {
    fn from(leg: &Leg) -> LegView {
        let mut duration = leg.arrival_time.as_secs() - leg.departure_time.as_secs();
        if duration < 0 {
            duration += 86_400;
        }
        LegView {
            from_stop: leg.from_stop.clone(),
            to_stop: leg.to_stop.clone(),
            departure_time: leg.departure_time,
            arrival_time: leg.arrival_time,
            duration_seconds: duration,
            route_short_name: leg.route_short_name.clone(),
            route_type: leg.route_type,
            mode_display: leg.route_type.map_or("transfer", transit_core::model::mode_display),
            num_stops: leg.num_stops,
            intermediate_stops: leg.intermediate_stops.clone(),
            is_transfer: leg.is_transfer,
            scheduled_departure: leg.scheduled_departure,
            scheduled_arrival: leg.scheduled_arrival,
            actual_departure: leg.actual_departure,
            actual_arrival: leg.actual_arrival,
            delay_seconds: leg.delay_seconds,
            cancelled: leg.cancelled,
            platform: leg.platform.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JourneyResponse {
    pub origin: StopView,
    pub destination: StopView,
    pub departure_time: Time,
    pub arrival_time: Time,
    pub duration_seconds: i64,
    pub num_transfers: u32,
    pub legs: Vec<LegView>,
    pub has_realtime: bool,
    pub valid_after_realtime: bool,
}

impl JourneyResponse {
    pub fn from_journey(journey: &Journey, origin: StopView, destination: StopView, has_realtime: bool) -> JourneyResponse {
        JourneyResponse {
            origin,
            destination,
            departure_time: journey.departure_time,
            arrival_time: journey.arrival_time,
            duration_seconds: journey.duration_seconds,
            num_transfers: journey.num_transfers,
            legs: journey.legs.iter().map(LegView::from).collect(),
            has_realtime,
            valid_after_realtime: journey.valid_after_realtime,
        }
    }
}

/// One mode's slot in the dispatcher's result map (spec §4.8): `journey` is
/// `null` whenever that mode found nothing, and `note` names why — a
/// cancelled (timed-out) planner, an exhausted lookahead, or a plain
/// no-route outcome. A mode that found a Journey still carries `note: None`.
#[derive(Debug, Clone, Serialize)]
pub struct ModeOutcome {
    pub journey: Option<JourneyResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ModeOutcome {
    pub fn found(journey: JourneyResponse) -> ModeOutcome {
        ModeOutcome { journey: Some(journey), note: None }
    }

    pub fn absent(note: &str) -> ModeOutcome {
        ModeOutcome { journey: None, note: Some(note.to_string()) }
    }
}

/// `{mode_tag -> outcome}`, the Multi-Mode Dispatcher's return shape (spec
/// §4.8/§6).
pub type ModeResults = BTreeMap<ModeTag, ModeOutcome>;

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}
