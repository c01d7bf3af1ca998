//! Error taxonomy (spec §7): one `thiserror` enum per propagation point
//! rather than a single flat error, because load-time, overlay and
//! dispatcher-boundary errors carry genuinely different fields.

use thiserror::Error;

pub use transit_core::planner::PlanError;

/// Errors raised by the Schedule Loader (spec §4.1).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("missing mandatory GTFS file {0}")]
    MissingFile(String),
    #[error("malformed feed in {file}: {detail}")]
    MalformedFeed { file: String, detail: String },
    #[error("{0} unresolved reference(s); first offenders: {1:?}")]
    UnresolvedReference(usize, Vec<String>),
    #[error("error reading {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },
}

/// Errors raised while applying the Real-time Overlay (spec §4.7). None of
/// these invalidate a scheduled Journey — the overlay is always
/// best-effort, and the caller retains the scheduled answer on any of them.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("malformed trip-update protobuf: {0}")]
    MalformedRealtime(#[from] prost::DecodeError),
    #[error("feed-wide rate limit exceeded (24 calls / 60s)")]
    RateLimited,
    #[error("upstream real-time feed unavailable: {0}")]
    UpstreamUnavailable(#[from] reqwest::Error),
}

/// The error surfaced at the dispatcher boundary (spec §6/§7), the one
/// type an external façade actually needs to map to an HTTP status.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("origin not found: {query}")]
    OriginNotFound { query: String, suggestions: Vec<String> },
    #[error("destination not found: {query}")]
    DestinationNotFound { query: String, suggestions: Vec<String> },
    #[error("no route available")]
    NoRouteAvailable,
    #[error("no service within 7 days")]
    NoServiceWithinLookahead,
    #[error("unparseable input: {0}")]
    BadRequest(String),
    #[error("upstream feed outage: {0}")]
    UpstreamOutage(String),
}

impl RequestError {
    /// The HTTP status an external façade should map this to (spec §6).
    /// This crate has no transport layer of its own; it only tells a
    /// façade which code to use.
    pub fn status_code_hint(&self) -> u16 {
        match self {
            RequestError::OriginNotFound { .. } | RequestError::DestinationNotFound { .. } => 404,
            RequestError::NoRouteAvailable | RequestError::NoServiceWithinLookahead => 404,
            RequestError::BadRequest(_) => 400,
            RequestError::UpstreamOutage(_) => 503,
        }
    }
}
