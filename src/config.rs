//! Recognised configuration (spec §9): the set of mode bundles to load and
//! the environment this process expects to find at start-up.

use std::path::PathBuf;

/// One `(mode_tag, feed_path)` pair handed to the catalogue builder (spec
/// §4.2), plus the real-time trip-update endpoint for that mode, if any.
#[derive(Debug, Clone)]
pub struct ModeBundleConfig {
    pub mode_tag: String,
    pub feed_path: PathBuf,
    /// Where the GTFS-realtime `TripUpdate` feed for this mode lives.
    /// `None` means this mode never gets the real-time overlay even when
    /// `realtime=true` is requested (spec §4.7 is best-effort, per-mode).
    pub realtime_url: Option<String>,
}

/// Everything this process needs at start-up. A binary wiring this crate
/// builds one of these (from a config file, CLI flags, or — as the `demos`
/// binary does — hardcoded values) and passes it to
/// [`crate::dispatcher::Dispatcher::build`].
#[derive(Debug, Clone)]
pub struct Config {
    pub bundles: Vec<ModeBundleConfig>,
    /// Per-request wall-clock budget before a mode's planner is cancelled
    /// (spec §5, default 10s).
    pub request_timeout: std::time::Duration,
    /// The transfer-time floor enforced between two different trips at the
    /// same stop (spec §4.6/§9, default 120s).
    pub min_transfer_secs: i32,
    /// How many calendar days the next-service search advances before
    /// giving up (spec §4.6/§9, default 7).
    pub max_next_day_search: u32,
    /// Floor below which a fuzzy stop-name match is discarded (spec §4.3/§9,
    /// default 60).
    pub fuzzy_min_score: u8,
    /// TTL for cached real-time blobs, keyed by mode (spec §5/§9, default
    /// 60s).
    pub realtime_cache_ttl: std::time::Duration,
    /// Real-time fetches are skipped gracefully when this is absent (spec
    /// §6's `PTV_API_KEY`).
    pub realtime_api_key: Option<String>,
}

impl Config {
    /// Build a `Config` from the recognised bundle list plus whatever this
    /// process's environment provides (spec §6: `PTV_API_KEY`), defaulting
    /// every other recognised option (spec §9).
    pub fn from_env(bundles: Vec<ModeBundleConfig>) -> Config {
        Config {
            bundles,
            request_timeout: std::time::Duration::from_secs(10),
            min_transfer_secs: 120,
            max_next_day_search: 7,
            fuzzy_min_score: 60,
            realtime_cache_ttl: std::time::Duration::from_secs(60),
            realtime_api_key: std::env::var("PTV_API_KEY").ok(),
        }
    }
}
