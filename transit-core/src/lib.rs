//! Core journey-planning library: GTFS data model, multi-mode catalogue,
//! stop index, calendar oracle and connection-scan planner.
//!
//! This crate is deliberately free of I/O — it is handed already-parsed
//! records (see `transit_core::catalogue::LoadedBundle`) and does the
//! planning math. Reading GTFS files off disk, fetching GTFS-realtime
//! feeds, and fanning a request out across modes are the root crate's job.

pub mod calendar;
pub mod catalogue;
pub mod connections;
pub mod ids;
pub mod model;
pub mod planner;
pub mod stop_index;
pub mod time;
