//! I/O, configuration and the request/response boundary around
//! `transit-core`'s pure planning library: the Schedule Loader, the
//! Real-time Overlay's HTTP client, the Multi-Mode Dispatcher, and the
//! external-facing request/response types (spec §4.1, §4.7, §4.8, §6).

pub mod api;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod loader;
pub mod realtime;
