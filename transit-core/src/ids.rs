//! Identifiers shared by every component in this crate.
//!
//! GTFS ids are strings in general, and the multi-mode catalogue (see
//! `crate::catalogue`) synthesises ids of the form `mode_tag:raw_id` when it
//! merges bundles (spec §9), so every id here is a cheaply-cloned interned
//! string rather than an integer.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(raw: impl Into<Arc<str>>) -> Self {
                $name(raw.into())
            }

            /// Build the synthesised `mode_tag:raw_id` global id (spec §9).
            pub fn global(mode_tag: &str, raw_id: &str) -> Self {
                $name(Arc::from(format!("{}:{}", mode_tag, raw_id)))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                $name(Arc::from(raw))
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                $name(Arc::from(raw))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(StopId);
string_id!(RouteId);
string_id!(TripId);
string_id!(ServiceId);
string_id!(AgencyId);

/// A class of vehicle a bundle was loaded under (regional rail, metro rail,
/// tram, bus, ...). Free-form so a deployment can name its own modes.
pub type ModeTag = Arc<str>;

pub fn mode_tag(raw: impl AsRef<str>) -> ModeTag {
    Arc::from(raw.as_ref())
}
