//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Persistence abstractions and storage bindings."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vcm_telemetry::ChargerStatus;

use crate::{Result, StatusStore};

/// Charger status stamped with the time the relay accepted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Reported controller state.
    pub status: ChargerStatus,
    /// Receive time on the relay clock.
    pub received_at: DateTime<Utc>,
}

impl StatusRecord {
    /// Stamp `status` with the current time.
    pub fn new(status: ChargerStatus) -> Self {
        Self::received_at(status, Utc::now())
    }

    /// Stamp `status` with an explicit receive time.
    pub fn received_at(status: ChargerStatus, received_at: DateTime<Utc>) -> Self {
        Self {
            status,
            received_at,
        }
    }

    /// Age of the record at `now`. Records from the future have zero age.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.received_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Receive time as fractional unix seconds.
    pub fn timestamp_secs(&self) -> f64 {
        self.received_at.timestamp_millis() as f64 / 1000.0
    }
}

/// Outcome of reading the latest status.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLookup {
    /// Nothing has been stored yet.
    Empty,
    /// A record exists but is older than the allowed age.
    Stale {
        /// How old the record was at lookup time.
        age: Duration,
    },
    /// A record within the allowed age.
    Fresh(StatusRecord),
}

impl StatusLookup {
    /// Classify an optional record against `max_age`.
    pub fn classify(record: Option<StatusRecord>, now: DateTime<Utc>, max_age: Duration) -> Self {
        match record {
            None => StatusLookup::Empty,
            Some(record) => {
                let age = record.age_at(now);
                if age > max_age {
                    StatusLookup::Stale { age }
                } else {
                    StatusLookup::Fresh(record)
                }
            }
        }
    }

    /// The record, when fresh.
    pub fn fresh(&self) -> Option<&StatusRecord> {
        match self {
            StatusLookup::Fresh(record) => Some(record),
            _ => None,
        }
    }
}

/// Read the latest record from `store` and classify it.
pub fn lookup(
    store: &dyn StatusStore,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<StatusLookup> {
    Ok(StatusLookup::classify(store.latest()?, now, max_age))
}
