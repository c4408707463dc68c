//! ---
//! ems_section: "02-telemetry-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Charge controller telemetry records shared across the workspace."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Telemetry shape reported by the van charge controller.
//!
//! A [`ChargerStatus`] is a snapshot of one reading: three
//! [`ComponentStatus`] measurements (solar, alternator, battery) plus the
//! controller's aggregate counters and opaque [`StatusBits`]. Records are
//! plain values; every field is zero after construction.

pub mod bits;
pub mod charger;
pub mod component;
pub mod errors;

pub use bits::StatusBits;
pub use charger::ChargerStatus;
pub use component::{ComponentKind, ComponentStatus};
pub use errors::{Result, TelemetryError};
