//! ---
//! ems_section: "02-telemetry-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Charge controller telemetry records shared across the workspace."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use thiserror::Error;

use crate::component::ComponentKind;

pub type Result<T> = std::result::Result<T, TelemetryError>;

#[derive(Debug, Error, PartialEq)]
pub enum TelemetryError {
    #[error("{component} {field} is not a finite number ({value})")]
    NonFinite {
        component: ComponentKind,
        field: &'static str,
        value: f32,
    },
}
