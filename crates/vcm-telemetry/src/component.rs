//! ---
//! ems_section: "02-telemetry-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Charge controller telemetry records shared across the workspace."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, TelemetryError};

/// Power source or sink measured by the charge controller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Solar,
    Alternator,
    Battery,
}

impl ComponentKind {
    pub const ALL: [ComponentKind; 3] = [
        ComponentKind::Solar,
        ComponentKind::Alternator,
        ComponentKind::Battery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Solar => "solar",
            ComponentKind::Alternator => "alternator",
            ComponentKind::Battery => "battery",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instantaneous electrical measurements for one component.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Watts.
    #[serde(default)]
    pub power_w: f32,
    /// Amps.
    #[serde(default)]
    pub current_a: f32,
    /// Volts.
    #[serde(default)]
    pub voltage_v: f32,
}

impl ComponentStatus {
    pub fn new(power_w: f32, current_a: f32, voltage_v: f32) -> Self {
        Self {
            power_w,
            current_a,
            voltage_v,
        }
    }

    /// Build a reading from voltage and current, deriving power.
    pub fn from_voltage_current(voltage_v: f32, current_a: f32) -> Self {
        Self::new(voltage_v * current_a, current_a, voltage_v)
    }

    /// Reject NaN and infinite readings, naming the offending field.
    pub fn validate(&self, kind: ComponentKind) -> Result<()> {
        for (field, value) in [
            ("power_w", self.power_w),
            ("current_a", self.current_a),
            ("voltage_v", self.voltage_v),
        ] {
            if !value.is_finite() {
                return Err(TelemetryError::NonFinite {
                    component: kind,
                    field,
                    value,
                });
            }
        }
        Ok(())
    }
}
