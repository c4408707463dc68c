//! ---
//! ems_section: "02-telemetry-model"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Charge controller telemetry records shared across the workspace."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::bits::StatusBits;
use crate::component::{ComponentKind, ComponentStatus};
use crate::errors::Result;

/// Snapshot of the charge controller state.
///
/// Older firmware only reports the three component readings. The aggregate
/// fields default to zero when absent so both payload shapes deserialise into
/// this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChargerStatus {
    #[serde(default)]
    pub solar: ComponentStatus,
    #[serde(default)]
    pub alternator: ComponentStatus,
    #[serde(default)]
    pub battery: ComponentStatus,
    /// Amp-hours delivered to the battery since the controller's daily reset.
    #[serde(default)]
    pub total_daily_charge_ah: u16,
    #[serde(default)]
    pub status_bits1: StatusBits,
    #[serde(default)]
    pub status_bits2: StatusBits,
    #[serde(default)]
    pub status_bits3: StatusBits,
    /// State of charge. Stored as a byte; meaningful range is 0..=100.
    #[serde(default)]
    pub battery_percentage: u8,
}

impl ChargerStatus {
    pub const MAX_BATTERY_PERCENTAGE: u8 = 100;

    pub fn component(&self, kind: ComponentKind) -> &ComponentStatus {
        match kind {
            ComponentKind::Solar => &self.solar,
            ComponentKind::Alternator => &self.alternator,
            ComponentKind::Battery => &self.battery,
        }
    }

    /// Component readings in solar, alternator, battery order.
    pub fn components(&self) -> impl Iterator<Item = (ComponentKind, &ComponentStatus)> + '_ {
        ComponentKind::ALL
            .into_iter()
            .map(move |kind| (kind, self.component(kind)))
    }

    /// Combined power delivered by the charging sources.
    pub fn charging_power_w(&self) -> f32 {
        self.solar.power_w + self.alternator.power_w
    }

    pub fn status_bits(&self) -> [StatusBits; 3] {
        [self.status_bits1, self.status_bits2, self.status_bits3]
    }

    pub fn battery_percentage_in_range(&self) -> bool {
        self.battery_percentage <= Self::MAX_BATTERY_PERCENTAGE
    }

    /// Check every component reading is finite.
    pub fn validate(&self) -> Result<()> {
        for (kind, reading) in self.components() {
            reading.validate(kind)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TelemetryError;

    #[test]
    fn fresh_status_is_all_zero() {
        let status = ChargerStatus::default();
        assert_eq!(status.solar.power_w, 0.0);
        for (_, reading) in status.components() {
            assert_eq!(*reading, ComponentStatus::default());
        }
        assert_eq!(status.total_daily_charge_ah, 0);
        assert_eq!(status.status_bits1, 0u16);
        assert_eq!(status.status_bits2, 0u16);
        assert_eq!(status.status_bits3, 0u16);
        assert_eq!(status.battery_percentage, 0);
    }

    #[test]
    fn components_iterate_in_fixed_order() {
        let mut status = ChargerStatus::default();
        status.solar.power_w = 1.0;
        status.alternator.power_w = 2.0;
        status.battery.power_w = 3.0;
        let order: Vec<_> = status
            .components()
            .map(|(kind, reading)| (kind, reading.power_w))
            .collect();
        assert_eq!(
            order,
            vec![
                (ComponentKind::Solar, 1.0),
                (ComponentKind::Alternator, 2.0),
                (ComponentKind::Battery, 3.0)
            ]
        );
        assert_eq!(status.charging_power_w(), 3.0);
    }

    #[test]
    fn short_payload_fills_extended_fields_with_zero() {
        let json = r#"{
            "solar": {"power_w": 120.5, "current_a": 6.9, "voltage_v": 17.4},
            "alternator": {"power_w": 0.0, "current_a": 0.0, "voltage_v": 12.9},
            "battery": {"power_w": 118.0, "current_a": 8.7, "voltage_v": 13.6}
        }"#;
        let status: ChargerStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status.solar.power_w, 120.5);
        assert_eq!(status.total_daily_charge_ah, 0);
        assert_eq!(status.status_bits3, 0u16);
        assert_eq!(status.battery_percentage, 0);
    }

    #[test]
    fn full_payload_round_trips_field_names() {
        let mut status = ChargerStatus::default();
        status.total_daily_charge_ah = 42;
        status.status_bits2 = StatusBits::new(0x0102);
        status.battery_percentage = 87;
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["total_daily_charge_ah"], 42);
        assert_eq!(value["status_bits2"], 258);
        assert_eq!(value["battery_percentage"], 87);
        assert_eq!(value["battery"]["voltage_v"], 0.0);
    }

    #[test]
    fn rejects_out_of_width_integers() {
        let json = r#"{"battery_percentage": 256}"#;
        assert!(serde_json::from_str::<ChargerStatus>(json).is_err());
        let json = r#"{"total_daily_charge_ah": -1}"#;
        assert!(serde_json::from_str::<ChargerStatus>(json).is_err());
    }

    #[test]
    fn percentage_range_check() {
        let mut status = ChargerStatus::default();
        status.battery_percentage = 100;
        assert!(status.battery_percentage_in_range());
        status.battery_percentage = 101;
        assert!(!status.battery_percentage_in_range());
    }

    #[test]
    fn validate_reports_first_bad_component() {
        let mut status = ChargerStatus::default();
        assert!(status.validate().is_ok());
        status.battery.voltage_v = f32::NEG_INFINITY;
        assert!(matches!(
            status.validate(),
            Err(TelemetryError::NonFinite {
                component: ComponentKind::Battery,
                field: "voltage_v",
                ..
            })
        ));
    }
}
