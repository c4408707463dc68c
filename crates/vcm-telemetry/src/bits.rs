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

/// Opaque 16-bit status word reported by the charge controller.
///
/// The controller does not document the meaning of individual bits, so this
/// type only offers positional access. It serialises as a plain integer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusBits(u16);

impl StatusBits {
    pub const fn new(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }

    /// Returns whether bit `index` (0 = least significant) is set.
    /// Indexes past 15 are never set.
    pub fn is_set(&self, index: u8) -> bool {
        index < 16 && self.0 & (1 << index) != 0
    }

    /// Indexes of the set bits in ascending order.
    pub fn set_bits(&self) -> impl Iterator<Item = u8> + '_ {
        (0u8..16).filter(move |index| self.is_set(*index))
    }
}

impl From<u16> for StatusBits {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<StatusBits> for u16 {
    fn from(value: StatusBits) -> Self {
        value.0
    }
}

impl PartialEq<u16> for StatusBits {
    fn eq(&self, other: &u16) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for StatusBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_access() {
        let bits = StatusBits::new(0b1000_0000_0000_0101);
        assert!(bits.is_set(0));
        assert!(!bits.is_set(1));
        assert!(bits.is_set(2));
        assert!(bits.is_set(15));
        assert!(!bits.is_set(16));
        assert_eq!(bits.set_bits().collect::<Vec<_>>(), vec![0, 2, 15]);
    }

    #[test]
    fn displays_as_hex_word() {
        assert_eq!(StatusBits::new(0x2a).to_string(), "0x002a");
        assert_eq!(StatusBits::default().to_string(), "0x0000");
    }

    #[test]
    fn serialises_as_integer() {
        let json = serde_json::to_string(&StatusBits::new(513)).unwrap();
        assert_eq!(json, "513");
        let parsed: StatusBits = serde_json::from_str("65535").unwrap();
        assert_eq!(parsed, 0xffffu16);
        assert!(serde_json::from_str::<StatusBits>("65536").is_err());
    }
}
