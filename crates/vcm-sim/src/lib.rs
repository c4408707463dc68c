//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "01-bootstrap"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulation runtime module exports and shared types."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Charge controller simulator used to exercise the relay without hardware.

pub mod generator;
pub mod scenario;

pub use generator::{ChargerSimulator, SimulationMode, VanProfile};
pub use scenario::Scenario;
