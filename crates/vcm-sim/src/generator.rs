//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulation runtime helpers and scenario engines."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::f64::consts::PI;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::prelude::*;
use rand_distr::Normal;
use vcm_telemetry::{ChargerStatus, ComponentStatus};

use crate::scenario::Scenario;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Where simulated statuses come from.
#[derive(Debug, Clone)]
pub enum SimulationMode {
    Synthetic,
    Scenario(PathBuf),
}

/// Electrical parameters of the simulated van.
#[derive(Debug, Clone)]
pub struct VanProfile {
    pub solar_peak_w: f64,
    pub panel_voltage_v: f64,
    pub alternator_voltage_v: f64,
    pub alternator_current_a: f64,
    pub battery_capacity_ah: f64,
    pub house_load_a: f64,
    /// Chance per tick that the engine toggles on or off.
    pub engine_toggle_probability: f64,
}

impl Default for VanProfile {
    fn default() -> Self {
        Self {
            solar_peak_w: 200.0,
            panel_voltage_v: 17.6,
            alternator_voltage_v: 14.2,
            alternator_current_a: 20.0,
            battery_capacity_ah: 100.0,
            house_load_a: 3.0,
            engine_toggle_probability: 0.02,
        }
    }
}

/// Produces a stream of charger statuses, synthetic or replayed.
#[derive(Debug)]
pub struct ChargerSimulator {
    profile: VanProfile,
    rng: StdRng,
    noise: Normal<f64>,
    scenario: Option<Scenario>,
    tick: Duration,
    clock_s: f64,
    soc_percent: f64,
    daily_charge_ah: f64,
    engine_on: bool,
}

impl ChargerSimulator {
    pub fn new(mode: SimulationMode, seed: u64) -> Result<Self> {
        let scenario = match &mode {
            SimulationMode::Scenario(path) => Some(Scenario::from_path(path)?),
            SimulationMode::Synthetic => None,
        };
        Ok(Self {
            profile: VanProfile::default(),
            rng: StdRng::seed_from_u64(seed),
            noise: Normal::new(0.0, 1.0).context("invalid noise distribution")?,
            scenario,
            tick: Duration::from_secs(60),
            clock_s: 6.0 * 3600.0,
            soc_percent: 60.0,
            daily_charge_ah: 0.0,
            engine_on: false,
        })
    }

    pub fn with_profile(mut self, profile: VanProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Simulated time advanced per status.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Start the simulated clock at `hour` (0..24) of the first day.
    pub fn starting_at_hour(mut self, hour: f64) -> Self {
        self.clock_s = hour.rem_euclid(24.0) * 3600.0;
        self
    }

    pub fn next_status(&mut self) -> ChargerStatus {
        if let Some(scenario) = &mut self.scenario {
            return scenario.next_frame();
        }
        self.synthetic_status()
    }

    fn synthetic_status(&mut self) -> ChargerStatus {
        let dt_s = self.tick.as_secs_f64();
        let previous_day = (self.clock_s / SECONDS_PER_DAY).floor();
        self.clock_s += dt_s;
        if (self.clock_s / SECONDS_PER_DAY).floor() > previous_day {
            self.daily_charge_ah = 0.0;
        }

        if self.rng.gen_bool(self.profile.engine_toggle_probability.clamp(0.0, 1.0)) {
            self.engine_on = !self.engine_on;
        }

        let solar = self.solar_reading();
        let alternator = self.alternator_reading();

        let battery_v = 11.8 + 1.4 * self.soc_percent / 100.0;
        let charging_w = f64::from(solar.power_w) + f64::from(alternator.power_w);
        let load_a = (self.profile.house_load_a + 0.3 * self.noise_sample()).max(0.0);
        let mut battery_a = charging_w / battery_v - load_a;
        if self.soc_percent >= 100.0 && battery_a > 0.0 {
            battery_a = 0.0;
        }
        let battery_v = battery_v + if battery_a > 0.0 { 0.4 } else { 0.0 };

        let dt_h = dt_s / 3600.0;
        self.soc_percent = (self.soc_percent
            + battery_a * dt_h / self.profile.battery_capacity_ah * 100.0)
            .clamp(0.0, 100.0);
        if battery_a > 0.0 {
            self.daily_charge_ah += battery_a * dt_h;
        }

        ChargerStatus {
            solar,
            alternator,
            battery: ComponentStatus::from_voltage_current(battery_v as f32, battery_a as f32),
            total_daily_charge_ah: self.daily_charge_ah.round().min(f64::from(u16::MAX)) as u16,
            battery_percentage: self.soc_percent.round() as u8,
            ..ChargerStatus::default()
        }
    }

    fn solar_reading(&mut self) -> ComponentStatus {
        let hour = (self.clock_s % SECONDS_PER_DAY) / 3600.0;
        if !(6.0..18.0).contains(&hour) {
            return ComponentStatus::default();
        }
        let irradiance = (PI * (hour - 6.0) / 12.0).sin();
        let power = (self.profile.solar_peak_w * irradiance + 5.0 * self.noise_sample()).max(0.0);
        if power < 1.0 {
            return ComponentStatus::default();
        }
        let voltage = self.profile.panel_voltage_v + 0.2 * self.noise_sample();
        ComponentStatus::new(power as f32, (power / voltage) as f32, voltage as f32)
    }

    fn alternator_reading(&mut self) -> ComponentStatus {
        if !self.engine_on {
            return ComponentStatus::default();
        }
        let voltage = self.profile.alternator_voltage_v + 0.05 * self.noise_sample();
        let current = (self.profile.alternator_current_a + self.noise_sample()).max(0.0);
        ComponentStatus::from_voltage_current(voltage as f32, current as f32)
    }

    fn noise_sample(&mut self) -> f64 {
        self.noise.sample(&mut self.rng)
    }
}
