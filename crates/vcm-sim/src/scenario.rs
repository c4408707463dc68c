//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Simulation runtime helpers and scenario engines."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use vcm_telemetry::ChargerStatus;

/// Recorded statuses replayed in order, wrapping around at the end.
#[derive(Debug, Clone)]
pub struct Scenario {
    frames: Vec<ChargerStatus>,
    cursor: usize,
}

impl Scenario {
    pub fn new(frames: Vec<ChargerStatus>) -> Result<Self> {
        if frames.is_empty() {
            return Err(anyhow!("scenario contains no frames"));
        }
        Ok(Self { frames, cursor: 0 })
    }

    /// Load a JSON array of charger statuses.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("unable to open scenario {}", path.display()))?;
        let frames: Vec<ChargerStatus> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("invalid scenario {}", path.display()))?;
        debug!(path = %path.display(), frames = frames.len(), "scenario loaded");
        Self::new(frames)
            .with_context(|| format!("unusable scenario {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn next_frame(&mut self) -> ChargerStatus {
        let frame = self.frames[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.frames.len();
        frame
    }
}
