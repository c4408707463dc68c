//! ---
//! ems_section: "11-simulation"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Publishes simulated charger statuses to the relay."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tracing::{info, warn};
use vcm_api::RelayClient;
use vcm_sim::{ChargerSimulator, SimulationMode};

#[derive(Debug, Args)]
pub struct SimulateOptions {
    /// Number of statuses to publish; 0 runs until interrupted.
    #[arg(long, default_value_t = 0)]
    pub count: u64,
    /// Wall-clock delay between publishes.
    #[arg(long, default_value_t = 5_000)]
    pub interval_ms: u64,
    /// Simulated seconds advanced per status.
    #[arg(long, default_value_t = 60)]
    pub tick_secs: u64,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
    /// Replay statuses from a JSON array instead of synthesising them.
    #[arg(long, value_name = "FILE")]
    pub scenario: Option<PathBuf>,
}

impl SimulateOptions {
    fn mode(&self) -> SimulationMode {
        match &self.scenario {
            Some(path) => SimulationMode::Scenario(path.clone()),
            None => SimulationMode::Synthetic,
        }
    }
}

/// Outcome of a simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationSummary {
    pub published: u64,
    pub failures: u64,
    pub interrupted: bool,
}

pub async fn run(client: &RelayClient, options: SimulateOptions) -> Result<()> {
    let summary = run_until(client, &options, tokio::signal::ctrl_c()).await?;
    println!(
        "published {} statuses ({} failed) to {}",
        summary.published,
        summary.failures,
        client.base_url()
    );
    Ok(())
}

/// Publish until `options.count` is reached or `shutdown` resolves, including
/// while a publish is still in flight.
pub async fn run_until<F: Future>(
    client: &RelayClient,
    options: &SimulateOptions,
    shutdown: F,
) -> Result<SimulationSummary> {
    let mut simulator = ChargerSimulator::new(options.mode(), options.seed)?
        .with_tick(Duration::from_secs(options.tick_secs));
    let mut interval = tokio::time::interval(Duration::from_millis(options.interval_ms.max(1)));
    let mut summary = SimulationSummary {
        published: 0,
        failures: 0,
        interrupted: false,
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut shutdown => {
                summary.interrupted = true;
                break;
            }
        }
        let status = simulator.next_status();
        let outcome = tokio::select! {
            outcome = client.publish(&status) => outcome,
            _ = &mut shutdown => {
                summary.interrupted = true;
                break;
            }
        };
        match outcome {
            Ok(()) => {
                summary.published += 1;
                info!(
                    published = summary.published,
                    battery_percentage = status.battery_percentage,
                    charging_power_w = status.charging_power_w(),
                    "simulated status published"
                );
            }
            Err(err) => {
                summary.failures += 1;
                warn!(error = %err, "failed to publish simulated status");
            }
        }
        if options.count != 0 && summary.published + summary.failures >= options.count {
            break;
        }
    }

    if summary.interrupted {
        info!(published = summary.published, "simulation interrupted");
    }
    Ok(summary)
}
