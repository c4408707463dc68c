//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "binary"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Binary entrypoint for the VCM relay daemon."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use vcm_api::{spawn_api_server, ApiServer, ApiState};
use vcm_common::config::{AppConfig, LoadedAppConfig};
use vcm_common::logging::init_tracing;
use vcm_common::VERSION;
use vcm_metrics::{new_registry, spawn_exporter, RelayMetrics, SharedRegistry};
use vcm_store::{FileStatusStore, MemoryStatusStore, StatusStore};

#[derive(Debug, Parser)]
#[command(
    author,
    disable_version_flag = true,
    about = "VCM relay daemon",
    long_about = None
)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "ADDR", help = "Override the API listen address")]
    listen: Option<SocketAddr>,

    #[arg(long, help = "Keep the latest status in memory instead of on disk")]
    ephemeral: bool,

    #[arg(
        short = 'V',
        long = "version",
        action = ArgAction::SetTrue,
        help = "Print version information and exit"
    )]
    version: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the relay")]
    Run,
    #[command(about = "Load and validate the configuration, then exit")]
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.version {
        println!("vcmd {VERSION}");
        return Ok(());
    }

    let load_started = Instant::now();
    let loaded = load_config(&cli)?;
    let load_duration = load_started.elapsed();
    let mut config = loaded.config;
    if let Some(listen) = cli.listen {
        config.api.listen = listen;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::CheckConfig => {
            println!(
                "{}: ok ({} users, status file {}, max age {}s)",
                loaded.source.display(),
                config.auth.users.len(),
                config.storage.path.display(),
                config.storage.max_age.as_secs()
            );
        }
        Commands::Run => {
            init_tracing("vcmd", &config.logging)?;
            info!(config_path = %loaded.source.display(), "configuration loaded");

            let registry = new_registry();
            let metrics = RelayMetrics::new(&registry)?;
            metrics.record_startup(
                VERSION,
                Utc::now().timestamp_millis() as f64 / 1000.0,
                load_duration,
            );

            run_daemon(config, cli.ephemeral, registry, metrics).await?;
        }
    }

    Ok(())
}

const DEFAULT_CONFIGS: [&str; 2] = ["configs/vcmd.toml", "configs/vcmd.example.toml"];

fn load_config(cli: &Cli) -> Result<LoadedAppConfig> {
    AppConfig::load_explicit_or(cli.config.as_deref(), &DEFAULT_CONFIGS)
}

async fn run_daemon(
    config: AppConfig,
    ephemeral: bool,
    registry: SharedRegistry,
    metrics: RelayMetrics,
) -> Result<()> {
    let metrics_server = if config.metrics.enabled {
        info!(address = %config.metrics.listen, "metrics exporter enabled");
        Some(spawn_exporter(registry, config.metrics.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let store: Arc<dyn StatusStore> = if ephemeral {
        warn!("ephemeral mode: latest status is kept in memory only");
        Arc::new(MemoryStatusStore::new())
    } else {
        info!(path = %config.storage.path.display(), "using file status store");
        Arc::new(FileStatusStore::open(&config.storage.path)?)
    };

    let mut api_server: Option<ApiServer> = None;
    if config.api.enabled {
        let state = ApiState::new(store, config.auth.clone(), config.storage.max_age)
            .with_metrics(metrics)
            .with_version(VERSION);
        let server = spawn_api_server(Arc::new(state), config.api.listen)?;
        info!(
            address = %server.addr(),
            max_age_secs = config.storage.max_age.as_secs(),
            "relay accepting status updates"
        );
        api_server = Some(server);
    } else {
        warn!("api server disabled by configuration; nothing will be relayed");
    }

    info!("daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");

    if let Some(server) = api_server {
        server.shutdown().await?;
    }

    if let Some(server) = metrics_server {
        server.shutdown().await?;
    }

    Ok(())
}
