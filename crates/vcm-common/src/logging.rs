//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Structured logging setup for daemons and command line tools."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "VCM_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

// Dropping a guard stops its writer thread.
static WRITER_GUARDS: OnceCell<Vec<WorkerGuard>> = OnceCell::new();

/// Stdout encoding for the relay daemon.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// `VCM_LOG`, else `RUST_LOG`, else `default`.
fn env_filter(default: &str) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("ignoring invalid {LOG_ENV} directive ({err}); using {default}");
            EnvFilter::new(default)
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
    }
}

fn stdout_layer(format: LogFormat, writer: NonBlocking) -> BoxedLayer {
    let layer = fmt::layer()
        .with_timer(UtcTime::rfc_3339())
        .with_writer(writer);
    match format {
        LogFormat::StructuredJson => layer.json().with_target(false).boxed(),
        LogFormat::Pretty => layer.boxed(),
    }
}

fn file_layer(writer: NonBlocking) -> BoxedLayer {
    fmt::layer()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_writer(writer)
        .boxed()
}

/// Install the daemon subscriber: stdout in the configured format plus, when
/// `config.file` is set, a daily rolling JSON file under `config.directory`.
///
/// Only the first call in a process installs anything.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    let mut guards = Vec::with_capacity(2);

    let (stdout, guard) = tracing_appender::non_blocking(std::io::stdout());
    layers.push(stdout_layer(config.format, stdout));
    guards.push(guard);

    if config.file {
        std::fs::create_dir_all(&config.directory).with_context(|| {
            format!("unable to create log directory {}", config.directory.display())
        })?;
        let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
        let appender = daily(&config.directory, format!("{prefix}.log"));
        let (file, guard) = tracing_appender::non_blocking(appender);
        layers.push(file_layer(file));
        guards.push(guard);
    }

    let installed = tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(DEFAULT_DIRECTIVE))
        .try_init()
        .is_ok();
    if installed {
        let _ = WRITER_GUARDS.set(guards);
        info!(
            service = %service_name,
            format = ?config.format,
            log_file = config.file,
            log_dir = %config.directory.display(),
            "tracing initialised"
        );
    }
    Ok(())
}

/// Stderr only, `warn` unless overridden. For command line tools.
pub fn init_cli() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("warn"))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
