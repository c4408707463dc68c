//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Relay metrics and the Prometheus scrape endpoint."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::core::Collector;
use prometheus::{
    Gauge, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};
use vcm_telemetry::ChargerStatus;

pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Serve `registry` in the Prometheus text format at `/metrics`.
pub fn spawn_exporter(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsExporter> {
    let app = Router::new()
        .route("/metrics", get(scrape))
        .with_state(registry);

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics exporter to {addr}"))?;
    std_listener
        .set_nonblocking(true)
        .context("failed to make metrics listener non-blocking")?;
    let addr = std_listener.local_addr()?;
    let listener = TcpListener::from_std(std_listener)?;
    info!(address = %addr, "metrics exporter listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics exporter failed")
    });

    Ok(MetricsExporter {
        addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}

async fn scrape(State(registry): State<SharedRegistry>) -> Response {
    match TextEncoder::new().encode_to_string(&registry.gather()) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

#[derive(Debug)]
pub struct MetricsExporter {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsExporter {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await?
    }
}

/// Why the relay refused a status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Malformed,
    Invalid,
    Storage,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Malformed => "malformed",
            RejectReason::Invalid => "invalid",
            RejectReason::Storage => "storage",
        }
    }
}

/// Status store call timed by [`RelayMetrics::observe_store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Put,
    Latest,
}

impl StoreOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOp::Put => "put",
            StoreOp::Latest => "latest",
        }
    }
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, collector: C) -> Result<C> {
    registry.register(Box::new(collector.clone()))?;
    Ok(collector)
}

/// Everything the relay daemon exports: process facts, traffic counters,
/// store latency and gauges mirroring the last accepted status.
#[derive(Clone, Debug)]
pub struct RelayMetrics {
    build_info: GaugeVec,
    start_time: Gauge,
    config_load_seconds: Gauge,
    updates_total: IntCounter,
    rejected_total: IntCounterVec,
    auth_failures_total: IntCounter,
    store_seconds: HistogramVec,
    last_update_timestamp: Gauge,
    component_power: GaugeVec,
    component_current: GaugeVec,
    component_voltage: GaugeVec,
    battery_percentage: IntGauge,
    daily_charge_ah: IntGauge,
}

impl RelayMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let store_buckets = prometheus::exponential_buckets(0.0001, 4.0, 8)?;
        Ok(Self {
            build_info: register(
                registry,
                GaugeVec::new(
                    Opts::new("vcmd_build_info", "Version of the running relay"),
                    &["version"],
                )?,
            )?,
            start_time: register(
                registry,
                Gauge::new("vcmd_start_time_seconds", "Unix time the relay started")?,
            )?,
            config_load_seconds: register(
                registry,
                Gauge::new(
                    "vcmd_config_load_seconds",
                    "Time taken to load and validate the relay configuration",
                )?,
            )?,
            updates_total: register(
                registry,
                IntCounter::new(
                    "vcm_status_updates_total",
                    "Charger status updates accepted by the relay",
                )?,
            )?,
            rejected_total: register(
                registry,
                IntCounterVec::new(
                    Opts::new(
                        "vcm_status_rejected_total",
                        "Charger status updates refused by the relay, by reason",
                    ),
                    &["reason"],
                )?,
            )?,
            auth_failures_total: register(
                registry,
                IntCounter::new(
                    "vcm_auth_failures_total",
                    "Requests rejected for missing or invalid credentials",
                )?,
            )?,
            store_seconds: register(
                registry,
                HistogramVec::new(
                    HistogramOpts::new(
                        "vcm_store_operation_seconds",
                        "Latency of status store reads and writes",
                    )
                    .buckets(store_buckets),
                    &["operation"],
                )?,
            )?,
            last_update_timestamp: register(
                registry,
                Gauge::new(
                    "vcm_last_update_timestamp_seconds",
                    "Unix time of the last accepted status update",
                )?,
            )?,
            component_power: register(
                registry,
                GaugeVec::new(
                    Opts::new("vcm_component_power_watts", "Last reported power"),
                    &["component"],
                )?,
            )?,
            component_current: register(
                registry,
                GaugeVec::new(
                    Opts::new("vcm_component_current_amps", "Last reported current"),
                    &["component"],
                )?,
            )?,
            component_voltage: register(
                registry,
                GaugeVec::new(
                    Opts::new("vcm_component_voltage_volts", "Last reported voltage"),
                    &["component"],
                )?,
            )?,
            battery_percentage: register(
                registry,
                IntGauge::new(
                    "vcm_battery_percentage",
                    "Last reported battery state of charge",
                )?,
            )?,
            daily_charge_ah: register(
                registry,
                IntGauge::new(
                    "vcm_daily_charge_amp_hours",
                    "Last reported daily accumulated charge",
                )?,
            )?,
        })
    }

    pub fn record_startup(&self, version: &str, started_at_secs: f64, config_load: Duration) {
        self.build_info.with_label_values(&[version]).set(1.0);
        self.start_time.set(started_at_secs);
        self.config_load_seconds.set(config_load.as_secs_f64());
    }

    /// Count an accepted update and mirror its readings.
    pub fn record_update(&self, status: &ChargerStatus, received_at_secs: f64) {
        self.updates_total.inc();
        self.last_update_timestamp.set(received_at_secs);
        for (kind, reading) in status.components() {
            let label = [kind.as_str()];
            self.component_power
                .with_label_values(&label)
                .set(f64::from(reading.power_w));
            self.component_current
                .with_label_values(&label)
                .set(f64::from(reading.current_a));
            self.component_voltage
                .with_label_values(&label)
                .set(f64::from(reading.voltage_v));
        }
        self.battery_percentage
            .set(i64::from(status.battery_percentage));
        self.daily_charge_ah
            .set(i64::from(status.total_daily_charge_ah));
    }

    pub fn record_rejection(&self, reason: RejectReason) {
        self.rejected_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures_total.inc();
    }

    pub fn observe_store(&self, op: StoreOp, elapsed: Duration) {
        self.store_seconds
            .with_label_values(&[op.as_str()])
            .observe(elapsed.as_secs_f64());
    }

    pub fn updates_total(&self) -> u64 {
        self.updates_total.get()
    }
}

pub use prometheus;
