//! ---
//! ems_section: "05-networking-external-interfaces"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Networking API surface for external integrations."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! HTTP relay for charger status.
//!
//! A publisher posts the latest [`ChargerStatus`] and viewers read it back.
//! Only the most recent status is kept, and it is withheld once it is older
//! than the configured maximum age.

pub mod auth;
pub mod client;
pub mod error;

use std::fmt;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use vcm_common::auth::Role;
use vcm_common::config::AuthConfig;
use vcm_metrics::{RejectReason, RelayMetrics, StoreOp};
use vcm_store::{lookup, StatusLookup, StatusRecord, StatusStore};
use vcm_telemetry::ChargerStatus;

pub use client::{RelayClient, RelayStatus};
pub use error::{ApiError, ErrorResponse};

/// Body returned after a publish request is handled.
pub const UPDATED: &str = "Updated";

/// Shared API state exposed to handlers.
pub struct ApiState {
    store: Arc<dyn StatusStore>,
    auth: AuthConfig,
    max_age: Duration,
    metrics: Option<RelayMetrics>,
    version: String,
    start: Instant,
    write_lock: Mutex<()>,
}

impl ApiState {
    pub fn new(store: Arc<dyn StatusStore>, auth: AuthConfig, max_age: Duration) -> Self {
        Self {
            store,
            auth,
            max_age,
            metrics: None,
            version: env!("CARGO_PKG_VERSION").to_owned(),
            start: Instant::now(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_metrics(mut self, metrics: RelayMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    // Password verification is CPU bound.
    async fn authorize(
        self: &Arc<Self>,
        headers: &HeaderMap,
        role: Role,
    ) -> Result<String, ApiError> {
        let state = Arc::clone(self);
        let headers = headers.clone();
        let verdict =
            tokio::task::spawn_blocking(move || auth::authorize(&state.auth, &headers, role))
                .await
                .map_err(|err| {
                    error!(error = %err, "credential check did not complete");
                    ApiError::internal("failed to check credentials")
                })?;
        if let Err(err) = &verdict {
            if err.status() == StatusCode::UNAUTHORIZED {
                if let Some(metrics) = &self.metrics {
                    metrics.record_auth_failure();
                }
            }
        }
        verdict
    }

    async fn run_store<T, F>(&self, op: StoreOp, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn StatusStore) -> vcm_store::Result<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let started = Instant::now();
        let outcome = tokio::task::spawn_blocking(move || task(store.as_ref())).await;
        if let Some(metrics) = &self.metrics {
            metrics.observe_store(op, started.elapsed());
        }
        Ok(outcome??)
    }

    fn reject(&self, reason: RejectReason, err: ApiError) -> ApiError {
        if let Some(metrics) = &self.metrics {
            metrics.record_rejection(reason);
        }
        err
    }

    async fn accept(&self, status: ChargerStatus) -> Result<StatusRecord, ApiError> {
        // Stamp and write under one lock so the stored record is always the
        // most recently received one.
        let _guard = self.write_lock.lock().await;
        let record = StatusRecord::new(status);
        let pending = record.clone();
        self.run_store(StoreOp::Put, move |store| store.put(&pending))
            .await
            .map_err(|err| {
                error!(error = %err, "failed to store charger status");
                self.reject(
                    RejectReason::Storage,
                    ApiError::internal("failed to store status"),
                )
            })?;
        if let Some(metrics) = &self.metrics {
            metrics.record_update(&record.status, record.timestamp_secs());
        }
        Ok(record)
    }
}

impl fmt::Debug for ApiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiState")
            .field("realm", &self.auth.realm)
            .field("users", &self.auth.users.len())
            .field("max_age", &self.max_age)
            .finish_non_exhaustive()
    }
}

/// Latest status as served to viewers: the charger fields plus the receive time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub status: ChargerStatus,
    /// Receive time as fractional unix seconds.
    pub timestamp: f64,
}

impl From<&StatusRecord> for StatusView {
    fn from(record: &StatusRecord) -> Self {
        Self {
            status: record.status.clone(),
            timestamp: record.timestamp_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub version: String,
    pub uptime_seconds: u64,
    pub has_status: bool,
}

/// Handle to the running API server.
#[derive(Debug)]
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl ApiServer {
    /// Address actually bound, which differs from the requested one for port 0.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        }
    }
}

pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/", get(get_current_status))
        .route(
            "/api/update_battery_status",
            get(get_update_status).post(post_update_status),
        )
        .route("/api/health", get(get_health))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the relay API on `addr`.
pub fn spawn_api_server(state: Arc<ApiState>, addr: SocketAddr) -> Result<ApiServer> {
    let router = router(state);

    let listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind API listener {addr}"))?;
    listener
        .set_nonblocking(true)
        .context("failed to configure API listener as non-blocking")?;
    let addr = listener
        .local_addr()
        .context("failed to read API listener address")?;
    let tcp_listener =
        TcpListener::from_std(listener).context("failed to create tokio listener")?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        info!(address = %addr, "api server listening");
        if let Err(err) = axum::serve(tcp_listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
        {
            error!(address = %addr, error = %err, "api server exited with error");
            return Err(err.into());
        }
        Ok(())
    });

    Ok(ApiServer {
        addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn get_current_status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    state.authorize(&headers, Role::Viewer).await?;
    let (now, max_age) = (Utc::now(), state.max_age);
    let current = state
        .run_store(StoreOp::Latest, move |store| lookup(store, now, max_age))
        .await
        .map_err(|err| {
            error!(error = %err, "failed to read charger status");
            ApiError::internal("failed to read status")
        })?;
    let response = match current {
        StatusLookup::Fresh(record) => Json(StatusView::from(&record)).into_response(),
        StatusLookup::Stale { age } => {
            debug!(age_secs = age.as_secs(), "latest status is stale");
            Json(Value::Null).into_response()
        }
        StatusLookup::Empty => Json(json!({ "status": "empty_db" })).into_response(),
    };
    Ok(response)
}

async fn get_update_status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> Result<&'static str, ApiError> {
    state.authorize(&headers, Role::Publisher).await?;
    Ok(UPDATED)
}

async fn post_update_status(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, ApiError> {
    let username = state.authorize(&headers, Role::Publisher).await?;
    if body.iter().all(u8::is_ascii_whitespace) {
        debug!(%username, "empty status update ignored");
        return Ok(UPDATED);
    }

    let status: ChargerStatus = serde_json::from_slice(&body).map_err(|err| {
        warn!(%username, error = %err, "malformed status update");
        state.reject(
            RejectReason::Malformed,
            ApiError::bad_request(format!("invalid status payload: {err}")),
        )
    })?;
    status.validate().map_err(|err| {
        warn!(%username, error = %err, "invalid status update");
        state.reject(RejectReason::Invalid, ApiError::unprocessable(err.to_string()))
    })?;
    if !status.battery_percentage_in_range() {
        warn!(
            %username,
            battery_percentage = status.battery_percentage,
            "battery percentage outside 0..=100"
        );
    }

    let record = state.accept(status).await?;
    info!(
        %username,
        battery_percentage = record.status.battery_percentage,
        charging_power_w = record.status.charging_power_w(),
        "charger status updated"
    );
    Ok(UPDATED)
}

async fn get_health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let has_status = match state.run_store(StoreOp::Latest, |store| store.latest()).await {
        Ok(record) => record.is_some(),
        Err(err) => {
            warn!(error = %err, "health check could not read status");
            false
        }
    };
    Json(HealthResponse {
        version: state.version.clone(),
        uptime_seconds: state.start.elapsed().as_secs(),
        has_status,
    })
}

async fn not_found() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use reqwest::Client;
    use vcm_common::auth::hash_password_rounds;
    use vcm_common::config::UserConfig;
    use vcm_metrics::new_registry;
    use vcm_store::MemoryStatusStore;
    use vcm_telemetry::ComponentStatus;

    fn test_hash(password: &str) -> String {
        hash_password_rounds(password, 1_000).unwrap()
    }

    fn auth_config() -> AuthConfig {
        let mut auth = AuthConfig::default();
        auth.users.insert(
            "battery_status".into(),
            UserConfig {
                password_hash: test_hash("password"),
                roles: vec![Role::Publisher, Role::Viewer],
            },
        );
        auth.users.insert(
            "view".into(),
            UserConfig {
                password_hash: test_hash("view"),
                roles: vec![Role::Viewer],
            },
        );
        auth
    }

    async fn spawn(store: Arc<MemoryStatusStore>) -> (ApiServer, String) {
        let state = ApiState::new(store, auth_config(), Duration::from_secs(300));
        let server = spawn_api_server(Arc::new(state), "127.0.0.1:0".parse().unwrap()).unwrap();
        let base = format!("http://{}", server.addr());
        (server, base)
    }

    fn sample_status() -> ChargerStatus {
        ChargerStatus {
            solar: ComponentStatus::new(120.0, 6.8, 17.6),
            battery: ComponentStatus::new(80.0, 6.0, 13.4),
            total_daily_charge_ah: 12,
            battery_percentage: 81,
            ..ChargerStatus::default()
        }
    }

    #[tokio::test]
    async fn empty_store_reports_empty_db() {
        let (server, base) = spawn(Arc::new(MemoryStatusStore::new())).await;
        let body: Value = Client::new()
            .get(format!("{base}/"))
            .basic_auth("view", Some("view"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, json!({ "status": "empty_db" }));
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn publish_then_read_back() {
        let (server, base) = spawn(Arc::new(MemoryStatusStore::new())).await;
        let client = Client::new();
        let response = client
            .post(format!("{base}/api/update_battery_status"))
            .basic_auth("battery_status", Some("password"))
            .json(&sample_status())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(response.text().await.unwrap(), UPDATED);

        let view: StatusView = client
            .get(format!("{base}/"))
            .basic_auth("view", Some("view"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(view.status, sample_status());
        assert!(view.timestamp > 0.0);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn stale_status_is_null() {
        let store = Arc::new(MemoryStatusStore::new());
        let old = StatusRecord::received_at(
            sample_status(),
            Utc::now() - ChronoDuration::seconds(301),
        );
        store.put(&old).unwrap();
        let (server, base) = spawn(store).await;
        let body: Value = Client::new()
            .get(format!("{base}/"))
            .basic_auth("view", Some("view"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body, Value::Null);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn rejects_missing_credentials_and_wrong_role() {
        let (server, base) = spawn(Arc::new(MemoryStatusStore::new())).await;
        let client = Client::new();

        let response = client.get(format!("{base}/")).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers()["www-authenticate"],
            "Basic realm=\"vcm\""
        );
        let body: ErrorResponse = response.json().await.unwrap();
        assert_eq!(body.error, "unauthorized");

        let response = client
            .post(format!("{base}/api/update_battery_status"))
            .basic_auth("view", Some("view"))
            .json(&sample_status())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::FORBIDDEN);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_and_invalid_payloads_are_rejected() {
        let store = Arc::new(MemoryStatusStore::new());
        let registry = new_registry();
        let metrics = RelayMetrics::new(&registry).unwrap();
        let state = ApiState::new(store.clone(), auth_config(), Duration::from_secs(300))
            .with_metrics(metrics.clone());
        let server = spawn_api_server(Arc::new(state), "127.0.0.1:0".parse().unwrap()).unwrap();
        let url = format!("http://{}/api/update_battery_status", server.addr());
        let client = Client::new();

        let response = client
            .post(&url)
            .basic_auth("battery_status", Some("password"))
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: ErrorResponse = response.json().await.unwrap();
        assert!(body.error.contains("invalid status payload"));

        let response = client
            .post(&url)
            .basic_auth("battery_status", Some("password"))
            .body(r#"{"battery_percentage": 300}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        // Overflows f32 and decodes as infinity.
        let response = client
            .post(&url)
            .basic_auth("battery_status", Some("password"))
            .body(r#"{"solar": {"power_w": 1e39}}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorResponse = response.json().await.unwrap();
        assert!(body.error.contains("solar"));

        assert!(store.latest().unwrap().is_none());
        assert_eq!(metrics.updates_total(), 0);
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn empty_body_is_a_no_op() {
        let store = Arc::new(MemoryStatusStore::new());
        let (server, base) = spawn(store.clone()).await;
        let client = Client::new();
        for request in [
            client.post(format!("{base}/api/update_battery_status")),
            client.get(format!("{base}/api/update_battery_status")),
        ] {
            let response = request
                .basic_auth("battery_status", Some("password"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::OK);
            assert_eq!(response.text().await.unwrap(), UPDATED);
        }
        assert!(store.latest().unwrap().is_none());
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn health_needs_no_credentials() {
        let (server, base) = spawn(Arc::new(MemoryStatusStore::new())).await;
        let health: HealthResponse = reqwest::get(format!("{base}/api/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(!health.has_status);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));

        let response = reqwest::get(format!("{base}/missing")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        server.shutdown().await.unwrap();
    }

    /// Memory store that records the receive time of every write, in the
    /// order the writes land.
    #[derive(Default)]
    struct RecordingStore {
        inner: MemoryStatusStore,
        writes: parking_lot::Mutex<Vec<chrono::DateTime<Utc>>>,
    }

    impl StatusStore for RecordingStore {
        fn put(&self, record: &StatusRecord) -> vcm_store::Result<()> {
            // Slow writes widen the window for concurrent requests to interleave
            std::thread::sleep(Duration::from_millis(5));
            self.inner.put(record)?;
            self.writes.lock().push(record.received_at);
            Ok(())
        }

        fn latest(&self) -> vcm_store::Result<Option<StatusRecord>> {
            self.inner.latest()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publishes_keep_the_newest_record() {
        let store = Arc::new(RecordingStore::default());
        let state = ApiState::new(store.clone(), auth_config(), Duration::from_secs(300));
        let server = spawn_api_server(Arc::new(state), "127.0.0.1:0".parse().unwrap()).unwrap();
        let url = format!("http://{}/api/update_battery_status", server.addr());
        let client = Client::new();

        let mut requests = Vec::new();
        for percentage in 0..16u8 {
            let request = client
                .post(&url)
                .basic_auth("battery_status", Some("password"))
                .json(&ChargerStatus {
                    battery_percentage: percentage,
                    ..sample_status()
                });
            requests.push(tokio::spawn(request.send()));
        }
        for request in requests {
            assert_eq!(
                request.await.unwrap().unwrap().status(),
                reqwest::StatusCode::OK
            );
        }

        let writes = store.writes.lock().clone();
        assert_eq!(writes.len(), 16);
        assert!(writes.windows(2).all(|pair| pair[0] <= pair[1]));
        let latest = store.latest().unwrap().unwrap();
        assert_eq!(Some(&latest.received_at), writes.last());
        server.shutdown().await.unwrap();
    }
}
