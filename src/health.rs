//! Health server for liveness/readiness probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the plan is loaded)
//! - `/metrics` - Prometheus metrics endpoint

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

/// Labels for operation counters (operation + outcome)
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OperationLabels {
    pub operation: String,
    pub outcome: String,
}

impl EncodeLabelSet for OperationLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for per-operation timings
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OperationKind {
    pub operation: String,
}

impl EncodeLabelSet for OperationKind {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the planner
pub struct Metrics {
    /// Plan operations by outcome (`ok` or an error kind)
    pub operations_total: Family<OperationLabels, Counter>,
    /// Compactions triggered by adds or shrinking resizes
    pub compactions_total: Counter,
    /// Occupied slots in the current plan
    pub slots_occupied: Gauge,
    /// Capacity of the current plan
    pub slots_capacity: Gauge,
    /// Operation duration histogram
    pub operation_duration_seconds: Family<OperationKind, Histogram>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let operations_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "session_planner_operations",
            "Total number of plan operations",
            operations_total.clone(),
        );

        let compactions_total = Counter::default();
        registry.register(
            "session_planner_compactions",
            "Total number of slot table compactions",
            compactions_total.clone(),
        );

        let slots_occupied = Gauge::default();
        registry.register(
            "session_planner_slots_occupied",
            "Occupied slots in the plan",
            slots_occupied.clone(),
        );

        let slots_capacity = Gauge::default();
        registry.register(
            "session_planner_slots_capacity",
            "Slot capacity of the plan",
            slots_capacity.clone(),
        );

        let operation_duration_seconds =
            Family::<OperationKind, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.00001, 2.0, 15))
            });
        registry.register(
            "session_planner_operation_duration_seconds",
            "Duration of plan operations in seconds",
            operation_duration_seconds.clone(),
        );

        Self {
            operations_total,
            compactions_total,
            slots_occupied,
            slots_capacity,
            operation_duration_seconds,
            registry,
        }
    }

    /// Record a finished operation
    pub fn record_operation(&self, operation: &str, outcome: &str, duration_secs: f64) {
        let labels = OperationLabels {
            operation: operation.to_string(),
            outcome: outcome.to_string(),
        };
        self.operations_total.get_or_create(&labels).inc();
        self.operation_duration_seconds
            .get_or_create(&OperationKind {
                operation: operation.to_string(),
            })
            .observe(duration_secs);
    }

    pub fn record_compaction(&self) {
        self.compactions_total.inc();
    }

    /// Update slot usage gauges
    pub fn set_usage(&self, occupied: u16, capacity: u16) {
        self.slots_occupied.set(i64::from(occupied));
        self.slots_capacity.set(i64::from(capacity));
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the plan is loaded and the API is serving
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
    /// Last successful plan mutation (Unix epoch seconds)
    pub last_change: AtomicI64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
            last_change: AtomicI64::new(0),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    /// Stamp the time of the latest successful mutation
    pub fn touch(&self) {
        self.last_change
            .store(jiff::Timestamp::now().as_second(), Ordering::Relaxed);
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the plan has been loaded.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on `addr`
pub async fn run_health_server(
    state: Arc<HealthState>,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let app = create_router(state);

    info!(%addr, "Starting health server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
