//! JSON API around a single plan session.
//!
//! Handlers serialize on one async mutex so every plan operation runs to
//! completion before the next starts. After each successful mutation the
//! plan snapshot is saved and the usage metrics are refreshed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::catalog::{Catalog, CatalogError, TopicKey};
use crate::config::Settings;
use crate::error::PlanError;
use crate::health::HealthState;
use crate::plan::{
    AddOutcome, PlanChange, PlanManager, PlanView, SnapshotStore, StoreError, ToggleOutcome,
};

/// Errors surfaced by API handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("invalid topic key: {0}")]
    InvalidKey(#[from] CatalogError),
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Plan(e) => e.kind(),
            ApiError::InvalidKey(_) => "invalid_key",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Plan(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ApiError::InvalidKey(_) => StatusCode::BAD_REQUEST,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Errors raised while bringing the service up.
#[derive(Error, Debug)]
pub enum ServeError {
    #[error("failed to load plan snapshot: {0}")]
    Store(#[from] StoreError),

    #[error("cannot restore plan: {0}")]
    Plan(#[from] PlanError),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Anything a mutation can return that may carry a [`PlanChange`].
pub trait Outcome: Serialize {
    fn change(&self) -> Option<&PlanChange>;
}

impl Outcome for PlanChange {
    fn change(&self) -> Option<&PlanChange> {
        Some(self)
    }
}

impl Outcome for AddOutcome {
    fn change(&self) -> Option<&PlanChange> {
        match self {
            AddOutcome::Committed { change } => Some(change),
            AddOutcome::NeedsConfirmation { .. } => None,
        }
    }
}

impl Outcome for ToggleOutcome {
    fn change(&self) -> Option<&PlanChange> {
        match self {
            ToggleOutcome::Removed { change } => Some(change),
            ToggleOutcome::Proposed { outcome } => outcome.change(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Cancelled {
    pub cancelled: TopicKey,
}

impl Outcome for Cancelled {
    fn change(&self) -> Option<&PlanChange> {
        None
    }
}

/// Mutation result plus the plan as it now stands.
#[derive(Debug, Serialize)]
pub struct MutationResponse<T> {
    #[serde(flatten)]
    pub outcome: T,
    pub plan: PlanView,
}

pub struct AppState {
    manager: Mutex<PlanManager>,
    store: Arc<dyn SnapshotStore>,
    health: Option<Arc<HealthState>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        manager: PlanManager,
        store: Arc<dyn SnapshotStore>,
        health: Option<Arc<HealthState>>,
    ) -> Self {
        if let Some(health) = &health {
            let state = manager.state();
            health
                .metrics
                .set_usage(state.occupied_count(), state.capacity());
        }
        Self {
            manager: Mutex::new(manager),
            store,
            health,
        }
    }

    /// Restore the plan saved in `store`, or start a fresh one.
    pub fn load(
        catalog: Catalog,
        settings: &Settings,
        store: Arc<dyn SnapshotStore>,
        health: Option<Arc<HealthState>>,
    ) -> Result<Self, ServeError> {
        let manager = match store.load()? {
            Some(snapshot) => PlanManager::restore(catalog, snapshot)?,
            None => {
                let pack = match settings.default_pack {
                    Some(sessions) => catalog
                        .session_pack(sessions)
                        .ok_or(PlanError::UnknownSessionPack { sessions })?,
                    None => catalog.default_pack().ok_or_else(|| {
                        PlanError::InvalidState("catalog offers no session packs".into())
                    })?,
                };
                info!(sessions = pack.sessions, "starting with an empty plan");
                PlanManager::new(catalog, pack)
            }
        };
        Ok(Self::new(
            manager.with_unit_price(settings.unit_price_minor),
            store,
            health,
        ))
    }

    /// Run `op` against the plan, then persist and record metrics.
    async fn mutate<T, F>(
        &self,
        operation: &'static str,
        op: F,
    ) -> Result<Json<MutationResponse<T>>, ApiError>
    where
        T: Outcome,
        F: FnOnce(&mut PlanManager) -> Result<T, ApiError>,
    {
        let started = Instant::now();
        let mut manager = self.manager.lock().await;
        let result = op(&mut *manager);
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                if let Some(health) = &self.health {
                    health.metrics.record_operation(operation, e.kind(), elapsed);
                }
                return Err(e);
            }
        };

        if let Some(change) = outcome.change() {
            if let Err(e) = self.store.save(&manager.snapshot()) {
                error!(operation, error = %e, "failed to save plan snapshot");
            }
            if let Some(health) = &self.health {
                if change.compacted() {
                    health.metrics.record_compaction();
                }
                health.touch();
            }
        }
        if let Some(health) = &self.health {
            let state = manager.state();
            health.metrics.record_operation(operation, "ok", elapsed);
            health
                .metrics
                .set_usage(state.occupied_count(), state.capacity());
        }

        Ok(Json(MutationResponse {
            outcome,
            plan: manager.view(),
        }))
    }
}

#[derive(Debug, Deserialize)]
pub struct TopicRequest {
    pub key: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub to: u16,
}

#[derive(Debug, Deserialize)]
pub struct SwapRequest {
    pub a: u16,
    pub b: u16,
}

#[derive(Debug, Deserialize)]
pub struct PathwayRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PackRequest {
    pub sessions: u16,
}

async fn get_catalog(State(state): State<SharedState>) -> Json<Catalog> {
    Json(state.manager.lock().await.catalog().clone())
}

async fn get_plan(State(state): State<SharedState>) -> Json<PlanView> {
    Json(state.manager.lock().await.view())
}

async fn add_topic(
    State(state): State<SharedState>,
    Json(req): Json<TopicRequest>,
) -> Result<Json<MutationResponse<AddOutcome>>, ApiError> {
    let key = TopicKey::new(req.key)?;
    state
        .mutate("add", |m| Ok(m.propose_add(&key)?))
        .await
}

async fn confirm_topic(
    State(state): State<SharedState>,
) -> Result<Json<MutationResponse<PlanChange>>, ApiError> {
    state.mutate("confirm", |m| Ok(m.confirm_add()?)).await
}

async fn cancel_topic(
    State(state): State<SharedState>,
) -> Result<Json<MutationResponse<Cancelled>>, ApiError> {
    state
        .mutate("cancel", |m| {
            Ok(Cancelled {
                cancelled: m.cancel_add()?,
            })
        })
        .await
}

async fn toggle_topic(
    State(state): State<SharedState>,
    Json(req): Json<TopicRequest>,
) -> Result<Json<MutationResponse<ToggleOutcome>>, ApiError> {
    let key = TopicKey::new(req.key)?;
    state.mutate("toggle", |m| Ok(m.toggle(&key)?)).await
}

async fn remove_instance(
    State(state): State<SharedState>,
    Path(start): Path<u16>,
) -> Result<Json<MutationResponse<PlanChange>>, ApiError> {
    state.mutate("remove", |m| Ok(m.remove(start)?)).await
}

async fn move_instance(
    State(state): State<SharedState>,
    Path(start): Path<u16>,
    Json(req): Json<MoveRequest>,
) -> Result<Json<MutationResponse<PlanChange>>, ApiError> {
    state
        .mutate("move", |m| Ok(m.move_instance(start, req.to)?))
        .await
}

async fn swap_instances(
    State(state): State<SharedState>,
    Json(req): Json<SwapRequest>,
) -> Result<Json<MutationResponse<PlanChange>>, ApiError> {
    state.mutate("swap", |m| Ok(m.swap(req.a, req.b)?)).await
}

async fn apply_pathway(
    State(state): State<SharedState>,
    Json(req): Json<PathwayRequest>,
) -> Result<Json<MutationResponse<PlanChange>>, ApiError> {
    state
        .mutate("pathway", |m| Ok(m.apply_pathway(&req.name)?))
        .await
}

async fn select_pack(
    State(state): State<SharedState>,
    Json(req): Json<PackRequest>,
) -> Result<Json<MutationResponse<PlanChange>>, ApiError> {
    state
        .mutate("pack", |m| Ok(m.select_pack(req.sessions)?))
        .await
}

async fn reset_plan(
    State(state): State<SharedState>,
) -> Result<Json<MutationResponse<PlanChange>>, ApiError> {
    state.mutate("reset", |m| Ok(m.reset())).await
}

/// Create the plan API router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/catalog", get(get_catalog))
        .route("/plan", get(get_plan))
        .route("/plan/topics", post(add_topic))
        .route("/plan/topics/confirm", post(confirm_topic))
        .route("/plan/topics/cancel", post(cancel_topic))
        .route("/plan/toggle", post(toggle_topic))
        .route("/plan/instances/{start}", delete(remove_instance))
        .route("/plan/instances/{start}/move", post(move_instance))
        .route("/plan/swap", post(swap_instances))
        .route("/plan/pathway", post(apply_pathway))
        .route("/plan/pack", put(select_pack))
        .route("/plan/reset", post(reset_plan))
        .with_state(state)
}

/// Serve the plan API on `addr` until `shutdown` resolves.
pub async fn run_server<F>(
    state: SharedState,
    addr: SocketAddr,
    shutdown: F,
) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!(%addr, "Starting plan API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
