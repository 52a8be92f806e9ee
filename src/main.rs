//! session-planner - serves one session plan over a JSON API.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads settings, the catalog and any saved plan snapshot
//! - Starts the health server and the plan API server

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use session_planner::catalog::Catalog;
use session_planner::config::load_settings;
use session_planner::health::{HealthState, run_health_server};
use session_planner::plan::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
use session_planner::{AppState, run_server};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("session_planner=info".parse()?),
        )
        .json()
        .init();

    info!("Starting session-planner");

    let settings = load_settings()?;
    let catalog = match &settings.catalog_path {
        Some(path) => {
            info!(?path, "Loading catalog");
            Catalog::load(path)?
        }
        None => Catalog::builtin(),
    };
    info!(
        topics = catalog.topics.len(),
        pathways = catalog.pathways.len(),
        packs = catalog.session_packs.len(),
        "Catalog ready"
    );

    let store: Arc<dyn SnapshotStore> = match &settings.snapshot_path {
        Some(path) => {
            info!(?path, "Persisting plan snapshots to file");
            Arc::new(FileSnapshotStore::new(path))
        }
        None => {
            info!("No snapshot path configured, plan is kept in memory");
            Arc::new(MemorySnapshotStore::new())
        }
    };

    let health_state = Arc::new(HealthState::new());
    let app_state = Arc::new(AppState::load(
        catalog,
        &settings,
        store,
        Some(health_state.clone()),
    )?);

    // Start health server immediately so probes work while the API binds
    let health_handle = {
        let health_state = health_state.clone();
        let addr = settings.health_addr();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, addr).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let mut api_handle = {
        let addr = settings.api_addr();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = run_server(app_state, addr, shutdown).await {
                error!("API server error: {}", e);
            }
        })
    };

    health_state.set_ready(true).await;

    let draining = tokio::select! {
        result = &mut api_handle => {
            if let Err(e) = result {
                error!("API server task panicked: {}", e);
            }
            false
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
            true
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
            health_state.set_ready(false).await;
            true
        }
    };

    if draining {
        // Let in-flight requests finish before exiting
        let _ = shutdown_tx.send(true);
        if let Err(e) = api_handle.await {
            error!("API server task panicked: {}", e);
        }
    }

    info!("session-planner stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Signal handler setup failures are fatal: without them the service cannot
/// shut down gracefully.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
