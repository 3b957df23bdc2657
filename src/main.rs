//! crud_cache server binary
//!
//! Serves the notes resource over HTTP with a persisted read-through cache.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crud_cache::api::{create_router, resource_router, AppState};
use crud_cache::cache::{CacheStore, FlushOutcome, PersistenceManager};
use crud_cache::config::Config;
use crud_cache::engine::{EngineClient, MemoryEngine, Resource};
use crud_cache::error::ErrorMapper;
use crud_cache::resources::{notes_controller, Note};
use crud_cache::tasks::{spawn_cleanup_task, spawn_flush_task};

/// Main entry point for the server.
///
/// # Startup Sequence
/// 1. Load an optional `.env` file and initialize logging
/// 2. Load configuration from environment variables
/// 3. Connect the persistence engine (fatal on failure)
/// 4. Create the cache store and load the snapshot
/// 5. Start background flush and TTL cleanup tasks
/// 6. Serve HTTP until SIGINT/SIGTERM
/// 7. Stop the tasks and run a final flush
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crud_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(err) = run().await {
        error!("Server terminated: {:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    info!("Starting crud_cache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, env={:?}, default_ttl={}s, snapshot={}, \
         flush_interval={}s, cleanup_interval={}s",
        config.server_port,
        config.environment,
        config.default_ttl,
        config.snapshot_path.display(),
        config.flush_interval,
        config.cleanup_interval
    );

    let engine = Arc::new(MemoryEngine::with_unique(&[(Note::NAME, "title")]));
    engine
        .connect()
        .await
        .context("Failed to connect to the persistence engine")?;
    info!("Persistence engine connected");

    let cache = CacheStore::new(config.default_ttl).shared();
    let persistence = Arc::new(PersistenceManager::new(
        cache.clone(),
        config.snapshot_path.clone(),
    ));
    let loaded = persistence.load().await;
    info!("Cache store initialized: {:?}", loaded);

    let flush_handle = spawn_flush_task(persistence.clone(), config.flush_interval);
    let cleanup_handle = spawn_cleanup_task(cache.clone(), config.cleanup_interval);
    info!("Background tasks started");

    let mapper = ErrorMapper::from_config(&config);
    let notes = Arc::new(notes_controller(
        engine.clone(),
        engine.model::<Note>(),
        cache.clone(),
        config.resource_cache_ttl,
    ));
    let app = create_router(AppState::new(cache), resource_router(notes, mapper));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    flush_handle.abort();
    cleanup_handle.abort();
    warn!("Background tasks aborted");

    final_flush(&persistence, config.shutdown_flush_timeout).await;

    if let Err(err) = engine.disconnect().await {
        warn!("Failed to disconnect persistence engine: {}", err);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Flushes the cache one last time, bounded by `timeout_secs`.
async fn final_flush(persistence: &PersistenceManager, timeout_secs: u64) {
    match tokio::time::timeout(Duration::from_secs(timeout_secs), persistence.flush()).await {
        Ok(Ok(FlushOutcome::Written { entries })) => {
            info!("Final snapshot written with {} entries", entries)
        }
        Ok(Ok(FlushOutcome::Skipped)) => info!("Cache clean at shutdown, nothing to flush"),
        Ok(Err(err)) => error!(
            path = %persistence.path().display(),
            "Final cache flush failed, unsaved entries are lost: {}", err
        ),
        Err(_) => error!(
            path = %persistence.path().display(),
            "Final cache flush timed out after {}s, unsaved entries are lost", timeout_secs
        ),
    }
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// Once it resolves the server stops accepting connections.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
