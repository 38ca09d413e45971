use std::sync::Arc;

use anyhow::Context;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use genpic_core::config::IngestConfig;
use genpic_db::dao::PgDao;
use genpic_db::models::generation_task::GenerationTask;
use genpic_db::models::picture::Picture;
use genpic_events::{EventBus, IngestEvent};
use genpic_ingest::{DirectoryWatcher, FileNameTaskResolver, IngestionCoordinator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "genpic_worker=debug,genpic_ingest=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = IngestConfig::from_env().context("Invalid ingestion configuration")?;
    tracing::info!(
        watch_dir = %config.watch_dir.display(),
        filter = %config.file_filter,
        debounce_ms = config.debounce.as_millis() as u64,
        concurrency = config.concurrency,
        "Loaded ingestion configuration"
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

    let pool = genpic_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    genpic_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    genpic_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let event_log_handle = tokio::spawn(log_events(event_bus.subscribe()));

    // --- Coordinator ---
    let tasks = Arc::new(PgDao::<GenerationTask>::new(pool.clone()));
    let pictures = Arc::new(PgDao::<Picture>::new(pool));
    let coordinator = Arc::new(
        IngestionCoordinator::new(
            &config,
            pictures,
            Arc::new(FileNameTaskResolver::new(tasks)),
        )
        .with_events(Arc::clone(&event_bus)),
    );

    // Pick up anything written while no worker was running. The watcher is
    // started first so files landing during this scan still trigger a cycle.
    let watcher = DirectoryWatcher::start(
        &config.watch_dir,
        config.file_filter.clone(),
        config.debounce,
        coordinator.clone(),
    )
    .context("Failed to watch directory")?;
    tracing::info!(dir = %watcher.dir().display(), "Watching for generated pictures");

    let report = coordinator
        .run_cycle()
        .await
        .context("Initial ingestion cycle failed")?;
    tracing::info!(
        inserted = report.inserted.len(),
        already_ingested = report.already_ingested.len(),
        failed = report.failures.len(),
        "Initial ingestion cycle complete"
    );

    shutdown_signal().await;

    // --- Shutdown ---
    watcher.stop().await;

    drop(coordinator);
    drop(event_bus);
    let _ = event_log_handle.await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Log every ingestion event until the bus is dropped.
async fn log_events(mut rx: broadcast::Receiver<IngestEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!(event = %json, "Ingestion event"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize ingestion event"),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event log lagged behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for SIGINT, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
