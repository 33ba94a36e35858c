//! Card Store API Server Entry Point
//!
//! Loads configuration, builds the PostgreSQL-backed services, starts the
//! idempotency sweep, and serves HTTP until ctrl-c.

use cardstore_api::jobs::{idempotency_sweep_task, IdempotencySweepConfig};
use cardstore_api::telemetry::{init_tracing, TelemetryConfig};
use cardstore_api::{
    create_router, ApiError, ApiResult, AppState, Backends, DbClient, DbConfig, ServiceConfig,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::from_env()?;
    init_tracing(&telemetry_config)?;

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Card store API exited with error");
        return Err(e);
    }
    Ok(())
}

async fn run() -> ApiResult<()> {
    let service_config = ServiceConfig::from_env()?;
    let db_config = DbConfig::from_env()?;
    let db = DbClient::from_config(&db_config)?;
    tracing::info!(
        host = %db_config.host,
        dbname = %db_config.dbname,
        pool_max_size = db_config.max_size,
        "Database pool created"
    );

    let state = AppState::new(Backends::postgres(db), &service_config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweep = service_config.purge_interval.map(|every| {
        tokio::spawn(idempotency_sweep_task(
            state.idempotency.clone(),
            IdempotencySweepConfig::with_interval(every),
            shutdown_rx,
        ))
    });

    let app = create_router(state, &service_config.cors_origins);

    let addr = service_config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;
    tracing::info!(%addr, "Starting card store API server");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)));

    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweep {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Idempotency sweep task did not stop cleanly");
        }
    }

    served?;
    tracing::info!("Card store API stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
