//! Health Check Endpoints
//!
//! - /health - liveness, always 200 while the process serves requests
//! - /ready - readiness, round-trips the database when one is configured
//!
//! Neither endpoint requires a tenant header.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};

use crate::db::DbClient;
use crate::state::AppState;
use crate::types::{HealthResponse, HealthStatus, ReadinessResponse};

pub const SERVICE_NAME: &str = "cardstore-api";

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health - Process liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = HealthResponse),
    ),
)]
pub async fn liveness() -> impl IntoResponse {
    Json(HealthResponse {
        status: HealthStatus::Healthy,
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /ready - Readiness check (database connectivity)
#[utoipa::path(
    get,
    path = "/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service is not ready", body = ReadinessResponse),
    ),
)]
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let (database_latency_ms, reason) = match &state.db {
        None => (None, None),
        Some(db) => match check_database(db).await {
            Ok(latency) => (Some(latency), None),
            Err(e) => (None, Some(e)),
        },
    };

    let status = if reason.is_none() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    let status_code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = ReadinessResponse {
        status,
        database_latency_ms,
        reason,
        cache_entries: state.cache.len(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    (status_code, Json(response))
}

async fn check_database(db: &DbClient) -> Result<u64, String> {
    db.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        format!("Database check failed: {}", e.message)
    })
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the health router, merged at the root.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(liveness))
        .route("/ready", get(readiness))
}
