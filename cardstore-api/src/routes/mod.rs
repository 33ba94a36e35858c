//! REST API Routes Module
//!
//! - Card routes under /api/v1/cards (tenant header required)
//! - Health and readiness at /health and /ready
//! - Prometheus metrics at /metrics
//! - OpenAPI document at /openapi.json

pub mod cards;
pub mod health;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::from_fn,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

pub use cards::create_router as cards_router;
pub use health::create_router as health_router;

const CORS_MAX_AGE: Duration = Duration::from_secs(3600);

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer. An empty origin list allows any origin.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .max_age(CORS_MAX_AGE);

    if origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        return cors.allow_origin(Any).allow_headers(Any).expose_headers(Any);
    }

    tracing::info!(origins = ?origins, "CORS: allowing configured origins");
    let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    cors.allow_origin(allowed)
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-tenant-id"),
            HeaderName::from_static("x-trace-id"),
            HeaderName::from_static("idempotency-key"),
        ])
        .expose_headers([
            HeaderName::from_static(cards::IDEMPOTENCY_CACHE_HEADER),
            HeaderName::from_static(cards::EXECUTION_TIME_HEADER),
            HeaderName::from_static(cards::PARTIAL_RESULT_HEADER),
            HeaderName::from_static(cards::EVENT_RECORDED_HEADER),
        ])
}

/// Create the complete service router.
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .nest("/api/v1/cards", cards::create_router())
        .merge(health::create_router())
        .route("/metrics", get(metrics_handler))
        .route("/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer(cors_origins))
                .layer(from_fn(observability_middleware)),
        )
}
