//! Card REST API Routes
//!
//! Batch creation under an idempotency key, cache-first retrieval, usage
//! tracking, and the plain read/list/delete surface. Every handler is
//! scoped to the tenant named by `X-Tenant-ID`.

use std::time::Instant;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use cardstore_core::{EntityType, StorageError, UsageEvent, MAX_RETRIEVE_IDS};
use cardstore_storage::{with_timeout, BatchContext, RetrievalContext};

use crate::{
    error::{ApiError, ApiResult},
    extractors::{CardPath, IdempotencyKey, Tenant, TraceId},
    state::AppState,
    telemetry::metrics,
    types::{
        BatchCreateRequest, BatchCreateResponse, ListCardsQuery, ListCardsResponse,
        RetrieveRequest, RetrieveResponse, UsageRequest,
    },
};

pub const IDEMPOTENCY_CACHE_HEADER: &str = "x-idempotency-cache";
pub const EXECUTION_TIME_HEADER: &str = "x-execution-time-ms";
pub const PARTIAL_RESULT_HEADER: &str = "x-partial-result";
pub const EVENT_RECORDED_HEADER: &str = "x-event-recorded";

fn elapsed_ms(started: Instant) -> String {
    started.elapsed().as_millis().to_string()
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/v1/cards/batch - Create up to 100 cards idempotently
#[utoipa::path(
    post,
    path = "/api/v1/cards/batch",
    tag = "Cards",
    request_body = BatchCreateRequest,
    params(
        ("X-Tenant-ID" = String, Header, description = "Tenant UUID"),
        ("Idempotency-Key" = String, Header, description = "Client-chosen key, 1 to 256 characters"),
        ("X-Trace-ID" = Option<String>, Header, description = "Caller trace id"),
    ),
    responses(
        (status = 201, description = "Cards created or replayed", body = BatchCreateResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 409, description = "An active card with the same content exists", body = ApiError),
        (status = 503, description = "Storage unavailable", body = ApiError),
        (status = 504, description = "Storage timed out", body = ApiError),
    ),
)]
pub async fn create_batch(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    TraceId(trace_id): TraceId,
    IdempotencyKey(key): IdempotencyKey,
    Json(req): Json<BatchCreateRequest>,
) -> ApiResult<impl IntoResponse> {
    let started = Instant::now();
    let ctx = BatchContext::from_trace(trace_id);

    let outcome = state
        .batch
        .submit_batch(tenant_id, &key, req.cards, &ctx)
        .await?;

    if let Some(m) = metrics() {
        m.record_batch(outcome.from_cache, &outcome.cards);
    }
    let cache = if outcome.from_cache { "HIT" } else { "MISS" };

    Ok((
        StatusCode::CREATED,
        [
            (IDEMPOTENCY_CACHE_HEADER, cache.to_string()),
            (EXECUTION_TIME_HEADER, elapsed_ms(started)),
        ],
        Json(BatchCreateResponse::from(outcome)),
    ))
}

/// POST /api/v1/cards/retrieve - Fetch cards by id, cache first
#[utoipa::path(
    post,
    path = "/api/v1/cards/retrieve",
    tag = "Cards",
    request_body = RetrieveRequest,
    params(
        ("X-Tenant-ID" = String, Header, description = "Tenant UUID"),
    ),
    responses(
        (status = 200, description = "Found cards; missing ids are omitted", body = RetrieveResponse),
        (status = 400, description = "Invalid request", body = ApiError),
    ),
)]
pub async fn retrieve_cards(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    TraceId(trace_id): TraceId,
    Json(req): Json<RetrieveRequest>,
) -> ApiResult<impl IntoResponse> {
    let started = Instant::now();

    if req.card_ids.is_empty() {
        return Err(ApiError::missing_field("card_ids"));
    }
    if req.card_ids.len() > MAX_RETRIEVE_IDS {
        return Err(ApiError::validation_failed(format!(
            "card_ids must contain at most {} ids, got {}",
            MAX_RETRIEVE_IDS,
            req.card_ids.len()
        )));
    }

    let ctx = RetrievalContext {
        trace_id,
        ..RetrievalContext::default()
    };
    let bundle = state.retrieval.retrieve(tenant_id, &req.card_ids, &ctx).await;

    if let Some(m) = metrics() {
        m.record_retrieval(
            bundle.metrics.cache_hits,
            bundle.metrics.cache_misses,
            bundle.degraded,
        );
    }
    let partial = bundle.partial;

    Ok((
        StatusCode::OK,
        [
            (PARTIAL_RESULT_HEADER, partial.to_string()),
            (EXECUTION_TIME_HEADER, elapsed_ms(started)),
        ],
        Json(RetrieveResponse::from(bundle)),
    ))
}

/// POST /api/v1/cards/{card_id}/usage - Record that a workflow used a card
#[utoipa::path(
    post,
    path = "/api/v1/cards/{card_id}/usage",
    tag = "Cards",
    request_body = UsageRequest,
    params(
        ("card_id" = String, Path, description = "Card UUID"),
        ("X-Tenant-ID" = String, Header, description = "Tenant UUID"),
    ),
    responses(
        (status = 200, description = "Usage recorded or already known", body = cardstore_core::UsageOutcome),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 404, description = "Card not found", body = ApiError),
    ),
)]
pub async fn track_usage(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    CardPath(card_id): CardPath,
    Json(req): Json<UsageRequest>,
) -> ApiResult<impl IntoResponse> {
    let event = UsageEvent {
        card_id,
        tenant_id,
        workflow_id: req.workflow_id,
        workflow_type: req.workflow_type,
        session_id: req.session_id,
    };
    event.validate()?;

    let outcome = with_timeout(
        "track_usage",
        state.store_timeout,
        state.usage.track_usage(&event),
    )
    .await?;

    if outcome.event_recorded {
        // Cached copy carries the old usage_count.
        state.retrieval.invalidate(tenant_id, card_id);
        if let Some(m) = metrics() {
            m.record_usage_event(&event.workflow_type);
        }
    }
    tracing::debug!(
        tenant_id = %tenant_id,
        card_id = %card_id,
        workflow_id = %event.workflow_id,
        event_recorded = outcome.event_recorded,
        "Card usage tracked"
    );

    Ok((
        StatusCode::OK,
        [(EVENT_RECORDED_HEADER, outcome.event_recorded.to_string())],
        Json(outcome),
    ))
}

/// GET /api/v1/cards - List cards, newest first
#[utoipa::path(
    get,
    path = "/api/v1/cards",
    tag = "Cards",
    params(
        ("X-Tenant-ID" = String, Header, description = "Tenant UUID"),
        ListCardsQuery,
    ),
    responses(
        (status = 200, description = "Matching cards", body = ListCardsResponse),
        (status = 400, description = "Invalid request", body = ApiError),
    ),
)]
pub async fn list_cards(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    Query(params): Query<ListCardsQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = params.into_filter(tenant_id)?;
    let cards = with_timeout("list", state.store_timeout, state.cards.list(&filter)).await?;
    Ok(Json(ListCardsResponse { cards }))
}

/// GET /api/v1/cards/{card_id} - Get a card by id
#[utoipa::path(
    get,
    path = "/api/v1/cards/{card_id}",
    tag = "Cards",
    params(
        ("card_id" = String, Path, description = "Card UUID"),
        ("X-Tenant-ID" = String, Header, description = "Tenant UUID"),
    ),
    responses(
        (status = 200, description = "Card found", body = cardstore_core::Card),
        (status = 404, description = "Card not found", body = ApiError),
    ),
)]
pub async fn get_card(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    CardPath(card_id): CardPath,
) -> ApiResult<impl IntoResponse> {
    let card = with_timeout("get", state.store_timeout, state.cards.get(card_id, tenant_id))
        .await?
        .ok_or_else(|| ApiError::entity_not_found(&EntityType::Card.to_string(), card_id))?;
    Ok(Json(card))
}

/// DELETE /api/v1/cards/{card_id} - Soft-delete a card
#[utoipa::path(
    delete,
    path = "/api/v1/cards/{card_id}",
    tag = "Cards",
    params(
        ("card_id" = String, Path, description = "Card UUID"),
        ("X-Tenant-ID" = String, Header, description = "Tenant UUID"),
    ),
    responses(
        (status = 204, description = "Card deactivated"),
        (status = 404, description = "No active card with this id", body = ApiError),
    ),
)]
pub async fn delete_card(
    State(state): State<AppState>,
    Tenant(tenant_id): Tenant,
    CardPath(card_id): CardPath,
) -> ApiResult<StatusCode> {
    let deleted = with_timeout(
        "soft_delete",
        state.store_timeout,
        state.cards.soft_delete(card_id, tenant_id),
    )
    .await?;
    if !deleted {
        return Err(StorageError::NotFound {
            entity_type: EntityType::Card,
            id: card_id.to_string(),
        }
        .into());
    }

    state.retrieval.invalidate(tenant_id, card_id);
    tracing::info!(tenant_id = %tenant_id, card_id = %card_id, "Card soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create the card router, mounted at `/api/v1/cards`.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_cards))
        .route("/batch", post(create_batch))
        .route("/retrieve", post(retrieve_cards))
        .route("/:card_id", get(get_card).delete(delete_card))
        .route("/:card_id/usage", post(track_usage))
}
