//! OpenAPI Specification for the Card Store API
//!
//! Generated by utoipa from the route annotations and schema derives.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use cardstore_core::{Card, CardInput, CardType, UsageOutcome};

use crate::error::{ApiError, ErrorCode};
use crate::routes::{cards, health};
use crate::types::*;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Card Store API",
        version = "0.1.0",
        description = "Tenant-scoped context cards with idempotent batch writes and cache-first retrieval",
    ),
    servers(
        (url = "http://localhost:8080", description = "Local Development")
    ),
    tags(
        (name = "Cards", description = "Batch creation, retrieval, usage tracking"),
        (name = "Health", description = "Liveness and readiness probes"),
    ),
    paths(
        cards::create_batch,
        cards::retrieve_cards,
        cards::track_usage,
        cards::list_cards,
        cards::get_card,
        cards::delete_card,
        health::liveness,
        health::readiness,
    ),
    components(schemas(
        ApiError,
        ErrorCode,
        Card,
        CardInput,
        CardType,
        UsageOutcome,
        BatchCreateRequest,
        BatchCreateResponse,
        RetrieveRequest,
        RetrieveResponse,
        CardContext,
        RetrievalStats,
        UsageRequest,
        ListCardsResponse,
        HealthResponse,
        HealthStatus,
        ReadinessResponse,
    )),
    modifiers(&TenantHeaderAddon),
)]
pub struct ApiDoc;

/// Documents `X-Tenant-ID` as a header scheme.
struct TenantHeaderAddon;

impl Modify for TenantHeaderAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "tenant_header",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-Tenant-ID"))),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
