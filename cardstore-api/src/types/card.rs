//! Card request and response types

use cardstore_core::{Card, CardFilter, CardId, CardInput, CardType, TenantId, ValidationError};
use cardstore_storage::{BatchOutcome, CardBuckets, ContextBundle, RetrievalMetrics};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// BATCH CREATE
// ============================================================================

/// Request to create a batch of cards under one idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchCreateRequest {
    /// Between 1 and 100 cards
    pub cards: Vec<CardInput>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchCreateResponse {
    /// Created cards in input order
    pub cards: Vec<Card>,
    pub created_count: usize,
}

impl From<BatchOutcome> for BatchCreateResponse {
    fn from(outcome: BatchOutcome) -> Self {
        Self {
            created_count: outcome.cards.len(),
            cards: outcome.cards,
        }
    }
}

// ============================================================================
// RETRIEVE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RetrieveRequest {
    /// Between 1 and 100 card ids; duplicates are collapsed
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<String>))]
    pub card_ids: Vec<CardId>,
}

/// Found cards grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CardContext {
    pub company: Vec<Card>,
    pub audience: Vec<Card>,
    pub voice: Vec<Card>,
    pub insight: Vec<Card>,
}

impl From<CardBuckets> for CardContext {
    fn from(buckets: CardBuckets) -> Self {
        Self {
            company: buckets.company,
            audience: buckets.audience,
            voice: buckets.voice,
            insight: buckets.insight,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RetrievalStats {
    pub requested: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub fetched: usize,
    pub duration_ms: u64,
    pub hit_rate: f64,
}

impl From<RetrievalMetrics> for RetrievalStats {
    fn from(m: RetrievalMetrics) -> Self {
        Self {
            requested: m.requested,
            cache_hits: m.cache_hits,
            cache_misses: m.cache_misses,
            fetched: m.fetched,
            duration_ms: m.duration_ms,
            hit_rate: m.hit_rate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RetrieveResponse {
    /// Found cards in request order
    pub cards: Vec<Card>,
    /// Some requested ids were not found
    pub partial: bool,
    /// The store was unreachable; only cached cards were returned
    pub degraded: bool,
    pub context: CardContext,
    pub metrics: RetrievalStats,
}

impl From<ContextBundle> for RetrieveResponse {
    fn from(bundle: ContextBundle) -> Self {
        Self {
            cards: bundle.cards,
            partial: bundle.partial,
            degraded: bundle.degraded,
            context: bundle.buckets.into(),
            metrics: bundle.metrics.into(),
        }
    }
}

// ============================================================================
// USAGE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UsageRequest {
    pub workflow_id: String,
    /// Free-form label, e.g. "newsletter"
    pub workflow_type: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

// ============================================================================
// LIST
// ============================================================================

/// Query parameters for listing cards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct ListCardsQuery {
    pub card_type: Option<CardType>,
    /// Defaults to true
    pub is_active: Option<bool>,
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>, format = "uuid"))]
    pub source_session_id: Option<Uuid>,
    /// Defaults to 100, at most 1000
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListCardsQuery {
    /// Build a validated store filter for `tenant_id`.
    pub fn into_filter(self, tenant_id: TenantId) -> Result<CardFilter, ValidationError> {
        let mut filter = CardFilter::new(tenant_id);
        if let Some(card_type) = self.card_type {
            filter = filter.with_card_type(card_type);
        }
        if let Some(is_active) = self.is_active {
            filter = filter.with_active(is_active);
        }
        if let Some(session_id) = self.source_session_id {
            filter = filter.with_source_session(session_id);
        }
        let limit = self.limit.unwrap_or(filter.limit);
        let offset = self.offset.unwrap_or(filter.offset);
        filter = filter.with_page(limit, offset);
        filter.validate()?;
        Ok(filter)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ListCardsResponse {
    pub cards: Vec<Card>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults() {
        let tenant = Uuid::new_v4();
        let filter = ListCardsQuery::default().into_filter(tenant).unwrap();
        assert_eq!(filter.tenant_id, tenant);
        assert!(filter.is_active);
        assert_eq!(filter.limit, cardstore_core::DEFAULT_LIST_LIMIT);
        assert_eq!(filter.offset, 0);
    }

    #[test]
    fn test_list_query_rejects_oversized_limit() {
        let query = ListCardsQuery {
            limit: Some(cardstore_core::MAX_LIST_LIMIT + 1),
            ..Default::default()
        };
        assert!(query.into_filter(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_list_query_explicit_page() {
        let query = ListCardsQuery {
            card_type: Some(CardType::Voice),
            limit: Some(5),
            offset: Some(10),
            ..Default::default()
        };
        let filter = query.into_filter(Uuid::new_v4()).unwrap();
        assert_eq!(filter.card_type, Some(CardType::Voice));
        assert_eq!(filter.limit, 5);
        assert_eq!(filter.offset, 10);
    }

    #[test]
    fn test_batch_response_counts_cards() {
        let response = BatchCreateResponse::from(BatchOutcome {
            cards: Vec::new(),
            from_cache: true,
        });
        assert_eq!(response.created_count, 0);
    }

    #[test]
    fn test_usage_request_session_optional() {
        let req: UsageRequest =
            serde_json::from_str(r#"{"workflow_id":"run-1","workflow_type":"newsletter"}"#)
                .unwrap();
        assert!(req.session_id.is_none());
    }
}
