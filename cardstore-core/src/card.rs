//! Card entity and its inputs

use crate::canonical::compute_content_hash;
use crate::error::ValidationError;
use crate::identity::{new_entity_id, CardId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// LIMITS
// ============================================================================

/// Minimum number of cards in one batch create.
pub const MIN_BATCH_SIZE: usize = 1;

/// Maximum number of cards in one batch create.
pub const MAX_BATCH_SIZE: usize = 100;

/// Maximum number of ids in one retrieve call.
pub const MAX_RETRIEVE_IDS: usize = 100;

/// Default page size for list operations.
pub const DEFAULT_LIST_LIMIT: i64 = 100;

/// Maximum page size for list operations.
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Maximum idempotency key length.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 256;

// ============================================================================
// CARD TYPE
// ============================================================================

/// Kind of context a card carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum CardType {
    Company,
    Audience,
    Voice,
    Insight,
}

impl CardType {
    /// Every card type, in bucket order.
    pub const ALL: [CardType; 4] = [
        CardType::Company,
        CardType::Audience,
        CardType::Voice,
        CardType::Insight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Company => "company",
            CardType::Audience => "audience",
            CardType::Voice => "voice",
            CardType::Insight => "insight",
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" => Ok(CardType::Company),
            "audience" => Ok(CardType::Audience),
            "voice" => Ok(CardType::Voice),
            "insight" => Ok(CardType::Insight),
            _ => Err(ValidationError::InvalidValue {
                field: "card_type".to_string(),
                reason: format!("unknown card type '{}'", s),
            }),
        }
    }
}

// ============================================================================
// CARD
// ============================================================================

/// A typed, tenant-scoped structured document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Card {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub card_id: CardId,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub tenant_id: TenantId,
    pub card_type: CardType,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub content: serde_json::Value,
    pub content_hash: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub source_session_id: Option<Uuid>,
    pub created_by: String,
    pub is_active: bool,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub deleted_at: Option<Timestamp>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
    #[serde(default)]
    pub usage_count: i64,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "date-time"))]
    pub last_used_at: Option<Timestamp>,
}

/// One card as submitted in a batch request, before the tenant and creator are attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CardInput {
    pub card_type: CardType,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub content: serde_json::Value,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub source_session_id: Option<Uuid>,
}

/// Everything needed to persist a new card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardCreate {
    pub tenant_id: TenantId,
    pub card_type: CardType,
    pub content: serde_json::Value,
    pub source_session_id: Option<Uuid>,
    pub created_by: String,
}

impl CardCreate {
    pub fn new(
        tenant_id: TenantId,
        card_type: CardType,
        content: serde_json::Value,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id,
            card_type,
            content,
            source_session_id: None,
            created_by: created_by.into(),
        }
    }

    pub fn from_input(input: CardInput, tenant_id: TenantId, created_by: impl Into<String>) -> Self {
        Self {
            tenant_id,
            card_type: input.card_type,
            content: input.content,
            source_session_id: input.source_session_id,
            created_by: created_by.into(),
        }
    }

    pub fn with_source_session(mut self, session_id: Uuid) -> Self {
        self.source_session_id = Some(session_id);
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.content.is_object() {
            return Err(ValidationError::InvalidValue {
                field: "content".to_string(),
                reason: "must be a JSON object".to_string(),
            });
        }
        if self.created_by.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "created_by".to_string(),
            });
        }
        Ok(())
    }

    pub fn content_hash(&self) -> String {
        compute_content_hash(&self.content)
    }

    /// Materialize the card with a fresh id. Storage backends that assign
    /// ids and timestamps themselves do not use this.
    pub fn into_card(self, now: Timestamp) -> Card {
        let content_hash = self.content_hash();
        Card {
            card_id: new_entity_id(),
            tenant_id: self.tenant_id,
            card_type: self.card_type,
            content: self.content,
            content_hash,
            source_session_id: self.source_session_id,
            created_by: self.created_by,
            is_active: true,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            usage_count: 0,
            last_used_at: None,
        }
    }
}

// ============================================================================
// FILTER
// ============================================================================

/// Filter criteria for listing cards. Results are ordered newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardFilter {
    pub tenant_id: TenantId,
    pub card_type: Option<CardType>,
    pub is_active: bool,
    pub source_session_id: Option<Uuid>,
    pub limit: i64,
    pub offset: i64,
}

impl CardFilter {
    pub fn new(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            card_type: None,
            is_active: true,
            source_session_id: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }

    pub fn with_card_type(mut self, card_type: CardType) -> Self {
        self.card_type = Some(card_type);
        self
    }

    pub fn with_active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn with_source_session(mut self, session_id: Uuid) -> Self {
        self.source_session_id = Some(session_id);
        self
    }

    pub fn with_page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=MAX_LIST_LIMIT).contains(&self.limit) {
            return Err(ValidationError::InvalidValue {
                field: "limit".to_string(),
                reason: format!("must be between 1 and {}", MAX_LIST_LIMIT),
            });
        }
        if self.offset < 0 {
            return Err(ValidationError::InvalidValue {
                field: "offset".to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        Ok(())
    }

    /// Whether `card` satisfies every criterion except paging.
    pub fn matches(&self, card: &Card) -> bool {
        card.tenant_id == self.tenant_id
            && card.is_active == self.is_active
            && self.card_type.map_or(true, |t| card.card_type == t)
            && self
                .source_session_id
                .map_or(true, |s| card.source_session_id == Some(s))
    }
}
