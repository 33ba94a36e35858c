//! Card usage tracking records

use crate::error::ValidationError;
use crate::identity::{CardId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One workflow's use of a card. Deduplicated on (tenant, card, workflow).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageEvent {
    pub card_id: CardId,
    pub tenant_id: TenantId,
    pub workflow_id: String,
    pub workflow_type: String,
    pub session_id: Option<Uuid>,
}

impl UsageEvent {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workflow_id.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "workflow_id".to_string(),
            });
        }
        if self.workflow_type.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "workflow_type".to_string(),
            });
        }
        Ok(())
    }
}

/// Result of tracking a usage event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UsageOutcome {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub card_id: CardId,
    pub usage_count: i64,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub last_used_at: Timestamp,
    /// False when the (card, workflow) pair had already been recorded.
    pub event_recorded: bool,
}
