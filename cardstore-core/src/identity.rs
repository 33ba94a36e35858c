//! Identity types for card store entities

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::ValidationError;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Card identifier.
pub type CardId = EntityId;

/// Tenant identifier. Every card and idempotency entry belongs to exactly one.
pub type TenantId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Parse a tenant identifier from its textual (header) form.
pub fn parse_tenant_id(raw: &str) -> Result<TenantId, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "tenant_id".to_string(),
        });
    }
    Uuid::parse_str(trimmed).map_err(|_| ValidationError::InvalidTenantId {
        value: raw.to_string(),
    })
}
