//! Card Store Core - Entity Types
//!
//! Pure data structures shared by every other crate in the workspace:
//! cards and their inputs, usage records, the content canonicalization
//! routine, and the error taxonomy. No I/O happens here.

pub mod canonical;
pub mod card;
pub mod error;
pub mod identity;
pub mod usage;

pub use canonical::{canonicalize, compute_content_hash};
pub use card::{
    Card, CardCreate, CardFilter, CardInput, CardType, DEFAULT_LIST_LIMIT, MAX_BATCH_SIZE,
    MAX_IDEMPOTENCY_KEY_LEN, MAX_LIST_LIMIT, MAX_RETRIEVE_IDS, MIN_BATCH_SIZE,
};
pub use error::{
    CardStoreError, CardStoreResult, ConfigError, EntityType, StorageError, ValidationError,
};
pub use identity::{new_entity_id, parse_tenant_id, CardId, EntityId, TenantId, Timestamp};
pub use usage::{UsageEvent, UsageOutcome};
