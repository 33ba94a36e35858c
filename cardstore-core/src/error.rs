//! Error types for card store operations

use crate::card::CardType;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Entity type discriminator used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    Card,
    IdempotencyEntry,
    UsageEvent,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityType::Card => "card",
            EntityType::IdempotencyEntry => "idempotency entry",
            EntityType::UsageEvent => "usage event",
        };
        f.write_str(name)
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Duplicate {card_type} card content for tenant {tenant_id} (hash {content_hash})")]
    Conflict {
        tenant_id: Uuid,
        card_type: CardType,
        content_hash: String,
    },

    #[error("Operation {operation} timed out after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Query failed: {reason}")]
    Query { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// Transient failures a caller may retry without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Timeout { .. } | StorageError::Connection { .. }
        )
    }
}

/// Validation errors. Always raised before any storage side effect.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid tenant id: {value}")]
    InvalidTenantId { value: String },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Batch size {size} outside allowed range {min}..={max}")]
    BatchSize { size: usize, min: usize, max: usize },

    #[error("Card belongs to tenant {got}, expected {expected}")]
    TenantMismatch { expected: Uuid, got: Uuid },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for the card store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CardStoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl CardStoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CardStoreError::Storage(e) if e.is_retryable())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CardStoreError::Storage(StorageError::Conflict { .. }))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CardStoreError::Storage(StorageError::NotFound { .. }))
    }
}

/// Result type alias for card store operations.
pub type CardStoreResult<T> = Result<T, CardStoreError>;

// =============================================================================
// TESTS
// =============================================================================
