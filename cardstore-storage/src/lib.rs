//! Card Store Storage - Traits, Backends and Services
//!
//! Defines the storage abstraction for cards, idempotency entries and usage
//! events, an in-memory backend used by tests and local runs, the
//! process-local card cache, and the two services built on top of them.
//! The Postgres backend lives in cardstore-api.

pub mod batch;
pub mod cache;
pub mod deadline;
pub mod memory;
pub mod retrieval;
pub mod traits;

pub use batch::{
    validate_batch_size, validate_idempotency_key, BatchConfig, BatchContext, BatchOutcome,
    BatchResult, CardBatchService, IdempotencyFailureMode, DEFAULT_IDEMPOTENCY_TTL,
    DEFAULT_LEASE_TTL,
};
pub use cache::{CacheConfig, CacheStats, CardCache, TenantScopedKey};
pub use deadline::with_timeout;
pub use memory::{InMemoryCardStore, InMemoryIdempotencyStore};
pub use retrieval::{
    CardBuckets, CardRetrievalService, ContextBundle, RetrievalConfig, RetrievalContext,
    RetrievalMetrics,
};
pub use traits::{CardStore, IdempotencyStore, Reservation, UsageStore};
