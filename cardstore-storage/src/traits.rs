//! Async storage traits for cards, idempotency entries and usage events.
//!
//! Every operation takes the tenant explicitly. Implementations must scope
//! each statement to that tenant; a row owned by another tenant is reported
//! as absent, never as an error.

use std::time::Duration;

use ::async_trait::async_trait;
use cardstore_core::{
    Card, CardCreate, CardFilter, CardId, CardStoreResult, TenantId, UsageEvent, UsageOutcome,
};

/// Durable, tenant-scoped persistence for cards.
#[async_trait]
pub trait CardStore: Send + Sync {
    /// Persist one card. Duplicate active content within (tenant, type)
    /// fails with `StorageError::Conflict`.
    async fn create(&self, card: CardCreate) -> CardStoreResult<Card>;

    /// Get an active card. Soft-deleted or foreign cards are `None`.
    async fn get(&self, card_id: CardId, tenant_id: TenantId) -> CardStoreResult<Option<Card>>;

    /// Fetch many active cards in one round trip. Missing ids are skipped;
    /// the result follows request order.
    async fn get_many(
        &self,
        card_ids: &[CardId],
        tenant_id: TenantId,
    ) -> CardStoreResult<Vec<Card>>;

    /// List cards matching `filter`, newest first.
    async fn list(&self, filter: &CardFilter) -> CardStoreResult<Vec<Card>>;

    /// Mark a card inactive. Returns whether an active card was affected.
    async fn soft_delete(&self, card_id: CardId, tenant_id: TenantId) -> CardStoreResult<bool>;

    /// Create all cards or none. Output order matches input order.
    async fn batch_create(
        &self,
        cards: Vec<CardCreate>,
        tenant_id: TenantId,
    ) -> CardStoreResult<Vec<Card>>;
}

/// Outcome of trying to claim an idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// The caller owns the key and must execute the write.
    Acquired,
    /// A previous call already finished; this is its stored result.
    Completed(serde_json::Value),
    /// Another caller holds an unexpired lease on the key.
    InFlight,
}

/// Durable key to cached-result mapping with expiry.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Stored result for the key. Expired entries and pending leases are `None`.
    async fn get(&self, key: &str, tenant_id: TenantId)
        -> CardStoreResult<Option<serde_json::Value>>;

    /// Upsert a finished result. Last writer wins.
    async fn set(
        &self,
        key: &str,
        tenant_id: TenantId,
        payload: &serde_json::Value,
        ttl: Duration,
    ) -> CardStoreResult<()>;

    /// Remove an entry regardless of state.
    async fn delete(&self, key: &str, tenant_id: TenantId) -> CardStoreResult<bool>;

    /// Remove every expired entry across all tenants.
    async fn purge_expired(&self) -> CardStoreResult<u64>;

    /// Atomically insert a pending lease if no live entry exists.
    ///
    /// Expired entries, finished or pending, are reclaimed by the caller.
    async fn reserve(
        &self,
        key: &str,
        tenant_id: TenantId,
        lease_ttl: Duration,
    ) -> CardStoreResult<Reservation>;

    /// Replace a lease with the finished result.
    async fn complete(
        &self,
        key: &str,
        tenant_id: TenantId,
        payload: &serde_json::Value,
        ttl: Duration,
    ) -> CardStoreResult<()> {
        self.set(key, tenant_id, payload, ttl).await
    }

    /// Drop a lease that never completed. Finished entries are kept.
    async fn release(&self, key: &str, tenant_id: TenantId) -> CardStoreResult<()>;
}

/// Per-workflow card usage tracking.
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Record `event` once per (card, workflow) and always bump the card's
    /// usage counter. A missing or inactive card is `StorageError::NotFound`.
    async fn track_usage(&self, event: &UsageEvent) -> CardStoreResult<UsageOutcome>;
}
