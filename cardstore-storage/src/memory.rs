//! In-memory storage backends.
//!
//! Each tenant gets its own partition, so a lookup under the wrong tenant
//! cannot see another tenant's rows at all. All mutation of a partition
//! happens under one write lock, which is what makes the uniqueness check
//! and the insert atomic.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use ::async_trait::async_trait;
use cardstore_core::{
    Card, CardCreate, CardFilter, CardId, CardStoreError, CardStoreResult, CardType, EntityType,
    StorageError, TenantId, UsageEvent, UsageOutcome, ValidationError,
};
use chrono::Utc;
use tokio::time::Instant;

use crate::traits::{CardStore, IdempotencyStore, Reservation, UsageStore};

// ============================================================================
// CARD STORE
// ============================================================================

#[derive(Debug, Default)]
struct TenantPartition {
    cards: HashMap<CardId, Card>,
    /// (type, content hash) of every active card.
    active_hashes: HashMap<(CardType, String), CardId>,
    /// (card, workflow) pairs that already produced a usage event.
    usage_events: HashSet<(CardId, String)>,
}

/// In-memory card store.
///
/// `set_unavailable(true)` makes every call fail with a connection error,
/// which lets callers exercise their degraded paths.
#[derive(Debug, Default)]
pub struct InMemoryCardStore {
    tenants: Arc<RwLock<HashMap<TenantId, TenantPartition>>>,
    unavailable: AtomicBool,
    get_many_calls: AtomicUsize,
    batch_create_calls: AtomicUsize,
}

impl InMemoryCardStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `get_many` calls served so far.
    pub fn get_many_calls(&self) -> usize {
        self.get_many_calls.load(Ordering::SeqCst)
    }

    /// Number of `batch_create` calls served so far.
    pub fn batch_create_calls(&self) -> usize {
        self.batch_create_calls.load(Ordering::SeqCst)
    }

    /// Total cards stored for a tenant, including soft-deleted ones.
    pub fn card_count(&self, tenant_id: TenantId) -> usize {
        self.tenants
            .read()
            .map(|t| t.get(&tenant_id).map_or(0, |p| p.cards.len()))
            .unwrap_or(0)
    }

    /// Number of distinct usage events recorded for a card.
    pub fn usage_event_count(&self, tenant_id: TenantId, card_id: CardId) -> usize {
        self.tenants
            .read()
            .map(|t| {
                t.get(&tenant_id).map_or(0, |p| {
                    p.usage_events.iter().filter(|(id, _)| *id == card_id).count()
                })
            })
            .unwrap_or(0)
    }

    fn check_available(&self) -> CardStoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Connection {
                reason: "in-memory store marked unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Validate and hash a batch without touching any partition.
    fn prepare(
        cards: Vec<CardCreate>,
        tenant_id: TenantId,
    ) -> CardStoreResult<Vec<Card>> {
        let now = Utc::now();
        cards
            .into_iter()
            .map(|create| -> CardStoreResult<Card> {
                if create.tenant_id != tenant_id {
                    return Err(ValidationError::TenantMismatch {
                        expected: tenant_id,
                        got: create.tenant_id,
                    }
                    .into());
                }
                create.validate()?;
                Ok(create.into_card(now))
            })
            .collect()
    }
}

fn conflict(card: &Card) -> CardStoreError {
    StorageError::Conflict {
        tenant_id: card.tenant_id,
        card_type: card.card_type,
        content_hash: card.content_hash.clone(),
    }
    .into()
}

#[async_trait]
impl CardStore for InMemoryCardStore {
    async fn create(&self, card: CardCreate) -> CardStoreResult<Card> {
        let tenant_id = card.tenant_id;
        let mut created = self.batch_create_inner(vec![card], tenant_id)?;
        created.pop().ok_or_else(|| {
            StorageError::TransactionFailed {
                reason: "insert returned no row".to_string(),
            }
            .into()
        })
    }

    async fn get(&self, card_id: CardId, tenant_id: TenantId) -> CardStoreResult<Option<Card>> {
        self.check_available()?;
        let tenants = self.tenants.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(tenants
            .get(&tenant_id)
            .and_then(|p| p.cards.get(&card_id))
            .filter(|c| c.is_active)
            .cloned())
    }

    async fn get_many(
        &self,
        card_ids: &[CardId],
        tenant_id: TenantId,
    ) -> CardStoreResult<Vec<Card>> {
        self.get_many_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let tenants = self.tenants.read().map_err(|_| StorageError::LockPoisoned)?;
        let Some(partition) = tenants.get(&tenant_id) else {
            return Ok(Vec::new());
        };
        let mut seen = HashSet::new();
        Ok(card_ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| partition.cards.get(id))
            .filter(|c| c.is_active)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &CardFilter) -> CardStoreResult<Vec<Card>> {
        filter.validate()?;
        self.check_available()?;
        let tenants = self.tenants.read().map_err(|_| StorageError::LockPoisoned)?;
        let Some(partition) = tenants.get(&filter.tenant_id) else {
            return Ok(Vec::new());
        };
        let mut cards: Vec<Card> = partition
            .cards
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        cards.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.card_id.cmp(&a.card_id))
        });
        Ok(cards
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .collect())
    }

    async fn soft_delete(&self, card_id: CardId, tenant_id: TenantId) -> CardStoreResult<bool> {
        self.check_available()?;
        let mut tenants = self.tenants.write().map_err(|_| StorageError::LockPoisoned)?;
        let Some(partition) = tenants.get_mut(&tenant_id) else {
            return Ok(false);
        };
        let Some(card) = partition.cards.get_mut(&card_id).filter(|c| c.is_active) else {
            return Ok(false);
        };
        let now = Utc::now();
        card.is_active = false;
        card.deleted_at = Some(now);
        card.updated_at = now;
        let key = (card.card_type, card.content_hash.clone());
        partition.active_hashes.remove(&key);
        Ok(true)
    }

    async fn batch_create(
        &self,
        cards: Vec<CardCreate>,
        tenant_id: TenantId,
    ) -> CardStoreResult<Vec<Card>> {
        self.batch_create_calls.fetch_add(1, Ordering::SeqCst);
        self.batch_create_inner(cards, tenant_id)
    }
}

impl InMemoryCardStore {
    fn batch_create_inner(
        &self,
        cards: Vec<CardCreate>,
        tenant_id: TenantId,
    ) -> CardStoreResult<Vec<Card>> {
        self.check_available()?;
        let prepared = Self::prepare(cards, tenant_id)?;

        let mut tenants = self.tenants.write().map_err(|_| StorageError::LockPoisoned)?;
        let partition = tenants.entry(tenant_id).or_default();

        let mut batch_hashes = HashSet::new();
        for card in &prepared {
            let key = (card.card_type, card.content_hash.clone());
            if partition.active_hashes.contains_key(&key) || !batch_hashes.insert(key) {
                return Err(conflict(card));
            }
        }

        for card in &prepared {
            partition
                .active_hashes
                .insert((card.card_type, card.content_hash.clone()), card.card_id);
            partition.cards.insert(card.card_id, card.clone());
        }
        Ok(prepared)
    }
}

#[async_trait]
impl UsageStore for InMemoryCardStore {
    async fn track_usage(&self, event: &UsageEvent) -> CardStoreResult<UsageOutcome> {
        event.validate()?;
        self.check_available()?;
        let mut tenants = self.tenants.write().map_err(|_| StorageError::LockPoisoned)?;
        let not_found = || StorageError::NotFound {
            entity_type: EntityType::Card,
            id: event.card_id.to_string(),
        };
        let partition = tenants.get_mut(&event.tenant_id).ok_or_else(not_found)?;
        let card = partition
            .cards
            .get_mut(&event.card_id)
            .filter(|c| c.is_active)
            .ok_or_else(not_found)?;

        let now = Utc::now();
        card.usage_count += 1;
        card.last_used_at = Some(now);
        card.updated_at = now;
        let usage_count = card.usage_count;

        let event_recorded = partition
            .usage_events
            .insert((event.card_id, event.workflow_id.clone()));

        Ok(UsageOutcome {
            card_id: event.card_id,
            usage_count,
            last_used_at: now,
            event_recorded,
        })
    }
}

// ============================================================================
// IDEMPOTENCY STORE
// ============================================================================

#[derive(Debug, Clone)]
struct IdempotencyEntry {
    /// `None` while the key is leased but the write has not finished.
    payload: Option<serde_json::Value>,
    expires_at: Instant,
}

impl IdempotencyEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory idempotency store keyed by (tenant, key).
#[derive(Debug, Default)]
pub struct InMemoryIdempotencyStore {
    entries: Arc<RwLock<HashMap<(TenantId, String), IdempotencyEntry>>>,
    unavailable: AtomicBool,
}

impl InMemoryIdempotencyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a backend outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of physical entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> CardStoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Connection {
                reason: "in-memory idempotency store marked unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(
        &self,
        key: &str,
        tenant_id: TenantId,
    ) -> CardStoreResult<Option<serde_json::Value>> {
        self.check_available()?;
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        let now = Instant::now();
        Ok(entries
            .get(&(tenant_id, key.to_string()))
            .filter(|e| e.is_live(now))
            .and_then(|e| e.payload.clone()))
    }

    async fn set(
        &self,
        key: &str,
        tenant_id: TenantId,
        payload: &serde_json::Value,
        ttl: Duration,
    ) -> CardStoreResult<()> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(
            (tenant_id, key.to_string()),
            IdempotencyEntry {
                payload: Some(payload.clone()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str, tenant_id: TenantId) -> CardStoreResult<bool> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.remove(&(tenant_id, key.to_string())).is_some())
    }

    async fn purge_expired(&self) -> CardStoreResult<u64> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        Ok((before - entries.len()) as u64)
    }

    async fn reserve(
        &self,
        key: &str,
        tenant_id: TenantId,
        lease_ttl: Duration,
    ) -> CardStoreResult<Reservation> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let now = Instant::now();
        let slot = (tenant_id, key.to_string());
        if let Some(existing) = entries.get(&slot).filter(|e| e.is_live(now)) {
            return Ok(match &existing.payload {
                Some(payload) => Reservation::Completed(payload.clone()),
                None => Reservation::InFlight,
            });
        }
        entries.insert(
            slot,
            IdempotencyEntry {
                payload: None,
                expires_at: now + lease_ttl,
            },
        );
        Ok(Reservation::Acquired)
    }

    async fn release(&self, key: &str, tenant_id: TenantId) -> CardStoreResult<()> {
        self.check_available()?;
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let slot = (tenant_id, key.to_string());
        if entries.get(&slot).is_some_and(|e| e.payload.is_none()) {
            entries.remove(&slot);
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cardstore_core::CardType;
    use serde_json::json;
    use uuid::Uuid;

    fn create(tenant: TenantId, card_type: CardType, content: serde_json::Value) -> CardCreate {
        CardCreate::new(tenant, card_type, content, "test")
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        let card = store
            .create(create(tenant, CardType::Company, json!({"name": "Acme"})))
            .await
            .unwrap();
        let fetched = store.get(card.card_id, tenant).await.unwrap();
        assert_eq!(fetched, Some(card));
    }

    #[tokio::test]
    async fn test_duplicate_content_conflicts_regardless_of_key_order() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        let a: serde_json::Value = serde_json::from_str(r#"{"name":"Acme","tier":1}"#).unwrap();
        let b: serde_json::Value = serde_json::from_str(r#"{"tier":1,"name":"Acme"}"#).unwrap();
        store.create(create(tenant, CardType::Company, a)).await.unwrap();
        let err = store
            .create(create(tenant, CardType::Company, b))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_same_content_allowed_across_types_and_tenants() {
        let store = InMemoryCardStore::new();
        let t1 = Uuid::new_v4();
        let t2 = Uuid::new_v4();
        let content = json!({"name": "Acme"});
        store.create(create(t1, CardType::Company, content.clone())).await.unwrap();
        store.create(create(t1, CardType::Audience, content.clone())).await.unwrap();
        store.create(create(t2, CardType::Company, content)).await.unwrap();
    }

    #[tokio::test]
    async fn test_soft_deleted_content_can_be_recreated() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        let content = json!({"tone": "formal"});
        let card = store
            .create(create(tenant, CardType::Voice, content.clone()))
            .await
            .unwrap();
        assert!(store.soft_delete(card.card_id, tenant).await.unwrap());
        assert!(!store.soft_delete(card.card_id, tenant).await.unwrap());
        assert_eq!(store.get(card.card_id, tenant).await.unwrap(), None);
        store.create(create(tenant, CardType::Voice, content)).await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_tenant_sees_nothing() {
        let store = InMemoryCardStore::new();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let card = store
            .create(create(owner, CardType::Insight, json!({"fact": "x"})))
            .await
            .unwrap();
        assert_eq!(store.get(card.card_id, other).await.unwrap(), None);
        assert!(store.get_many(&[card.card_id], other).await.unwrap().is_empty());
        assert!(!store.soft_delete(card.card_id, other).await.unwrap());
        assert!(store.get(card.card_id, owner).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_batch_create_is_all_or_nothing() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        store
            .create(create(tenant, CardType::Company, json!({"name": "Taken"})))
            .await
            .unwrap();

        let err = store
            .batch_create(
                vec![
                    create(tenant, CardType::Audience, json!({"segment": "smb"})),
                    create(tenant, CardType::Company, json!({"name": "Taken"})),
                ],
                tenant,
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.card_count(tenant), 1);
    }

    #[tokio::test]
    async fn test_batch_create_rejects_duplicates_within_batch() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        let err = store
            .batch_create(
                vec![
                    create(tenant, CardType::Voice, json!({"a": 1})),
                    create(tenant, CardType::Voice, json!({"a": 1.0})),
                ],
                tenant,
            )
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(store.card_count(tenant), 0);
    }

    #[tokio::test]
    async fn test_batch_create_preserves_order() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        let inputs: Vec<CardCreate> = (0..5)
            .map(|i| create(tenant, CardType::Insight, json!({ "n": i })))
            .collect();
        let created = store.batch_create(inputs.clone(), tenant).await.unwrap();
        for (input, card) in inputs.iter().zip(&created) {
            assert_eq!(input.content, card.content);
        }
    }

    #[tokio::test]
    async fn test_batch_create_rejects_tenant_mismatch() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        let err = store
            .batch_create(
                vec![create(Uuid::new_v4(), CardType::Voice, json!({"a": 1}))],
                tenant,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CardStoreError::Validation(ValidationError::TenantMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_filters_and_orders_newest_first() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        for i in 0..4 {
            store
                .create(create(tenant, CardType::Company, json!({ "i": i })))
                .await
                .unwrap();
        }
        let voice = store
            .create(create(tenant, CardType::Voice, json!({"tone": "dry"})))
            .await
            .unwrap();
        store.soft_delete(voice.card_id, tenant).await.unwrap();

        let all = store.list(&CardFilter::new(tenant)).await.unwrap();
        assert_eq!(all.len(), 4);
        for pair in all.windows(2) {
            assert!(
                (pair[0].created_at, pair[0].card_id) >= (pair[1].created_at, pair[1].card_id)
            );
        }

        let deleted = store
            .list(&CardFilter::new(tenant).with_active(false))
            .await
            .unwrap();
        assert_eq!(deleted.len(), 1);

        let page = store
            .list(&CardFilter::new(tenant).with_page(2, 1))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].card_id, all[1].card_id);

        assert!(store
            .list(&CardFilter::new(tenant).with_page(0, 0))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_get_many_skips_missing_and_inactive() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        let a = store
            .create(create(tenant, CardType::Company, json!({"n": "a"})))
            .await
            .unwrap();
        let b = store
            .create(create(tenant, CardType::Company, json!({"n": "b"})))
            .await
            .unwrap();
        store.soft_delete(b.card_id, tenant).await.unwrap();

        let found = store
            .get_many(&[Uuid::new_v4(), a.card_id, b.card_id], tenant)
            .await
            .unwrap();
        assert_eq!(found, vec![a]);
        assert_eq!(store.get_many_calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_retryably() {
        let store = InMemoryCardStore::new();
        store.set_unavailable(true);
        let err = store.get(Uuid::new_v4(), Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_usage_dedup_still_counts() {
        let store = InMemoryCardStore::new();
        let tenant = Uuid::new_v4();
        let card = store
            .create(create(tenant, CardType::Company, json!({"name": "Acme"})))
            .await
            .unwrap();
        let event = UsageEvent {
            card_id: card.card_id,
            tenant_id: tenant,
            workflow_id: "w1".to_string(),
            workflow_type: "newsletter".to_string(),
            session_id: None,
        };

        let first = store.track_usage(&event).await.unwrap();
        let second = store.track_usage(&event).await.unwrap();
        assert!(first.event_recorded);
        assert!(!second.event_recorded);
        assert_eq!(second.usage_count, first.usage_count + 1);
        assert_eq!(store.usage_event_count(tenant, card.card_id), 1);
    }

    #[tokio::test]
    async fn test_usage_on_missing_card_is_not_found() {
        let store = InMemoryCardStore::new();
        let event = UsageEvent {
            card_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            workflow_id: "w1".to_string(),
            workflow_type: "newsletter".to_string(),
            session_id: None,
        };
        let err = store.track_usage(&event).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idempotency_get_set_expiry() {
        let store = InMemoryIdempotencyStore::new();
        let tenant = Uuid::new_v4();
        store
            .set("k1", tenant, &json!({"ok": true}), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(store.get("k1", tenant).await.unwrap(), Some(json!({"ok": true})));
        assert_eq!(store.get("k1", Uuid::new_v4()).await.unwrap(), None);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k1", tenant).await.unwrap(), None);
        assert_eq!(store.len(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_idempotency_set_overwrites_and_delete() {
        let store = InMemoryIdempotencyStore::new();
        let tenant = Uuid::new_v4();
        let ttl = Duration::from_secs(60);
        store.set("k", tenant, &json!(1), ttl).await.unwrap();
        store.set("k", tenant, &json!(2), ttl).await.unwrap();
        assert_eq!(store.get("k", tenant).await.unwrap(), Some(json!(2)));
        assert!(store.delete("k", tenant).await.unwrap());
        assert!(!store.delete("k", tenant).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserve_lifecycle() {
        let store = InMemoryIdempotencyStore::new();
        let tenant = Uuid::new_v4();
        let lease = Duration::from_secs(30);

        assert_eq!(store.reserve("k", tenant, lease).await.unwrap(), Reservation::Acquired);
        assert_eq!(store.reserve("k", tenant, lease).await.unwrap(), Reservation::InFlight);
        assert_eq!(store.get("k", tenant).await.unwrap(), None);

        store
            .complete("k", tenant, &json!({"cards": []}), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.reserve("k", tenant, lease).await.unwrap(),
            Reservation::Completed(json!({"cards": []}))
        );

        store.release("k", tenant).await.unwrap();
        assert!(store.get("k", tenant).await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_is_reclaimable() {
        let store = InMemoryIdempotencyStore::new();
        let tenant = Uuid::new_v4();
        let lease = Duration::from_secs(5);
        assert_eq!(store.reserve("k", tenant, lease).await.unwrap(), Reservation::Acquired);
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.reserve("k", tenant, lease).await.unwrap(), Reservation::Acquired);
    }

    #[tokio::test]
    async fn test_release_drops_pending_lease() {
        let store = InMemoryIdempotencyStore::new();
        let tenant = Uuid::new_v4();
        let lease = Duration::from_secs(30);
        store.reserve("k", tenant, lease).await.unwrap();
        store.release("k", tenant).await.unwrap();
        assert_eq!(store.reserve("k", tenant, lease).await.unwrap(), Reservation::Acquired);
    }
}
