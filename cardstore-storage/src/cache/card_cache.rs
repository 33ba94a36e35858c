//! Process-local LRU cache for cards with per-type TTL.
//!
//! The recency order lives in an [`lru::LruCache`] that is never allowed to
//! evict on its own; capacity is enforced here so that expired entries are
//! swept before a live entry is sacrificed. Every operation, lookups
//! included, reorders or mutates the map, so all of them go through a
//! single mutex.

use std::sync::{Mutex, MutexGuard, PoisonError};

use cardstore_core::{Card, CardId, TenantId};
use lru::LruCache;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::tenant_key::TenantScopedKey;

/// Counters describing cache behavior since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that returned a live card.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    /// Live entries removed to make room.
    pub evictions: u64,
    /// Entries removed because their TTL had passed.
    pub expirations: u64,
    /// Entries currently held.
    pub size: usize,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    card: Card,
    expires_at: Instant,
    /// Observability only. Eviction never looks at it.
    hits: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

struct CacheState {
    entries: LruCache<TenantScopedKey, CacheEntry>,
    /// Lower bound on the earliest expiry among entries; `None` when empty.
    next_expiry: Option<Instant>,
    stats: CacheStats,
}

impl CacheState {
    fn sweep_expired(&mut self, now: Instant) {
        if self.next_expiry.map_or(true, |at| at > now) {
            return;
        }
        let expired: Vec<TenantScopedKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        self.stats.expirations += expired.len() as u64;
        self.next_expiry = self.entries.iter().map(|(_, entry)| entry.expires_at).min();
    }
}

/// LRU + TTL card cache keyed by (tenant, card).
pub struct CardCache {
    config: CacheConfig,
    max_size: usize,
    state: Mutex<CacheState>,
}

impl std::fmt::Debug for CardCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardCache")
            .field("max_size", &self.max_size)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CardCache {
    /// Create a cache. A zero `max_size` is treated as one.
    pub fn new(config: CacheConfig) -> Self {
        let max_size = config.max_size.max(1);
        Self {
            config,
            max_size,
            state: Mutex::new(CacheState {
                entries: LruCache::unbounded(),
                next_expiry: None,
                stats: CacheStats::default(),
            }),
        }
    }

    // Cache state is consistent between operations, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live card, marking it most recently used.
    pub fn lookup(&self, tenant_id: TenantId, card_id: CardId) -> Option<Card> {
        let key = TenantScopedKey::new(tenant_id, card_id);
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        let expired = match state.entries.peek(&key) {
            Some(entry) => entry.is_expired(now),
            None => {
                state.stats.misses += 1;
                return None;
            }
        };
        if expired {
            state.entries.pop(&key);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            return None;
        }

        let entry = state.entries.get_mut(&key)?;
        entry.hits += 1;
        state.stats.hits += 1;
        Some(entry.card.clone())
    }

    /// Insert a card as most recently used.
    ///
    /// Expired entries are swept first; if the cache is still full, exactly
    /// the least recently used entry is evicted.
    pub fn insert(&self, tenant_id: TenantId, card: Card) {
        let key = TenantScopedKey::new(tenant_id, card.card_id);
        let now = Instant::now();
        let expires_at = now + self.config.ttl_for(card.card_type);
        let mut guard = self.lock();
        let state = &mut *guard;

        state.sweep_expired(now);

        if !state.entries.contains(&key) {
            while state.entries.len() >= self.max_size {
                match state.entries.pop_lru() {
                    Some((evicted, _)) => {
                        state.stats.evictions += 1;
                        tracing::trace!(
                            tenant_id = %evicted.tenant_id(),
                            card_id = %evicted.card_id(),
                            "Evicted least recently used card"
                        );
                    }
                    None => break,
                }
            }
        }

        state.entries.put(
            key,
            CacheEntry {
                card,
                expires_at,
                hits: 0,
            },
        );
        state.next_expiry = Some(state.next_expiry.map_or(expires_at, |at| at.min(expires_at)));
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, tenant_id: TenantId, card_id: CardId) -> bool {
        self.lock()
            .entries
            .pop(&TenantScopedKey::new(tenant_id, card_id))
            .is_some()
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut guard = self.lock();
        guard.entries.clear();
        guard.next_expiry = None;
    }

    /// Entries currently held, expired ones not yet swept included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    /// Whether a live entry exists, without touching recency or counters.
    pub fn contains(&self, tenant_id: TenantId, card_id: CardId) -> bool {
        let now = Instant::now();
        self.lock()
            .entries
            .peek(&TenantScopedKey::new(tenant_id, card_id))
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Per-entry hit count, without touching recency.
    pub fn entry_hits(&self, tenant_id: TenantId, card_id: CardId) -> Option<u64> {
        self.lock()
            .entries
            .peek(&TenantScopedKey::new(tenant_id, card_id))
            .map(|entry| entry.hits)
    }

    pub fn stats(&self) -> CacheStats {
        let guard = self.lock();
        CacheStats {
            size: guard.entries.len(),
            ..guard.stats.clone()
        }
    }

    /// hits / (hits + misses); 0.0 before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        self.stats().hit_rate()
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use cardstore_core::{CardCreate, CardType};
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::json;
    use uuid::Uuid;

    #[derive(Debug, Clone)]
    enum Op {
        Insert(usize),
        Lookup(usize),
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![(0usize..8).prop_map(Op::Insert), (0usize..8).prop_map(Op::Lookup)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// With no expiry in play the cache behaves exactly like a reference
        /// LRU list: same membership, same victims, never over capacity.
        #[test]
        fn prop_matches_reference_lru(
            capacity in 1usize..5,
            ops in proptest::collection::vec(arb_op(), 1..60),
        ) {
            let tenant = Uuid::new_v4();
            let cards: Vec<Card> = (0..8)
                .map(|n| CardCreate::new(tenant, CardType::Company, json!({ "n": n }), "t")
                    .into_card(Utc::now()))
                .collect();
            let cache = CardCache::new(CacheConfig::new().with_max_size(capacity));
            // front = most recently used
            let mut model: Vec<usize> = Vec::new();

            for op in ops {
                match op {
                    Op::Insert(i) => {
                        cache.insert(tenant, cards[i].clone());
                        model.retain(|&x| x != i);
                        if model.len() >= capacity {
                            model.pop();
                        }
                        model.insert(0, i);
                    }
                    Op::Lookup(i) => {
                        let found = cache.lookup(tenant, cards[i].card_id);
                        let expected = model.contains(&i);
                        prop_assert_eq!(found.is_some(), expected);
                        if expected {
                            model.retain(|&x| x != i);
                            model.insert(0, i);
                        }
                    }
                }
                prop_assert!(cache.len() <= capacity);
                prop_assert_eq!(cache.len(), model.len());
            }

            for (i, c) in cards.iter().enumerate() {
                prop_assert_eq!(cache.contains(tenant, c.card_id), model.contains(&i));
            }
        }
    }
}
