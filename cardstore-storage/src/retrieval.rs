//! Card Retrieval Service: cache-first reads with a single batched fetch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use cardstore_core::{Card, CardId, CardType, TenantId};
use serde::Serialize;
use tokio::time::Instant;

use crate::cache::CardCache;
use crate::deadline::with_timeout;
use crate::traits::CardStore;

/// Configuration for [`CardRetrievalService`].
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Bound on the batched fetch when the caller gives none.
    pub fetch_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

impl RetrievalConfig {
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Per-call retrieval options.
#[derive(Debug, Clone, Default)]
pub struct RetrievalContext {
    pub trace_id: Option<String>,
    pub workflow_id: Option<String>,
    pub timeout: Option<Duration>,
}

/// Cards grouped by type. All four groups are always present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CardBuckets {
    pub company: Vec<Card>,
    pub audience: Vec<Card>,
    pub voice: Vec<Card>,
    pub insight: Vec<Card>,
}

impl CardBuckets {
    fn push(&mut self, card: Card) {
        match card.card_type {
            CardType::Company => self.company.push(card),
            CardType::Audience => self.audience.push(card),
            CardType::Voice => self.voice.push(card),
            CardType::Insight => self.insight.push(card),
        }
    }

    pub fn get(&self, card_type: CardType) -> &[Card] {
        match card_type {
            CardType::Company => &self.company,
            CardType::Audience => &self.audience,
            CardType::Voice => &self.voice,
            CardType::Insight => &self.insight,
        }
    }

    pub fn total(&self) -> usize {
        self.company.len() + self.audience.len() + self.voice.len() + self.insight.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalMetrics {
    /// Unique ids requested.
    pub requested: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    /// Cards returned by the store for the misses.
    pub fetched: usize,
    pub duration_ms: u64,
    pub hit_rate: f64,
}

/// Result of one retrieval.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ContextBundle {
    pub buckets: CardBuckets,
    /// Found cards in request order.
    pub cards: Vec<Card>,
    /// Fewer cards were found than unique ids requested.
    pub partial: bool,
    /// The store fetch failed; only cached cards were returned.
    pub degraded: bool,
    pub metrics: RetrievalMetrics,
}

/// Assembles context bundles from the cache and the card store.
#[derive(Clone)]
pub struct CardRetrievalService {
    store: Arc<dyn CardStore>,
    cache: Arc<CardCache>,
    config: RetrievalConfig,
}

impl CardRetrievalService {
    pub fn new(store: Arc<dyn CardStore>, cache: Arc<CardCache>, config: RetrievalConfig) -> Self {
        Self {
            store,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &Arc<CardCache> {
        &self.cache
    }

    /// Retrieve cards for a tenant. Store failures degrade the bundle rather
    /// than failing the call.
    pub async fn retrieve(
        &self,
        tenant_id: TenantId,
        card_ids: &[CardId],
        ctx: &RetrievalContext,
    ) -> ContextBundle {
        let started = Instant::now();

        let mut seen = HashSet::with_capacity(card_ids.len());
        let unique: Vec<CardId> = card_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if unique.is_empty() {
            return ContextBundle::default();
        }

        let mut found: HashMap<CardId, Card> = HashMap::with_capacity(unique.len());
        let mut misses = Vec::new();
        for id in &unique {
            match self.cache.lookup(tenant_id, *id) {
                Some(card) => {
                    found.insert(*id, card);
                }
                None => misses.push(*id),
            }
        }
        let cache_hits = found.len();

        let mut fetched = 0;
        let mut degraded = false;
        if !misses.is_empty() {
            let timeout = ctx.timeout.unwrap_or(self.config.fetch_timeout);
            match with_timeout("get_many", timeout, self.store.get_many(&misses, tenant_id)).await
            {
                Ok(cards) => {
                    for card in cards {
                        if card.tenant_id != tenant_id || !card.is_active {
                            continue;
                        }
                        fetched += 1;
                        self.cache.insert(tenant_id, card.clone());
                        found.insert(card.card_id, card);
                    }
                }
                Err(e) => {
                    degraded = true;
                    tracing::warn!(
                        tenant_id = %tenant_id,
                        trace_id = ?ctx.trace_id,
                        misses = misses.len(),
                        error = %e,
                        "Card fetch failed, returning cached cards only"
                    );
                }
            }
        }

        let mut buckets = CardBuckets::default();
        let mut cards = Vec::with_capacity(found.len());
        for id in &unique {
            if let Some(card) = found.remove(id) {
                buckets.push(card.clone());
                cards.push(card);
            }
        }

        let requested = unique.len();
        let metrics = RetrievalMetrics {
            requested,
            cache_hits,
            cache_misses: requested - cache_hits,
            fetched,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            hit_rate: cache_hits as f64 / requested as f64,
        };

        tracing::info!(
            tenant_id = %tenant_id,
            trace_id = ?ctx.trace_id,
            workflow_id = ?ctx.workflow_id,
            requested = metrics.requested,
            cache_hits = metrics.cache_hits,
            cache_misses = metrics.cache_misses,
            fetched = metrics.fetched,
            duration_ms = metrics.duration_ms,
            hit_rate = metrics.hit_rate,
            degraded,
            "Context retrieved"
        );

        ContextBundle {
            partial: cards.len() < requested,
            buckets,
            cards,
            degraded,
            metrics,
        }
    }

    /// Drop a card from the local cache, e.g. after a soft delete.
    pub fn invalidate(&self, tenant_id: TenantId, card_id: CardId) -> bool {
        self.cache.invalidate(tenant_id, card_id)
    }
}
