//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cardstore_storage::{
    CardBatchService, CardCache, CardRetrievalService, CardStore, IdempotencyStore,
    InMemoryCardStore, InMemoryIdempotencyStore, UsageStore,
};

use crate::config::ServiceConfig;
use crate::db::DbClient;
use crate::pg::{PgCardStore, PgIdempotencyStore};

/// Storage backends the services run on.
#[derive(Clone)]
pub struct Backends {
    pub cards: Arc<dyn CardStore>,
    pub usage: Arc<dyn UsageStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    /// Present when backed by PostgreSQL; used by the readiness probe.
    pub db: Option<DbClient>,
}

impl Backends {
    pub fn postgres(db: DbClient) -> Self {
        let cards = Arc::new(PgCardStore::new(db.clone()));
        Self {
            cards: cards.clone(),
            usage: cards,
            idempotency: Arc::new(PgIdempotencyStore::new(db.clone())),
            db: Some(db),
        }
    }

    pub fn in_memory(cards: Arc<InMemoryCardStore>, idempotency: Arc<InMemoryIdempotencyStore>) -> Self {
        Self {
            cards: cards.clone(),
            usage: cards,
            idempotency,
            db: None,
        }
    }
}

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub cards: Arc<dyn CardStore>,
    pub usage: Arc<dyn UsageStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub batch: Arc<CardBatchService>,
    pub retrieval: Arc<CardRetrievalService>,
    pub cache: Arc<CardCache>,
    pub db: Option<DbClient>,
    /// Bound on store calls made directly by handlers.
    pub store_timeout: Duration,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(backends: Backends, config: &ServiceConfig) -> Self {
        let cache = Arc::new(CardCache::new(config.cache_config()));
        let batch = Arc::new(CardBatchService::new(
            backends.cards.clone(),
            backends.idempotency.clone(),
            config.batch_config(),
        ));
        let retrieval = Arc::new(CardRetrievalService::new(
            backends.cards.clone(),
            cache.clone(),
            config.retrieval_config(),
        ));
        Self {
            cards: backends.cards,
            usage: backends.usage,
            idempotency: backends.idempotency,
            batch,
            retrieval,
            cache,
            db: backends.db,
            store_timeout: config.store_timeout,
            start_time: Instant::now(),
        }
    }
}

