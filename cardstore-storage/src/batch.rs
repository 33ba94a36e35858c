//! Card Batch Service: at-most-one creation per idempotency key.
//!
//! The key is claimed with an atomic reservation before any card is
//! written. Exactly one caller wins the reservation and runs the batch
//! insert; concurrent callers with the same key wait for the winner's
//! stored result instead of writing again. A failed write releases the
//! reservation and caches nothing.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cardstore_core::{
    Card, CardCreate, CardInput, CardStoreResult, ConfigError, StorageError, TenantId,
    ValidationError, MAX_BATCH_SIZE, MAX_IDEMPOTENCY_KEY_LEN, MIN_BATCH_SIZE,
};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::deadline::with_timeout;
use crate::traits::{CardStore, IdempotencyStore, Reservation};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// How long a finished batch result is replayable.
pub const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// How long a reservation survives if its owner never completes it.
pub const DEFAULT_LEASE_TTL: Duration = Duration::from_secs(30);

/// Slack kept on top of the write path when sizing a lease.
const LEASE_MARGIN: Duration = Duration::from_secs(1);

/// What to do when the idempotency store itself cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdempotencyFailureMode {
    /// Reject the request. Nothing is written.
    #[default]
    FailClosed,
    /// Run the write without replay protection.
    TreatAsMiss,
}

impl FromStr for IdempotencyFailureMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_closed" => Ok(Self::FailClosed),
            "treat_as_miss" => Ok(Self::TreatAsMiss),
            _ => Err(ConfigError::InvalidValue {
                field: "idempotency_failure_mode".to_string(),
                value: s.to_string(),
                reason: "expected fail_closed or treat_as_miss".to_string(),
            }),
        }
    }
}

/// Configuration for [`CardBatchService`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub idempotency_ttl: Duration,
    pub lease_ttl: Duration,
    /// Delay between checks while another caller holds the key.
    pub poll_interval: Duration,
    /// Give up waiting on another caller after this long.
    pub wait_timeout: Duration,
    /// Bound on each individual store call.
    pub store_timeout: Duration,
    pub failure_mode: IdempotencyFailureMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: DEFAULT_IDEMPOTENCY_TTL,
            lease_ttl: DEFAULT_LEASE_TTL,
            poll_interval: Duration::from_millis(50),
            wait_timeout: Duration::from_secs(10),
            store_timeout: Duration::from_secs(5),
            failure_mode: IdempotencyFailureMode::FailClosed,
        }
    }
}

impl BatchConfig {
    pub fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }

    pub fn with_lease_ttl(mut self, ttl: Duration) -> Self {
        self.lease_ttl = ttl;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_failure_mode(mut self, mode: IdempotencyFailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Lease requested on reserve: never shorter than the `batch_create`
    /// plus `complete` store calls the owner may spend before storing.
    pub fn effective_lease(&self) -> Duration {
        self.lease_ttl.max(self.store_timeout * 2 + LEASE_MARGIN)
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// Caller metadata attached to a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchContext {
    pub trace_id: Option<String>,
    pub created_by: String,
}

impl BatchContext {
    /// Context for a batch arriving over the API; the creator is derived from the trace id.
    pub fn from_trace(trace_id: Option<String>) -> Self {
        let created_by = format!("api_batch_{}", trace_id.as_deref().unwrap_or("unknown"));
        Self {
            trace_id,
            created_by,
        }
    }

    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }
}

/// Replayable result of a batch, stored under the idempotency key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub cards: Vec<Card>,
    pub created_count: usize,
}

impl BatchResult {
    pub fn new(cards: Vec<Card>) -> Self {
        let created_count = cards.len();
        Self {
            cards,
            created_count,
        }
    }
}

/// What `submit_batch` hands back.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub cards: Vec<Card>,
    /// True when the result was replayed from the idempotency store.
    pub from_cache: bool,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Coordinates the card store and idempotency store for batch creation.
#[derive(Clone)]
pub struct CardBatchService {
    cards: Arc<dyn CardStore>,
    idempotency: Arc<dyn IdempotencyStore>,
    config: BatchConfig,
}

impl CardBatchService {
    pub fn new(
        cards: Arc<dyn CardStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        config: BatchConfig,
    ) -> Self {
        Self {
            cards,
            idempotency,
            config,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Create `inputs` for `tenant_id` at most once per `idempotency_key`.
    pub async fn submit_batch(
        &self,
        tenant_id: TenantId,
        idempotency_key: &str,
        inputs: Vec<CardInput>,
        ctx: &BatchContext,
    ) -> CardStoreResult<BatchOutcome> {
        validate_idempotency_key(idempotency_key)?;
        validate_batch_size(inputs.len())?;
        let creates: Vec<CardCreate> = inputs
            .into_iter()
            .map(|input| CardCreate::from_input(input, tenant_id, ctx.created_by.clone()))
            .collect();
        for create in &creates {
            create.validate()?;
        }

        let deadline = Instant::now() + self.config.wait_timeout;
        loop {
            let reservation = match with_timeout(
                "idempotency_reserve",
                self.config.store_timeout,
                self.idempotency
                    .reserve(idempotency_key, tenant_id, self.config.effective_lease()),
            )
            .await
            {
                Ok(reservation) => reservation,
                Err(e) => return self.on_idempotency_failure(e, tenant_id, creates).await,
            };

            match reservation {
                Reservation::Completed(payload) => {
                    let cards = decode_payload(payload)?;
                    tracing::info!(
                        tenant_id = %tenant_id,
                        idempotency_key,
                        trace_id = ?ctx.trace_id,
                        count = cards.len(),
                        "Batch replayed from idempotency store"
                    );
                    return Ok(BatchOutcome {
                        cards,
                        from_cache: true,
                    });
                }
                Reservation::Acquired => {
                    let cards = self
                        .execute(tenant_id, Some(idempotency_key.to_string()), creates)
                        .await?;
                    tracing::info!(
                        tenant_id = %tenant_id,
                        idempotency_key,
                        trace_id = ?ctx.trace_id,
                        count = cards.len(),
                        "Batch created"
                    );
                    return Ok(BatchOutcome {
                        cards,
                        from_cache: false,
                    });
                }
                Reservation::InFlight => {
                    if Instant::now() >= deadline {
                        return Err(StorageError::Timeout {
                            operation: "idempotency_wait".to_string(),
                            elapsed_ms: u64::try_from(self.config.wait_timeout.as_millis())
                                .unwrap_or(u64::MAX),
                        }
                        .into());
                    }
                    tracing::debug!(
                        tenant_id = %tenant_id,
                        idempotency_key,
                        "Idempotency key held by another request, waiting"
                    );
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    async fn on_idempotency_failure(
        &self,
        error: cardstore_core::CardStoreError,
        tenant_id: TenantId,
        creates: Vec<CardCreate>,
    ) -> CardStoreResult<BatchOutcome> {
        match self.config.failure_mode {
            IdempotencyFailureMode::FailClosed => {
                tracing::error!(
                    tenant_id = %tenant_id,
                    error = %error,
                    "Idempotency store unavailable, rejecting batch"
                );
                Err(error)
            }
            IdempotencyFailureMode::TreatAsMiss => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    error = %error,
                    "Idempotency store unavailable, writing without replay protection"
                );
                let cards = self.execute(tenant_id, None, creates).await?;
                Ok(BatchOutcome {
                    cards,
                    from_cache: false,
                })
            }
        }
    }

    /// Run the insert on its own task so an abandoned caller cannot leave the
    /// transaction or the reservation half done.
    async fn execute(
        &self,
        tenant_id: TenantId,
        idempotency_key: Option<String>,
        creates: Vec<CardCreate>,
    ) -> CardStoreResult<Vec<Card>> {
        let cards = Arc::clone(&self.cards);
        let idempotency = Arc::clone(&self.idempotency);
        let config = self.config.clone();

        let task = tokio::spawn(async move {
            let result = with_timeout(
                "batch_create",
                config.store_timeout,
                cards.batch_create(creates, tenant_id),
            )
            .await;

            let Some(key) = idempotency_key else {
                return result;
            };

            match &result {
                Ok(created) => match serde_json::to_value(BatchResult::new(created.clone())) {
                    Ok(payload) => {
                        let stored = with_timeout(
                            "idempotency_complete",
                            config.store_timeout,
                            idempotency.complete(&key, tenant_id, &payload, config.idempotency_ttl),
                        )
                        .await;
                        if let Err(e) = stored {
                            tracing::warn!(
                                tenant_id = %tenant_id,
                                idempotency_key = %key,
                                error = %e,
                                "Batch committed but result could not be stored"
                            );
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Batch result could not be serialized");
                        release(idempotency.as_ref(), &key, tenant_id).await;
                    }
                },
                Err(_) => release(idempotency.as_ref(), &key, tenant_id).await,
            }
            result
        });

        task.await.map_err(|e| StorageError::TransactionFailed {
            reason: format!("batch task aborted: {}", e),
        })?
    }
}

async fn release(idempotency: &dyn IdempotencyStore, key: &str, tenant_id: TenantId) {
    if let Err(e) = idempotency.release(key, tenant_id).await {
        tracing::warn!(
            tenant_id = %tenant_id,
            idempotency_key = key,
            error = %e,
            "Failed to release idempotency reservation; it will lapse with its lease"
        );
    }
}

fn decode_payload(payload: serde_json::Value) -> CardStoreResult<Vec<Card>> {
    serde_json::from_value::<BatchResult>(payload)
        .map(|result| result.cards)
        .map_err(|e| {
            StorageError::Serialization {
                reason: format!("stored batch result is unreadable: {}", e),
            }
            .into()
        })
}

/// Reject empty or oversized idempotency keys.
pub fn validate_idempotency_key(key: &str) -> Result<(), ValidationError> {
    if key.trim().is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: "idempotency_key".to_string(),
        });
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ValidationError::InvalidValue {
            field: "idempotency_key".to_string(),
            reason: format!("must be at most {} characters", MAX_IDEMPOTENCY_KEY_LEN),
        });
    }
    Ok(())
}

/// Reject batches outside 1..=100 cards.
pub fn validate_batch_size(size: usize) -> Result<(), ValidationError> {
    if !(MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&size) {
        return Err(ValidationError::BatchSize {
            size,
            min: MIN_BATCH_SIZE,
            max: MAX_BATCH_SIZE,
        });
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCardStore, InMemoryIdempotencyStore};
    use cardstore_core::{CardStoreError, CardType};
    use serde_json::json;
    use uuid::Uuid;

    struct Harness {
        cards: Arc<InMemoryCardStore>,
        idempotency: Arc<InMemoryIdempotencyStore>,
        service: CardBatchService,
    }

    fn harness(config: BatchConfig) -> Harness {
        let cards = Arc::new(InMemoryCardStore::new());
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let service = CardBatchService::new(cards.clone(), idempotency.clone(), config);
        Harness {
            cards,
            idempotency,
            service,
        }
    }

    fn input(card_type: CardType, content: serde_json::Value) -> CardInput {
        CardInput {
            card_type,
            content,
            source_session_id: None,
        }
    }

    fn two_cards() -> Vec<CardInput> {
        vec![
            input(CardType::Company, json!({"name": "Acme"})),
            input(CardType::Audience, json!({"segment": "founders"})),
        ]
    }

    fn ids(cards: &[Card]) -> Vec<Uuid> {
        cards.iter().map(|c| c.card_id).collect()
    }

    #[tokio::test]
    async fn test_replay_returns_cached_cards() {
        let h = harness(BatchConfig::default());
        let tenant = Uuid::new_v4();
        let ctx = BatchContext::from_trace(Some("trace-1".to_string()));

        let first = h.service.submit_batch(tenant, "k1", two_cards(), &ctx).await.unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.cards.len(), 2);
        assert_eq!(first.cards[0].created_by, "api_batch_trace-1");

        let second = h.service.submit_batch(tenant, "k1", two_cards(), &ctx).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.cards, first.cards);
        assert_eq!(h.cards.batch_create_calls(), 1);
        assert_eq!(h.cards.card_count(tenant), 2);
    }

    #[tokio::test]
    async fn test_key_is_scoped_to_tenant() {
        let h = harness(BatchConfig::default());
        let ctx = BatchContext::from_trace(None);
        let a = h
            .service
            .submit_batch(Uuid::new_v4(), "shared", two_cards(), &ctx)
            .await
            .unwrap();
        let b = h
            .service
            .submit_batch(Uuid::new_v4(), "shared", two_cards(), &ctx)
            .await
            .unwrap();
        assert!(!a.from_cache);
        assert!(!b.from_cache);
        assert_ne!(ids(&a.cards), ids(&b.cards));
        assert_eq!(a.cards[0].created_by, "api_batch_unknown");
    }

    #[tokio::test]
    async fn test_validation_has_no_side_effects() {
        let h = harness(BatchConfig::default());
        let tenant = Uuid::new_v4();
        let ctx = BatchContext::from_trace(None);

        let empty = h.service.submit_batch(tenant, "k", vec![], &ctx).await.unwrap_err();
        assert!(matches!(
            empty,
            CardStoreError::Validation(ValidationError::BatchSize { size: 0, .. })
        ));

        let oversized: Vec<CardInput> = (0..101)
            .map(|i| input(CardType::Insight, json!({ "i": i })))
            .collect();
        let err = h.service.submit_batch(tenant, "k", oversized, &ctx).await.unwrap_err();
        assert!(matches!(
            err,
            CardStoreError::Validation(ValidationError::BatchSize { size: 101, .. })
        ));

        let long_key = "k".repeat(MAX_IDEMPOTENCY_KEY_LEN + 1);
        assert!(h
            .service
            .submit_batch(tenant, &long_key, two_cards(), &ctx)
            .await
            .is_err());
        assert!(h.service.submit_batch(tenant, "", two_cards(), &ctx).await.is_err());

        let not_object = vec![input(CardType::Voice, json!("just a string"))];
        assert!(h.service.submit_batch(tenant, "k", not_object, &ctx).await.is_err());

        assert!(h.idempotency.is_empty());
        assert_eq!(h.cards.batch_create_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_write_is_not_cached() {
        let h = harness(BatchConfig::default());
        let tenant = Uuid::new_v4();
        let ctx = BatchContext::from_trace(None);
        h.service
            .submit_batch(tenant, "first", two_cards(), &ctx)
            .await
            .unwrap();

        let err = h
            .service
            .submit_batch(tenant, "second", two_cards(), &ctx)
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(h.idempotency.get("second", tenant).await.unwrap(), None);

        // The key is free again and the retry really re-executes.
        let retry = h
            .service
            .submit_batch(
                tenant,
                "second",
                vec![input(CardType::Voice, json!({"tone": "plain"}))],
                &ctx,
            )
            .await
            .unwrap();
        assert!(!retry.from_cache);
        assert_eq!(h.cards.batch_create_calls(), 3);
    }

    #[tokio::test]
    async fn test_transient_failure_propagates_and_releases() {
        let h = harness(BatchConfig::default());
        let tenant = Uuid::new_v4();
        let ctx = BatchContext::from_trace(None);
        h.cards.set_unavailable(true);

        let err = h
            .service
            .submit_batch(tenant, "k", two_cards(), &ctx)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(
            h.idempotency
                .reserve("k", tenant, Duration::from_secs(1))
                .await
                .unwrap(),
            Reservation::Acquired
        );
    }

    #[tokio::test]
    async fn test_idempotency_outage_fails_closed_by_default() {
        let h = harness(BatchConfig::default());
        h.idempotency.set_unavailable(true);
        let err = h
            .service
            .submit_batch(Uuid::new_v4(), "k", two_cards(), &BatchContext::from_trace(None))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.cards.batch_create_calls(), 0);
    }

    #[tokio::test]
    async fn test_idempotency_outage_can_be_treated_as_miss() {
        let h = harness(
            BatchConfig::default().with_failure_mode(IdempotencyFailureMode::TreatAsMiss),
        );
        h.idempotency.set_unavailable(true);
        let outcome = h
            .service
            .submit_batch(Uuid::new_v4(), "k", two_cards(), &BatchContext::from_trace(None))
            .await
            .unwrap();
        assert!(!outcome.from_cache);
        assert_eq!(outcome.cards.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiting_on_stuck_reservation_times_out() {
        let h = harness(
            BatchConfig::default()
                .with_wait_timeout(Duration::from_millis(200))
                .with_poll_interval(Duration::from_millis(20)),
        );
        let tenant = Uuid::new_v4();
        h.idempotency
            .reserve("k", tenant, Duration::from_secs(60))
            .await
            .unwrap();

        let err = h
            .service
            .submit_batch(tenant, "k", two_cards(), &BatchContext::from_trace(None))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.cards.batch_create_calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_key_writes_once() {
        let h = harness(BatchConfig::default().with_poll_interval(Duration::from_millis(5)));
        let service = Arc::new(h.service.clone());
        let tenant = Uuid::new_v4();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .submit_batch(tenant, "race", two_cards(), &BatchContext::from_trace(None))
                        .await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(outcomes.iter().filter(|o| !o.from_cache).count(), 1);
        let expected = ids(&outcomes[0].cards);
        assert!(outcomes.iter().all(|o| ids(&o.cards) == expected));
        assert_eq!(h.cards.batch_create_calls(), 1);
        assert_eq!(h.cards.card_count(tenant), 2);
    }

    #[test]
    fn test_failure_mode_parse() {
        assert_eq!(
            "treat_as_miss".parse::<IdempotencyFailureMode>().unwrap(),
            IdempotencyFailureMode::TreatAsMiss
        );
        assert_eq!(
            "FAIL_CLOSED".parse::<IdempotencyFailureMode>().unwrap(),
            IdempotencyFailureMode::FailClosed
        );
        assert!("open".parse::<IdempotencyFailureMode>().is_err());
    }

    /// Card store whose batch insert takes `delay` before committing.
    struct SlowCardStore {
        inner: InMemoryCardStore,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl CardStore for SlowCardStore {
        async fn create(&self, card: CardCreate) -> CardStoreResult<Card> {
            self.inner.create(card).await
        }

        async fn get(
            &self,
            card_id: cardstore_core::CardId,
            tenant_id: TenantId,
        ) -> CardStoreResult<Option<Card>> {
            self.inner.get(card_id, tenant_id).await
        }

        async fn get_many(
            &self,
            card_ids: &[cardstore_core::CardId],
            tenant_id: TenantId,
        ) -> CardStoreResult<Vec<Card>> {
            self.inner.get_many(card_ids, tenant_id).await
        }

        async fn list(&self, filter: &cardstore_core::CardFilter) -> CardStoreResult<Vec<Card>> {
            self.inner.list(filter).await
        }

        async fn soft_delete(
            &self,
            card_id: cardstore_core::CardId,
            tenant_id: TenantId,
        ) -> CardStoreResult<bool> {
            self.inner.soft_delete(card_id, tenant_id).await
        }

        async fn batch_create(
            &self,
            cards: Vec<CardCreate>,
            tenant_id: TenantId,
        ) -> CardStoreResult<Vec<Card>> {
            tokio::time::sleep(self.delay).await;
            self.inner.batch_create(cards, tenant_id).await
        }
    }

    #[test]
    fn test_effective_lease_covers_write_path() {
        let short = BatchConfig::default()
            .with_lease_ttl(Duration::from_secs(30))
            .with_store_timeout(Duration::from_secs(60));
        assert!(short.effective_lease() > Duration::from_secs(120));

        let roomy = BatchConfig::default();
        assert_eq!(roomy.effective_lease(), DEFAULT_LEASE_TTL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_write_keeps_key_reserved() {
        let cards = Arc::new(SlowCardStore {
            inner: InMemoryCardStore::new(),
            delay: Duration::from_secs(40),
        });
        let idempotency = Arc::new(InMemoryIdempotencyStore::new());
        let service = Arc::new(CardBatchService::new(
            cards.clone(),
            idempotency,
            BatchConfig::default()
                .with_lease_ttl(Duration::from_secs(30))
                .with_store_timeout(Duration::from_secs(60))
                .with_wait_timeout(Duration::from_secs(120))
                .with_poll_interval(Duration::from_millis(500)),
        ));
        let tenant = Uuid::new_v4();

        let first = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .submit_batch(tenant, "slow", two_cards(), &BatchContext::from_trace(None))
                    .await
            })
        };

        // Past the configured lease, before the write lands.
        tokio::time::sleep(Duration::from_secs(35)).await;
        let second = service
            .submit_batch(tenant, "slow", two_cards(), &BatchContext::from_trace(None))
            .await
            .unwrap();
        let first = first.await.unwrap().unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(ids(&first.cards), ids(&second.cards));
        assert_eq!(cards.inner.batch_create_calls(), 1);
        assert_eq!(cards.inner.card_count(tenant), 2);
    }
}
