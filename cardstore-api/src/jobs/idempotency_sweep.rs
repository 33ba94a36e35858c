//! Idempotency Sweep Background Task
//!
//! Expired idempotency entries are already invisible to readers; this task
//! deletes them so the table does not grow without bound. Abandoned
//! reservations (a crashed writer's lease) expire the same way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cardstore_storage::{with_timeout, IdempotencyStore};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct IdempotencySweepConfig {
    /// How often to purge (default: 5 minutes)
    pub interval: Duration,
    /// Bound on a single purge call (default: 30 seconds)
    pub purge_timeout: Duration,
}

impl Default for IdempotencySweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            purge_timeout: Duration::from_secs(30),
        }
    }
}

impl IdempotencySweepConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct IdempotencySweepMetrics {
    /// Entries deleted since startup
    pub keys_purged: AtomicU64,
    pub sweep_cycles: AtomicU64,
    pub sweep_errors: AtomicU64,
}

impl IdempotencySweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> IdempotencySweepSnapshot {
        IdempotencySweepSnapshot {
            keys_purged: self.keys_purged.load(Ordering::Relaxed),
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencySweepSnapshot {
    pub keys_purged: u64,
    pub sweep_cycles: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Purge expired idempotency entries every `config.interval` until the
/// shutdown signal flips to `true` or its sender is dropped.
pub async fn idempotency_sweep_task(
    store: Arc<dyn IdempotencyStore>,
    config: IdempotencySweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<IdempotencySweepMetrics> {
    let metrics = Arc::new(IdempotencySweepMetrics::new());

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Idempotency sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Idempotency sweep task shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                sweep_once(store.as_ref(), &config, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        keys_purged = snapshot.keys_purged,
        sweep_cycles = snapshot.sweep_cycles,
        sweep_errors = snapshot.sweep_errors,
        "Idempotency sweep task completed"
    );

    metrics
}

async fn sweep_once(
    store: &dyn IdempotencyStore,
    config: &IdempotencySweepConfig,
    metrics: &IdempotencySweepMetrics,
) {
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);

    match with_timeout("purge_expired", config.purge_timeout, store.purge_expired()).await {
        Ok(0) => tracing::trace!("Idempotency sweep found nothing to purge"),
        Ok(purged) => {
            metrics.keys_purged.fetch_add(purged, Ordering::Relaxed);
            tracing::info!(purged, "Purged expired idempotency entries");
        }
        Err(e) => {
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Idempotency sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardstore_storage::InMemoryIdempotencyStore;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_purges_expired_entries() {
        let store = Arc::new(InMemoryIdempotencyStore::new());
        let tenant = Uuid::new_v4();
        store
            .set("short", tenant, &json!({"cards": []}), Duration::from_secs(10))
            .await
            .unwrap();
        store
            .set("long", tenant, &json!({"cards": []}), Duration::from_secs(3600))
            .await
            .unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(idempotency_sweep_task(
            store.clone(),
            IdempotencySweepConfig::with_interval(Duration::from_secs(60)),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.keys_purged, 1);
        assert!(snapshot.sweep_cycles >= 2);
        assert_eq!(snapshot.sweep_errors, 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_counts_errors_and_keeps_running() {
        let store = Arc::new(InMemoryIdempotencyStore::new());
        store.set_unavailable(true);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(idempotency_sweep_task(
            store.clone(),
            IdempotencySweepConfig::with_interval(Duration::from_secs(1)),
            shutdown_rx,
        ));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        drop(shutdown_tx);
        let snapshot = handle.await.unwrap().snapshot();
        assert!(snapshot.sweep_errors >= 2);
        assert_eq!(snapshot.sweep_errors, snapshot.sweep_cycles);
    }
}
