//! Property-Based Tests for Idempotent Batch Replay
//!
//! For any valid batch and idempotency key, submitting the batch again
//! under the same (key, tenant) SHALL:
//! - replay the stored result instead of writing
//! - return the same card ids and content in the same order
//! - leave the number of stored cards unchanged

use std::collections::HashSet;
use std::sync::Arc;

use cardstore_core::{compute_content_hash, CardInput, MAX_BATCH_SIZE};
use cardstore_storage::{BatchConfig, BatchContext, CardBatchService};
use cardstore_test_utils::generators::{arb_card_input, arb_tenant_id};
use cardstore_test_utils::{InMemoryCardStore, InMemoryIdempotencyStore};
use proptest::prelude::*;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// PROPERTY TEST STRATEGIES
// ============================================================================

/// Batches with no duplicate (card_type, content) pairs, which the store
/// would reject as a conflict.
fn batch_strategy() -> impl Strategy<Value = Vec<CardInput>> {
    prop::collection::vec(arb_card_input(), 1..=12).prop_map(|inputs| {
        let mut seen = HashSet::new();
        inputs
            .into_iter()
            .filter(|input| seen.insert((input.card_type, compute_content_hash(&input.content))))
            .take(MAX_BATCH_SIZE)
            .collect()
    })
}

fn idempotency_key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z0-9-]{1,32}",
        "[A-Za-z0-9_:.]{1,256}",
        Just("k".to_string()),
    ]
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_replay_returns_same_cards_without_writing(
        tenant_id in arb_tenant_id(),
        key in idempotency_key_strategy(),
        batch in batch_strategy(),
        replays in 1usize..4,
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let cards = Arc::new(InMemoryCardStore::new());
            let idempotency = Arc::new(InMemoryIdempotencyStore::new());
            let service =
                CardBatchService::new(cards.clone(), idempotency, BatchConfig::default());
            let ctx = BatchContext::from_trace(None);

            let first = service
                .submit_batch(tenant_id, &key, batch.clone(), &ctx)
                .await
                .map_err(|e| TestCaseError::fail(format!("first submit failed: {}", e)))?;
            prop_assert!(!first.from_cache);
            prop_assert_eq!(first.cards.len(), batch.len());
            let stored = cards.card_count(tenant_id);
            prop_assert_eq!(stored, batch.len());

            for _ in 0..replays {
                let again = service
                    .submit_batch(tenant_id, &key, batch.clone(), &ctx)
                    .await
                    .map_err(|e| TestCaseError::fail(format!("replay failed: {}", e)))?;
                prop_assert!(again.from_cache);
                prop_assert_eq!(&again.cards, &first.cards);
            }

            prop_assert_eq!(cards.card_count(tenant_id), stored);
            prop_assert_eq!(cards.batch_create_calls(), 1);
            Ok::<(), TestCaseError>(())
        })?;
    }
}
