//! Card Store Test Utilities
//!
//! Shared test infrastructure for the workspace:
//! - Proptest generators for card inputs and tenants
//! - Fixtures for common cards
//! - Assertions over the error taxonomy

// Re-export the in-memory backends from their source crate
pub use cardstore_storage::{InMemoryCardStore, InMemoryIdempotencyStore};

pub use cardstore_core::{
    compute_content_hash, Card, CardCreate, CardInput, CardStoreError, CardStoreResult, CardType,
    EntityType, StorageError, TenantId, Timestamp, ValidationError,
};

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for card store inputs.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random tenant id.
    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_card_type() -> impl Strategy<Value = CardType> {
        prop_oneof![
            Just(CardType::Company),
            Just(CardType::Audience),
            Just(CardType::Voice),
            Just(CardType::Insight),
        ]
    }

    /// Generate a scalar JSON value.
    pub fn arb_json_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 _-]{0,24}".prop_map(Value::String),
        ]
    }

    /// Generate a JSON object up to three levels deep.
    pub fn arb_json_object() -> impl Strategy<Value = Value> {
        let leaf = arb_json_scalar();
        let nested = leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        });
        prop::collection::btree_map("[a-z_]{1,8}", nested, 0..6)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    /// Generate a valid card input.
    pub fn arb_card_input() -> impl Strategy<Value = CardInput> {
        (arb_card_type(), arb_json_object(), any::<bool>()).prop_map(
            |(card_type, content, with_session)| CardInput {
                card_type,
                content,
                source_session_id: with_session.then(Uuid::now_v7),
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built cards for common scenarios.

    use super::*;

    /// Company content used across scenarios.
    pub fn company_content() -> Value {
        json!({
            "name": "Acme Analytics",
            "industry": "B2B SaaS",
            "size": "50-200",
            "values": ["clarity", "speed"],
        })
    }

    pub fn audience_content() -> Value {
        json!({
            "segment": "RevOps leads",
            "pain_points": ["stale dashboards", "manual exports"],
        })
    }

    /// An input with the given type and content.
    pub fn card_input(card_type: CardType, content: Value) -> CardInput {
        CardInput {
            card_type,
            content,
            source_session_id: None,
        }
    }

    /// A create request from a test caller.
    pub fn card_create(tenant_id: TenantId, card_type: CardType, content: Value) -> CardCreate {
        CardCreate::new(tenant_id, card_type, content, "test")
    }

    /// A materialized, active card that was never persisted.
    pub fn make_card(tenant_id: TenantId, card_type: CardType, content: Value) -> Card {
        card_create(tenant_id, card_type, content).into_card(Utc::now())
    }

    /// One company and one audience input.
    pub fn company_and_audience() -> Vec<CardInput> {
        vec![
            card_input(CardType::Company, company_content()),
            card_input(CardType::Audience, audience_content()),
        ]
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over card store results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &CardStoreResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert a uniqueness conflict.
    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &CardStoreResult<T>) {
        match result {
            Err(CardStoreError::Storage(StorageError::Conflict { .. })) => {}
            other => panic!("Expected Conflict error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation<T: std::fmt::Debug>(result: &CardStoreResult<T>) {
        match result {
            Err(CardStoreError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &CardStoreResult<T>, entity_type: EntityType) {
        match result {
            Err(CardStoreError::Storage(StorageError::NotFound { entity_type: et, .. })) => {
                assert_eq!(*et, entity_type, "Wrong entity type in NotFound error");
            }
            other => panic!("Expected NotFound error for {:?}, got: {:?}", entity_type, other),
        }
    }

    /// Assert an error the caller may retry.
    #[track_caller]
    pub fn assert_retryable<T: std::fmt::Debug>(result: &CardStoreResult<T>) {
        match result {
            Err(e) if e.is_retryable() => {}
            other => panic!("Expected retryable error, got: {:?}", other),
        }
    }

    /// Assert a card's hash matches its content.
    #[track_caller]
    pub fn assert_hash_consistent(card: &Card) {
        assert_eq!(
            card.content_hash,
            compute_content_hash(&card.content),
            "content_hash does not match content for card {}",
            card.card_id
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
