//! Bounding store calls with a caller-supplied timeout.

use std::future::Future;
use std::time::Duration;

use cardstore_core::{CardStoreResult, StorageError};

/// Run `fut`, failing with a retryable `StorageError::Timeout` once `limit` passes.
///
/// Dropping the inner future on timeout rolls back any transaction it held.
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> CardStoreResult<T>
where
    F: Future<Output = CardStoreResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout {
            operation: operation.to_string(),
            elapsed_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
        .into()),
    }
}
