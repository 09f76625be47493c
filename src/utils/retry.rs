//! Retry utilities: backoff builders for transient storage failures.
//!
//! Uses `backon` for exponential backoff with jitter. Only errors the
//! storage layer classifies as retryable are retried.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::storage::{Result, StorageError};

/// Standard backoff for store reads and writes.
///
/// - Min delay: 20ms
/// - Max delay: 1s
/// - Max attempts: 4
/// - Jitter enabled
pub fn storage_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_secs(1))
        .with_max_times(4)
        .with_jitter()
}

/// Run a storage operation, retrying while it reports a transient failure.
pub async fn with_storage_retry<T, F, Fut>(operation: &str, f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    f.retry(storage_backoff())
        .when(StorageError::is_retryable)
        .notify(|err: &StorageError, dur: Duration| {
            warn!(operation, error = %err, delay = ?dur, "Storage unavailable, retrying");
        })
        .await
}
