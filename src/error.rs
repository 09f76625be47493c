//! Billing error taxonomy.
//!
//! Per-schedule errors are caught by the executor's inner loop, per-tenant
//! setup errors by its tenant loop. Only `BatchPartiallyFailed` leaves
//! `Executor::run_daily_batch`.

use std::time::Duration;

use uuid::Uuid;

use crate::index::IndexError;
use crate::storage::StorageError;

/// Result type for billing operations.
pub type Result<T> = std::result::Result<T, BillingError>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Schedule failed due-validation. Carries every violated condition.
    #[error("{} issue(s) found with schedule {schedule_id}: {}", .issues.len(), .issues.join("; "))]
    InvalidScheduleState {
        schedule_id: Uuid,
        issues: Vec<String>,
    },

    /// A claim on the operation exists but could not be inspected.
    #[error("Idempotency lock {lock_key} is held but its record could not be read")]
    IdempotencyConflict {
        lock_key: String,
        metadata: Option<serde_json::Value>,
    },

    /// Irrecoverable inconsistency.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Schedule {schedule_id} timed out after {after:?}")]
    Timeout { schedule_id: Uuid, after: Duration },

    /// Aggregate batch failure. Details live in the logged summary.
    #[error("Scheduled billing batch finished with {failed} failure(s)")]
    BatchPartiallyFailed { failed: usize },

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl BillingError {
    /// Whether running the same operation again could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::Timeout { .. } => true,
            BillingError::Storage(e) => e.is_retryable(),
            BillingError::Index(e) => e.is_retryable(),
            _ => false,
        }
    }
}
