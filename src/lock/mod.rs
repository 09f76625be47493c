//! Idempotency lock.
//!
//! At-most-once claim on a logical operation within a tenant. The claim is
//! a conditional create of a `LOCK#{uuid}` item whose id is derived
//! deterministically from the operation key, so every retry of the same
//! operation collides with the first attempt. Locks lapse through the TTL
//! attribute, or earlier when the holder releases a claim it never acted on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::TenantContext;
use crate::clock::Clock;
use crate::error::{BillingError, Result};
use crate::storage::helpers::{from_item, item_key, to_item, EntityType};
use crate::storage::{CreateCondition, DocumentStore, ItemKey, StorageError, UpdateRequest};
use crate::utils::retry::with_storage_retry;

/// Epoch-seconds expiry attribute, configured as the table TTL.
pub const LOCK_TTL_ATTR: &str = "expiresAt";

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(3600);

const LOCK_NAMESPACE: Uuid = Uuid::from_bytes([
    0x3d, 0x8e, 0x51, 0x0a, 0x6c, 0x2f, 0x4b, 0x1e, 0x9a, 0x77, 0x0b, 0xd4, 0x52, 0xe1, 0x8c,
    0x03,
]);

/// Deterministic lock id for `(entity_type, lock_key)`.
pub fn lock_entity_id(entity_type: EntityType, lock_key: &str) -> Uuid {
    Uuid::new_v5(
        &LOCK_NAMESPACE,
        format!("{}#{}", entity_type, lock_key).as_bytes(),
    )
}

/// Stored lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub lock_key: String,
    /// Entity the guarded operation produces, e.g. `BOLETO#42`.
    pub target_entity: String,
    #[serde(default)]
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: i64,
}

/// Result of a claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum LockOutcome {
    /// The caller owns the operation.
    Acquired(LockRecord),
    /// A previous attempt holds the claim; its record is returned for
    /// reconciliation.
    AlreadyExists(LockRecord),
}

pub struct IdempotencyLock {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl IdempotencyLock {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl: DEFAULT_LOCK_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Claim `lock_key` within the context's tenant.
    ///
    /// An existing but expired lock counts as absent. Fails with
    /// `IdempotencyConflict` when a conflicting lock exists but cannot be read.
    pub async fn acquire(
        &self,
        ctx: &TenantContext,
        entity_type: EntityType,
        lock_key: &str,
        target_ref: &str,
        metadata: Value,
    ) -> Result<LockOutcome> {
        let key = item_key(
            ctx.tenant.as_str(),
            EntityType::Lock,
            lock_entity_id(entity_type, lock_key),
        );
        let now = self.clock.now();
        let ttl_secs = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        let record = LockRecord {
            lock_key: lock_key.to_string(),
            target_entity: target_ref.to_string(),
            metadata,
            created_at: now,
            expires_at: now.timestamp().saturating_add(ttl_secs),
        };

        let mut item = to_item(&record, &key)?;
        item.insert("createdBy".to_string(), Value::String(ctx.actor.clone()));

        let condition = CreateCondition::NotExistsOrExpired {
            ttl_attr: LOCK_TTL_ATTR.to_string(),
            now_epoch: now.timestamp(),
        };

        match self.store.create(item, condition).await {
            Ok(()) => {
                debug!(lock_key, key = %key, target = target_ref, "Idempotency lock acquired");
                Ok(LockOutcome::Acquired(record))
            }
            Err(StorageError::Conflict { .. }) => {
                debug!(lock_key, key = %key, "Idempotency lock already held");
                self.read_existing(&key, lock_key).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Give up a claim whose operation is known not to have happened.
    ///
    /// The record is kept but marked expired, so the next `acquire` of the
    /// same key succeeds.
    pub async fn release(
        &self,
        ctx: &TenantContext,
        entity_type: EntityType,
        lock_key: &str,
    ) -> Result<()> {
        let key = item_key(
            ctx.tenant.as_str(),
            EntityType::Lock,
            lock_entity_id(entity_type, lock_key),
        );
        let update = UpdateRequest::new()
            .set(LOCK_TTL_ATTR, 0)
            .set("releasedBy", ctx.actor.clone());
        self.store.update(&key, update).await?;
        debug!(lock_key, key = %key, "Idempotency lock released");
        Ok(())
    }

    async fn read_existing(&self, key: &ItemKey, lock_key: &str) -> Result<LockOutcome> {
        let existing = with_storage_retry("lock.get", || self.store.get(key)).await;

        let item = match existing {
            Ok(Some(item)) => item,
            Ok(None) => {
                warn!(lock_key, key = %key, "Conflicting lock vanished before it could be read");
                return Err(BillingError::IdempotencyConflict {
                    lock_key: lock_key.to_string(),
                    metadata: None,
                });
            }
            Err(e) => {
                warn!(lock_key, key = %key, error = %e, "Failed to read conflicting lock");
                return Err(BillingError::IdempotencyConflict {
                    lock_key: lock_key.to_string(),
                    metadata: None,
                });
            }
        };

        match from_item::<LockRecord>(&item) {
            Ok(record) => Ok(LockOutcome::AlreadyExists(record)),
            Err(e) => {
                warn!(lock_key, key = %key, error = %e, "Conflicting lock is malformed");
                Err(BillingError::IdempotencyConflict {
                    lock_key: lock_key.to_string(),
                    metadata: item.get("metadata").cloned(),
                })
            }
        }
    }
}
