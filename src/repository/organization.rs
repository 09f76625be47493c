//! Organization repository.

use std::sync::Arc;

use tracing::debug;

use super::{stamp_created, stamp_updated};
use crate::auth::TenantContext;
use crate::clock::Clock;
use crate::model::Organization;
use crate::storage::helpers::{from_item, item_key, to_item, EntityType};
use crate::storage::{CreateCondition, DocumentStore, ItemKey, Result, UpdateRequest};
use crate::utils::retry::with_storage_retry;

pub struct OrganizationRepository {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl OrganizationRepository {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The organization record lives in its own partition under `ORG#{id}`.
    fn key(ctx: &TenantContext) -> ItemKey {
        item_key(ctx.tenant.as_str(), EntityType::Organization, &ctx.tenant)
    }

    /// Load the context tenant's organization.
    pub async fn get(&self, ctx: &TenantContext) -> Result<Option<Organization>> {
        let key = Self::key(ctx);
        let item = with_storage_retry("org.get", || self.store.get(&key)).await?;
        item.map(|item| from_item(&item)).transpose()
    }

    pub async fn create(&self, ctx: &TenantContext, org: &Organization) -> Result<()> {
        let mut item = to_item(org, &Self::key(ctx))?;
        stamp_created(&mut item, ctx, self.clock.now());
        self.store.create(item, CreateCondition::NotExists).await
    }

    /// Persist the running sequence counter.
    pub async fn set_next_sequence(&self, ctx: &TenantContext, next_sequence: u64) -> Result<()> {
        let key = Self::key(ctx);
        let update = stamp_updated(
            UpdateRequest::new().set("nextSequence", next_sequence),
            ctx,
            self.clock.now(),
        );
        self.store.update(&key, update).await?;
        debug!(tenant = %ctx.tenant, next_sequence, "Sequence counter persisted");
        Ok(())
    }
}
