//! Billing document repository.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::{stamp_created, stamp_updated};
use crate::auth::TenantContext;
use crate::clock::Clock;
use crate::model::Boleto;
use crate::storage::helpers::{entity_key, from_item, item_key, tenant_key, to_item, EntityType};
use crate::storage::{
    CreateCondition, DocumentStore, IndexQuery, ItemKey, Result, UpdateRequest, ENTITY_ATTR,
    TENANT_ATTR,
};
use crate::utils::retry::with_storage_retry;

/// Optional attributes cleared when a document is rewritten without them.
const OPTIONAL_ATTRS: &[&str] = &[
    "adjustmentBaseDate",
    "adjustmentIndexDate",
    "adjustmentRate",
    "scheduleRef",
    "bankResponse",
    "interest",
    "fine",
];

pub struct BoletoRepository {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl BoletoRepository {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn key(ctx: &TenantContext, sequence: u64) -> ItemKey {
        item_key(ctx.tenant.as_str(), EntityType::Boleto, sequence)
    }

    pub async fn get(&self, ctx: &TenantContext, sequence: u64) -> Result<Option<Boleto>> {
        let key = Self::key(ctx, sequence);
        let item = with_storage_retry("boleto.get", || self.store.get(&key)).await?;
        item.map(|item| from_item(&item)).transpose()
    }

    /// Store a new document. Fails with `Conflict` if the sequence is taken.
    pub async fn create(&self, ctx: &TenantContext, boleto: &Boleto) -> Result<()> {
        let key = Self::key(ctx, boleto.sequence);
        let mut item = to_item(boleto, &key)?;
        stamp_created(&mut item, ctx, self.clock.now());
        self.store.create(item, CreateCondition::NotExists).await?;
        debug!(key = %key, value = %boleto.value, "Boleto stored");
        Ok(())
    }

    /// Overwrite an existing document's contents under the same sequence.
    pub async fn rewrite(&self, ctx: &TenantContext, boleto: &Boleto) -> Result<Boleto> {
        let key = Self::key(ctx, boleto.sequence);
        let item = to_item(boleto, &key)?;

        let mut update = UpdateRequest::new();
        for attr in OPTIONAL_ATTRS {
            if !item.contains_key(*attr) {
                update = update.remove(*attr);
            }
        }
        for (name, value) in item {
            if name != TENANT_ATTR && name != ENTITY_ATTR {
                update = update.set(name, value);
            }
        }

        let stored = self
            .store
            .update(&key, stamp_updated(update, ctx, self.clock.now()))
            .await?;
        debug!(key = %key, "Boleto rewritten");
        from_item(&stored)
    }

    /// Every document in the context tenant, in key order.
    pub async fn list(&self, ctx: &TenantContext) -> Result<Vec<Boleto>> {
        let prefix = entity_key(EntityType::Boleto, "");
        let mut continuation = None;
        let mut boletos = Vec::new();
        loop {
            let query = IndexQuery::on_partition(tenant_key(ctx.tenant.as_str())).after(continuation);
            let page = with_storage_retry("boleto.list", || self.store.query(&query)).await?;
            for item in &page.items {
                let is_boleto = item
                    .get(ENTITY_ATTR)
                    .and_then(Value::as_str)
                    .is_some_and(|e| e.starts_with(&prefix));
                if is_boleto {
                    boletos.push(from_item(item)?);
                }
            }
            match page.continuation {
                Some(token) => continuation = Some(token),
                None => return Ok(boletos),
            }
        }
    }
}
