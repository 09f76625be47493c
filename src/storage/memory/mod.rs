//! In-memory DocumentStore implementation.
//!
//! Holds the whole table in a `BTreeMap`, so queries return items in key
//! order. Secondary indexes are emulated by scanning every item for the
//! index key attribute; items without it are not part of the index, just
//! like a sparse index in DynamoDB.
//!
//! Failure injection hooks let tests simulate crashes between writes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use crate::storage::{
    CreateCondition, DocumentStore, IndexQuery, Item, ItemKey, QueryPage, Result, StorageError,
    UpdateRequest, ENTITY_ATTR, TENANT_ATTR,
};

/// Process-local document store.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    items: RwLock<BTreeMap<ItemKey, Item>>,
    page_size: Option<usize>,
    fail_on_create: RwLock<Option<String>>,
    fail_on_update: RwLock<Option<String>>,
    unavailable_gets: RwLock<u32>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit query pages to `page_size` key matches, forcing continuation tokens.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size.max(1)),
            ..Self::default()
        }
    }

    /// Fail creates whose sort key starts with `prefix` (`None` clears).
    pub async fn set_fail_on_create(&self, prefix: Option<&str>) {
        *self.fail_on_create.write().await = prefix.map(str::to_string);
    }

    /// Fail updates whose sort key starts with `prefix` (`None` clears).
    pub async fn set_fail_on_update(&self, prefix: Option<&str>) {
        *self.fail_on_update.write().await = prefix.map(str::to_string);
    }

    /// Make the next `count` reads fail with a transient error.
    pub async fn set_unavailable_gets(&self, count: u32) {
        *self.unavailable_gets.write().await = count;
    }

    /// Insert or replace an item without any condition.
    pub async fn put_raw(&self, item: Item) -> Result<()> {
        let key = ItemKey::of(&item)?;
        self.items.write().await.insert(key, item);
        Ok(())
    }

    /// All items in a tenant partition whose sort key starts with `prefix`.
    pub async fn items_with_prefix(&self, tenant: &str, prefix: &str) -> Vec<Item> {
        self.items
            .read()
            .await
            .iter()
            .filter(|(k, _)| k.tenant == tenant && k.entity.starts_with(prefix))
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    async fn injected(slot: &RwLock<Option<String>>, key: &ItemKey) -> bool {
        slot.read()
            .await
            .as_deref()
            .is_some_and(|prefix| key.entity.starts_with(prefix))
    }
}

fn is_expired(item: &Item, ttl_attr: &str, now_epoch: i64) -> bool {
    item.get(ttl_attr)
        .and_then(Value::as_i64)
        .is_some_and(|expires_at| expires_at < now_epoch)
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>> {
        {
            let mut unavailable = self.unavailable_gets.write().await;
            if *unavailable > 0 {
                *unavailable -= 1;
                return Err(StorageError::Unavailable(format!(
                    "injected read failure for {}",
                    key
                )));
            }
        }
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn create(&self, item: Item, condition: CreateCondition) -> Result<()> {
        let key = ItemKey::of(&item)?;
        if Self::injected(&self.fail_on_create, &key).await {
            return Err(StorageError::Backend(format!(
                "injected create failure for {}",
                key
            )));
        }

        let mut items = self.items.write().await;
        if let Some(existing) = items.get(&key) {
            let replaceable = match &condition {
                CreateCondition::NotExists => false,
                CreateCondition::NotExistsOrExpired {
                    ttl_attr,
                    now_epoch,
                } => is_expired(existing, ttl_attr, *now_epoch),
            };
            if !replaceable {
                return Err(StorageError::Conflict {
                    tenant: key.tenant,
                    entity: key.entity,
                });
            }
            debug!(key = %key, "Replacing expired item");
        }
        items.insert(key, item);
        Ok(())
    }

    async fn update(&self, key: &ItemKey, update: UpdateRequest) -> Result<Item> {
        if Self::injected(&self.fail_on_update, key).await {
            return Err(StorageError::Backend(format!(
                "injected update failure for {}",
                key
            )));
        }

        let mut items = self.items.write().await;
        let item = items.get_mut(key).ok_or_else(|| StorageError::NotFound {
            tenant: key.tenant.clone(),
            entity: key.entity.clone(),
        })?;
        for (name, value) in update.set {
            if name == TENANT_ATTR || name == ENTITY_ATTR {
                continue;
            }
            item.insert(name, value);
        }
        for name in &update.remove {
            item.remove(name);
        }
        Ok(item.clone())
    }

    async fn query(&self, query: &IndexQuery) -> Result<QueryPage> {
        if query.index.is_none() && query.key_attr != TENANT_ATTR {
            return Err(StorageError::Backend(format!(
                "table queries must use the partition key, got '{}'",
                query.key_attr
            )));
        }

        let offset = match &query.continuation {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StorageError::InvalidContinuation(token.clone()))?,
            None => 0,
        };

        let items = self.items.read().await;
        let matched: Vec<&Item> = items
            .values()
            .filter(|item| item.get(&query.key_attr) == Some(&query.key_value))
            .collect();

        let end = match self.page_size {
            Some(size) => (offset + size).min(matched.len()),
            None => matched.len(),
        };
        let page = matched.get(offset..end).unwrap_or_default();

        let results = page
            .iter()
            .filter(|item| {
                query
                    .filters
                    .iter()
                    .all(|(attr, value)| item.get(attr) == Some(value))
            })
            .map(|item| (*item).clone())
            .collect();

        let continuation = (end < matched.len()).then(|| end.to_string());
        Ok(QueryPage {
            items: results,
            continuation,
        })
    }
}
