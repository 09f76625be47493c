//! DocumentStore trait definition.

use async_trait::async_trait;
use serde_json::Value;

use super::{Result, StorageError, ENTITY_ATTR, TENANT_ATTR};

/// A stored item: a flat-or-nested JSON object including its key attributes.
pub type Item = serde_json::Map<String, Value>;

/// Primary key of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemKey {
    pub tenant: String,
    pub entity: String,
}

impl ItemKey {
    pub fn new(tenant: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            entity: entity.into(),
        }
    }

    /// Read the key attributes from an item.
    pub fn of(item: &Item) -> Result<Self> {
        let tenant = item
            .get(TENANT_ATTR)
            .and_then(Value::as_str)
            .ok_or(StorageError::MissingKey(TENANT_ATTR))?;
        let entity = item
            .get(ENTITY_ATTR)
            .and_then(Value::as_str)
            .ok_or(StorageError::MissingKey(ENTITY_ATTR))?;
        Ok(Self::new(tenant, entity))
    }
}

impl std::fmt::Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.tenant, self.entity)
    }
}

/// Precondition for a conditional create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateCondition {
    /// No item may exist under the key.
    NotExists,
    /// No item may exist, unless the existing one carries an epoch-seconds
    /// expiry attribute that is already in the past. TTL deletion in the
    /// backing store is lazy, so expired items can still be physically present.
    NotExistsOrExpired { ttl_attr: String, now_epoch: i64 },
}

/// Partial update of an existing item.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    /// Attributes to set (top-level).
    pub set: Item,
    /// Attributes to remove.
    pub remove: Vec<String>,
}

impl UpdateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(name.into(), value.into());
        self
    }

    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.remove.push(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }
}

/// Equality query against the table or a secondary index.
///
/// Without an index name the key attribute must be the partition key.
#[derive(Debug, Clone)]
pub struct IndexQuery {
    pub index: Option<String>,
    pub key_attr: String,
    pub key_value: Value,
    /// Post-key filters, all must match (attribute equality).
    pub filters: Vec<(String, Value)>,
    /// Continuation token from a previous page.
    pub continuation: Option<String>,
}

impl IndexQuery {
    pub fn on_index(
        index: impl Into<String>,
        key_attr: impl Into<String>,
        key_value: impl Into<Value>,
    ) -> Self {
        Self {
            index: Some(index.into()),
            key_attr: key_attr.into(),
            key_value: key_value.into(),
            filters: Vec::new(),
            continuation: None,
        }
    }

    /// Every item in one partition of the base table.
    pub fn on_partition(tenant_key: impl Into<String>) -> Self {
        Self {
            index: None,
            key_attr: TENANT_ATTR.to_string(),
            key_value: Value::String(tenant_key.into()),
            filters: Vec::new(),
            continuation: None,
        }
    }

    pub fn filter(mut self, attr: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((attr.into(), value.into()));
        self
    }

    pub fn after(mut self, continuation: Option<String>) -> Self {
        self.continuation = continuation;
        self
    }
}

/// One page of query results.
#[derive(Debug, Clone, Default)]
pub struct QueryPage {
    pub items: Vec<Item>,
    /// Present when more results exist.
    pub continuation: Option<String>,
}

/// Interface for keyed document persistence.
///
/// Implementations:
/// - `InMemoryDocumentStore`: process-local table
/// - `DynamoDocumentStore`: Amazon DynamoDB
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one item by primary key.
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>>;

    /// Create an item if the condition holds.
    ///
    /// Returns `StorageError::Conflict` when it doesn't.
    async fn create(&self, item: Item, condition: CreateCondition) -> Result<()>;

    /// Apply a partial update to an existing item and return the new item.
    ///
    /// Returns `StorageError::NotFound` if the item doesn't exist.
    async fn update(&self, key: &ItemKey, update: UpdateRequest) -> Result<Item>;

    /// Run one page of an equality query.
    async fn query(&self, query: &IndexQuery) -> Result<QueryPage>;
}
