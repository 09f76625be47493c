//! Keyed document store.
//!
//! All tenant data lives in one logical table. Every item carries a
//! partition key (`tenant`, e.g. `ORG#<id>`) and a sort key (`entity`,
//! e.g. `SCHEDULE#<id>`). Secondary indexes project a subset of items under
//! a different key; the due-schedule index is keyed by execution date.
//!
//! ## Backends
//!
//! - `InMemoryDocumentStore` - process-local table, used for development and tests
//! - `DynamoDocumentStore` (feature: dynamo) - Amazon DynamoDB

mod document_store;
pub mod helpers;
pub mod memory;

#[cfg(feature = "dynamo")]
pub mod dynamo;

pub use document_store::{
    CreateCondition, DocumentStore, IndexQuery, Item, ItemKey, QueryPage, UpdateRequest,
};
pub use memory::InMemoryDocumentStore;

#[cfg(feature = "dynamo")]
pub use dynamo::DynamoDocumentStore;

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

/// Attribute holding the partition key of every item.
pub const TENANT_ATTR: &str = "tenant";
/// Attribute holding the sort key of every item.
pub const ENTITY_ATTR: &str = "entity";

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Item not found: tenant={tenant}, entity={entity}")]
    NotFound { tenant: String, entity: String },

    #[error("Conditional write failed: tenant={tenant}, entity={entity}")]
    Conflict { tenant: String, entity: String },

    #[error("Item is missing key attribute '{0}'")]
    MissingKey(&'static str),

    #[error("Invalid item {entity}: {reason}")]
    InvalidItem { entity: String, reason: String },

    #[error("Invalid continuation token: {0}")]
    InvalidContinuation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Transient failures worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

/// Storage type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Process-local table.
    #[default]
    Memory,
    /// Amazon DynamoDB (requires `dynamo` feature).
    #[cfg(feature = "dynamo")]
    Dynamo,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type discriminator.
    #[serde(rename = "type")]
    pub storage_type: StorageType,
    /// Name of the secondary index keyed by next execution date.
    pub schedule_index: ScheduleIndexConfig,
    /// DynamoDB-specific configuration.
    #[cfg(feature = "dynamo")]
    pub dynamo: DynamoConfig,
}

/// Due-schedule index configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleIndexConfig {
    /// Index name.
    pub name: String,
    /// Maximum pages followed per query before giving up with a warning.
    pub max_pages: usize,
}

impl Default for ScheduleIndexConfig {
    fn default() -> Self {
        Self {
            name: "schedule_index".to_string(),
            max_pages: 50,
        }
    }
}

/// DynamoDB-specific configuration.
#[cfg(feature = "dynamo")]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DynamoConfig {
    /// Table name.
    pub table: String,
    /// Custom endpoint (DynamoDB Local, LocalStack).
    pub endpoint: Option<String>,
}

#[cfg(feature = "dynamo")]
impl Default for DynamoConfig {
    fn default() -> Self {
        Self {
            table: "billing".to_string(),
            endpoint: None,
        }
    }
}

/// Initialize the document store based on configuration.
pub async fn init_storage(
    config: &StorageConfig,
) -> std::result::Result<Arc<dyn DocumentStore>, Box<dyn std::error::Error>> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: memory");
            Ok(Arc::new(InMemoryDocumentStore::new()))
        }
        #[cfg(feature = "dynamo")]
        StorageType::Dynamo => {
            info!(
                table = %config.dynamo.table,
                endpoint = ?config.dynamo.endpoint,
                "Storage: dynamo"
            );
            let store =
                DynamoDocumentStore::new(&config.dynamo.table, config.dynamo.endpoint.as_deref())
                    .await?;
            Ok(Arc::new(store))
        }
    }
}
