//! Shared key layout and item conversion helpers.
//!
//! Partition keys are `ORG#{tenant_id}`; sort keys are `{ENTITY_TYPE}#{id}`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{Item, ItemKey, Result, StorageError, ENTITY_ATTR, TENANT_ATTR};

/// Entity type prefixes used in sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Organization,
    User,
    Customer,
    Boleto,
    Schedule,
    Lock,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Organization => "ORG",
            EntityType::User => "USER",
            EntityType::Customer => "CUSTOMER",
            EntityType::Boleto => "BOLETO",
            EntityType::Schedule => "SCHEDULE",
            EntityType::Lock => "LOCK",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partition key for a tenant.
pub fn tenant_key(tenant_id: &str) -> String {
    format!("{}#{}", EntityType::Organization, tenant_id)
}

/// Sort key for an entity.
pub fn entity_key(entity_type: EntityType, id: impl std::fmt::Display) -> String {
    format!("{}#{}", entity_type, id)
}

/// Full key for a tenant-owned entity.
pub fn item_key(tenant_id: &str, entity_type: EntityType, id: impl std::fmt::Display) -> ItemKey {
    ItemKey::new(tenant_key(tenant_id), entity_key(entity_type, id))
}

/// Strip the `{TYPE}#` prefix from a key, returning the id part.
pub fn key_id(key: &str, entity_type: EntityType) -> Option<&str> {
    key.strip_prefix(entity_type.as_str())
        .and_then(|rest| rest.strip_prefix('#'))
        .filter(|id| !id.is_empty())
}

/// Serialize a model into a storable item under the given key.
pub fn to_item<T: Serialize>(value: &T, key: &ItemKey) -> Result<Item> {
    match serde_json::to_value(value)? {
        Value::Object(mut item) => {
            item.insert(TENANT_ATTR.to_string(), Value::String(key.tenant.clone()));
            item.insert(ENTITY_ATTR.to_string(), Value::String(key.entity.clone()));
            Ok(item)
        }
        other => Err(StorageError::InvalidItem {
            entity: key.entity.clone(),
            reason: format!("expected an object, got {}", other),
        }),
    }
}

/// Deserialize a stored item into a model.
///
/// Key attributes and unknown attributes are ignored.
pub fn from_item<T: DeserializeOwned>(item: &Item) -> Result<T> {
    serde_json::from_value(Value::Object(item.clone())).map_err(|e| StorageError::InvalidItem {
        entity: item
            .get(ENTITY_ATTR)
            .and_then(Value::as_str)
            .unwrap_or("<unknown>")
            .to_string(),
        reason: e.to_string(),
    })
}
