//! DynamoDB DocumentStore implementation.
//!
//! Table schema:
//! - PK: `tenant` (String), e.g. `ORG#{tenant_id}`
//! - SK: `entity` (String), e.g. `SCHEDULE#{id}`
//! - GSI `schedule_index`: PK `nextExecution` (String, ISO date), sparse
//! - TTL attribute: `expiresAt` (Number, epoch seconds) on lock items

mod convert;

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use serde_json::Value;
use tracing::{debug, info};

use crate::storage::{
    CreateCondition, DocumentStore, IndexQuery, Item, ItemKey, QueryPage, Result, StorageError,
    UpdateRequest, ENTITY_ATTR, TENANT_ATTR,
};

use convert::{from_attributes, to_attribute, to_attributes};

const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";
const THROTTLING_CODES: &[&str] = &[
    "ProvisionedThroughputExceededException",
    "ThrottlingException",
    "RequestLimitExceeded",
];

/// DynamoDB implementation of DocumentStore.
pub struct DynamoDocumentStore {
    client: Client,
    table_name: String,
}

impl DynamoDocumentStore {
    /// Create a new DynamoDB document store.
    pub async fn new(table_name: impl Into<String>, endpoint_url: Option<&str>) -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;

        let client = if let Some(endpoint) = endpoint_url {
            let dynamo_config = aws_sdk_dynamodb::config::Builder::from(&config)
                .endpoint_url(endpoint)
                .build();
            Client::from_conf(dynamo_config)
        } else {
            Client::new(&config)
        };

        let table_name = table_name.into();
        info!(table = %table_name, "Connected to DynamoDB");

        Ok(Self { client, table_name })
    }

    /// Create with explicit client (for testing).
    pub fn with_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    fn key_attributes(key: &ItemKey) -> HashMap<String, AttributeValue> {
        HashMap::from([
            (TENANT_ATTR.to_string(), AttributeValue::S(key.tenant.clone())),
            (ENTITY_ATTR.to_string(), AttributeValue::S(key.entity.clone())),
        ])
    }

    fn encode_continuation(last_key: &HashMap<String, AttributeValue>) -> Result<String> {
        Ok(serde_json::to_string(&Value::Object(from_attributes(last_key)))?)
    }

    fn decode_continuation(token: &str) -> Result<HashMap<String, AttributeValue>> {
        match serde_json::from_str::<Value>(token) {
            Ok(Value::Object(map)) => Ok(to_attributes(&map)),
            _ => Err(StorageError::InvalidContinuation(token.to_string())),
        }
    }
}

/// Map an SDK error onto the storage taxonomy.
fn classify<E, R>(operation: &str, key: Option<&ItemKey>, err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    if matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_)
    ) {
        return StorageError::Unavailable(format!("DynamoDB {} timed out", operation));
    }
    match (err.code(), key) {
        (Some(CONDITIONAL_CHECK_FAILED), Some(key)) if operation == "put_item" => {
            StorageError::Conflict {
                tenant: key.tenant.clone(),
                entity: key.entity.clone(),
            }
        }
        (Some(CONDITIONAL_CHECK_FAILED), Some(key)) => StorageError::NotFound {
            tenant: key.tenant.clone(),
            entity: key.entity.clone(),
        },
        (Some(code), _) if THROTTLING_CODES.contains(&code) => {
            StorageError::Unavailable(format!("DynamoDB {} throttled: {}", operation, code))
        }
        _ => StorageError::Backend(format!(
            "DynamoDB {} failed: {}",
            operation,
            DisplayErrorContext(&err)
        )),
    }
}

#[async_trait]
impl DocumentStore for DynamoDocumentStore {
    async fn get(&self, key: &ItemKey) -> Result<Option<Item>> {
        let result = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_attributes(key)))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| classify("get_item", Some(key), e))?;

        Ok(result.item.as_ref().map(from_attributes))
    }

    async fn create(&self, item: Item, condition: CreateCondition) -> Result<()> {
        let key = ItemKey::of(&item)?;

        let request = self
            .client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(to_attributes(&item)))
            .expression_attribute_names("#entity", ENTITY_ATTR);

        let request = match &condition {
            CreateCondition::NotExists => {
                request.condition_expression("attribute_not_exists(#entity)")
            }
            CreateCondition::NotExistsOrExpired {
                ttl_attr,
                now_epoch,
            } => request
                .condition_expression("attribute_not_exists(#entity) OR #ttl < :now")
                .expression_attribute_names("#ttl", ttl_attr)
                .expression_attribute_values(":now", AttributeValue::N(now_epoch.to_string())),
        };

        request
            .send()
            .await
            .map_err(|e| classify("put_item", Some(&key), e))?;

        debug!(key = %key, "Created item in DynamoDB");
        Ok(())
    }

    async fn update(&self, key: &ItemKey, update: UpdateRequest) -> Result<Item> {
        let mut names = HashMap::from([("#pk".to_string(), TENANT_ATTR.to_string())]);
        let mut values = HashMap::new();
        let mut set_clauses = Vec::new();
        let mut remove_clauses = Vec::new();

        let settable = update
            .set
            .iter()
            .filter(|(name, _)| name.as_str() != TENANT_ATTR && name.as_str() != ENTITY_ATTR);
        for (i, (name, value)) in settable.enumerate() {
            names.insert(format!("#s{}", i), name.clone());
            values.insert(format!(":s{}", i), to_attribute(value));
            set_clauses.push(format!("#s{} = :s{}", i, i));
        }
        for (i, name) in update.remove.iter().enumerate() {
            names.insert(format!("#r{}", i), name.clone());
            remove_clauses.push(format!("#r{}", i));
        }

        let mut expression = Vec::new();
        if !set_clauses.is_empty() {
            expression.push(format!("SET {}", set_clauses.join(", ")));
        }
        if !remove_clauses.is_empty() {
            expression.push(format!("REMOVE {}", remove_clauses.join(", ")));
        }
        if expression.is_empty() {
            return self.get(key).await?.ok_or_else(|| StorageError::NotFound {
                tenant: key.tenant.clone(),
                entity: key.entity.clone(),
            });
        }

        let result = self
            .client
            .update_item()
            .table_name(&self.table_name)
            .set_key(Some(Self::key_attributes(key)))
            .update_expression(expression.join(" "))
            .condition_expression("attribute_exists(#pk)")
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values((!values.is_empty()).then_some(values))
            .return_values(ReturnValue::AllNew)
            .send()
            .await
            .map_err(|e| classify("update_item", Some(key), e))?;

        Ok(result
            .attributes
            .as_ref()
            .map(from_attributes)
            .unwrap_or_default())
    }

    async fn query(&self, query: &IndexQuery) -> Result<QueryPage> {
        let mut names = HashMap::from([("#k".to_string(), query.key_attr.clone())]);
        let mut values = HashMap::from([(":k".to_string(), to_attribute(&query.key_value))]);
        let mut filters = Vec::new();
        for (i, (attr, value)) in query.filters.iter().enumerate() {
            names.insert(format!("#f{}", i), attr.clone());
            values.insert(format!(":f{}", i), to_attribute(value));
            filters.push(format!("#f{} = :f{}", i, i));
        }

        let start_key = query
            .continuation
            .as_deref()
            .map(Self::decode_continuation)
            .transpose()?;

        let result = self
            .client
            .query()
            .table_name(&self.table_name)
            .set_index_name(query.index.clone())
            .key_condition_expression("#k = :k")
            .set_filter_expression((!filters.is_empty()).then(|| filters.join(" AND ")))
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(Some(values))
            .set_exclusive_start_key(start_key)
            .send()
            .await
            .map_err(|e| classify("query", None, e))?;

        let items = result
            .items
            .unwrap_or_default()
            .iter()
            .map(from_attributes)
            .collect();
        let continuation = result
            .last_evaluated_key
            .as_ref()
            .filter(|k| !k.is_empty())
            .map(Self::encode_continuation)
            .transpose()?;

        Ok(QueryPage {
            items,
            continuation,
        })
    }
}
