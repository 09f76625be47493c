//! Index history read from an S3 object.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use tracing::{debug, warn};

use super::{IndexSource, S3IndexConfig};
use crate::index::{IndexError, IndexTable};

pub struct S3IndexSource {
    client: Client,
    bucket: String,
    key: String,
}

impl S3IndexSource {
    /// Build from configuration, honoring a custom endpoint and region.
    pub async fn from_config(config: &S3IndexConfig) -> Self {
        let mut config_loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            config_loader = config_loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = config_loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::with_client(
            Client::from_conf(builder.build()),
            config.bucket.clone(),
            config.key.clone(),
        )
    }

    /// Create with explicit client (for testing).
    pub fn with_client(client: Client, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl IndexSource for S3IndexSource {
    async fn load(&self) -> Result<IndexTable, IndexError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .map_err(|e| {
                warn!(bucket = %self.bucket, key = %self.key, error = %e, "Failed to fetch index history");
                IndexError::Source(format!(
                    "{}: {}",
                    self.describe(),
                    aws_sdk_s3::error::DisplayErrorContext(&e)
                ))
            })?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| IndexError::Source(format!("{}: {}", self.describe(), e)))?
            .into_bytes();

        let table = IndexTable::from_json(&bytes)?;
        debug!(bucket = %self.bucket, key = %self.key, months = table.len(), "Loaded index history");
        Ok(table)
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
