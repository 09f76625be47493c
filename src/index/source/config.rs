//! Index source configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Index source type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexSourceType {
    /// JSON file on local or mounted storage.
    #[default]
    Filesystem,
    /// Amazon S3 object (requires `s3` feature).
    #[cfg(feature = "s3")]
    S3,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    #[serde(rename = "type")]
    pub source_type: IndexSourceType,

    pub filesystem: FilesystemIndexConfig,

    /// S3 source configuration (requires `s3` feature).
    #[cfg(feature = "s3")]
    pub s3: S3IndexConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesystemIndexConfig {
    /// Path to the history JSON file.
    pub path: PathBuf,
}

impl Default for FilesystemIndexConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/var/billing/index/history.json"),
        }
    }
}

/// S3 index source configuration.
#[cfg(feature = "s3")]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct S3IndexConfig {
    pub bucket: String,
    pub key: String,
    /// Custom endpoint for S3-compatible services.
    pub endpoint: Option<String>,
    pub region: Option<String>,
}

#[cfg(feature = "s3")]
impl Default for S3IndexConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            key: "incc-index/history.json".to_string(),
            endpoint: None,
            region: None,
        }
    }
}
