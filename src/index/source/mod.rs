//! Where the index history blob comes from.

mod config;
mod filesystem;
#[cfg(feature = "s3")]
mod s3;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

pub use config::{FilesystemIndexConfig, IndexConfig, IndexSourceType};
#[cfg(feature = "s3")]
pub use config::S3IndexConfig;
pub use filesystem::FilesystemIndexSource;
#[cfg(feature = "s3")]
pub use s3::S3IndexSource;

use super::{IndexError, IndexTable};

/// Loads the full index history.
#[async_trait]
pub trait IndexSource: Send + Sync {
    async fn load(&self) -> Result<IndexTable, IndexError>;

    /// Human-readable location, for logs.
    fn describe(&self) -> String;
}

/// Fixed table held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticIndexSource {
    table: IndexTable,
}

impl StaticIndexSource {
    pub fn new(table: IndexTable) -> Self {
        Self { table }
    }
}

#[async_trait]
impl IndexSource for StaticIndexSource {
    async fn load(&self) -> Result<IndexTable, IndexError> {
        Ok(self.table.clone())
    }

    fn describe(&self) -> String {
        format!("static({} months)", self.table.len())
    }
}

/// Build the configured index source.
pub async fn init_index_source(config: &IndexConfig) -> Result<Arc<dyn IndexSource>, IndexError> {
    let source: Arc<dyn IndexSource> = match config.source_type {
        IndexSourceType::Filesystem => {
            Arc::new(FilesystemIndexSource::new(&config.filesystem.path))
        }
        #[cfg(feature = "s3")]
        IndexSourceType::S3 => Arc::new(S3IndexSource::from_config(&config.s3).await),
    };
    info!(source = %source.describe(), "Index source configured");
    Ok(source)
}
