//! Index history read from a local JSON file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use super::IndexSource;
use crate::index::{IndexError, IndexTable};

pub struct FilesystemIndexSource {
    path: PathBuf,
}

impl FilesystemIndexSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl IndexSource for FilesystemIndexSource {
    async fn load(&self) -> Result<IndexTable, IndexError> {
        let bytes = fs::read(&self.path).await?;
        let table = IndexTable::from_json(&bytes)?;
        debug!(path = %self.path.display(), months = table.len(), "Loaded index history");
        Ok(table)
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}
