use crate::error::FileStoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub filename: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    /// List finished files, newest first
    async fn list(&self) -> Result<Vec<StoredFile>, FileStoreError>;

    /// Delete a file by name
    async fn delete(&self, filename: &str) -> Result<(), FileStoreError>;

    /// Resolve a file name to an existing local path
    async fn resolve(&self, filename: &str) -> Result<PathBuf, FileStoreError>;
}
