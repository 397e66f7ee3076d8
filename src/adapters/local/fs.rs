use crate::error::FileStoreError;
use crate::ports::storage::{FileStore, StoredFile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Component, Path, PathBuf};

/// Finished downloads kept as plain files in a single directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Maps a client supplied name to a path inside the download directory.
    /// Returns `NotFound` when the name is acceptable but nothing is there.
    /// The returned path is the directory entry itself, not its link target.
    async fn existing_file(&self, filename: &str) -> Result<PathBuf, FileStoreError> {
        if !is_safe_filename(filename) {
            return Err(FileStoreError::InvalidFilename(filename.to_string()));
        }

        let not_found = |e: io::Error| match e.kind() {
            io::ErrorKind::NotFound => FileStoreError::NotFound(filename.to_string()),
            _ => e.into(),
        };
        let entry = self.dir.join(filename);
        let root = tokio::fs::canonicalize(&self.dir).await.map_err(not_found)?;
        let target = tokio::fs::canonicalize(&entry).await.map_err(not_found)?;

        // Symlinks may still point elsewhere.
        if target.parent() != Some(root.as_path()) {
            return Err(FileStoreError::InvalidFilename(filename.to_string()));
        }
        if !tokio::fs::metadata(&target).await?.is_file() {
            return Err(FileStoreError::NotFound(filename.to_string()));
        }
        Ok(entry)
    }
}

/// A single path component without separators or NUL. `.` and `..` are
/// rejected as whole names only, so titles like `Wait..what.mp4` pass.
pub fn is_safe_filename(filename: &str) -> bool {
    if filename.is_empty() || filename.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(filename).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn list(&self) -> Result<Vec<StoredFile>, FileStoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            let created_at: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());
            files.push(StoredFile {
                filename,
                size: metadata.len(),
                created_at,
            });
        }

        files.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.filename.cmp(&b.filename))
        });
        Ok(files)
    }

    async fn delete(&self, filename: &str) -> Result<(), FileStoreError> {
        let path = self.existing_file(filename).await?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(FileStoreError::NotFound(filename.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn resolve(&self, filename: &str) -> Result<PathBuf, FileStoreError> {
        self.existing_file(filename).await
    }
}
