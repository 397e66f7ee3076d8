//! Error types shared across layers.

use crate::domain::jobs::{JobId, JobStatus};
use serde::Serialize;
use thiserror::Error;

/// Why a requested URL was turned away before any job existed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("No URL provided")]
    EmptyUrl,
    #[error("Invalid or unsupported video URL")]
    InvalidUrl,
    #[error("Invalid or unsupported video URL")]
    UnsupportedScheme(String),
    #[error("Invalid or unsupported video URL")]
    UnsupportedDomain(String),
}

/// Classified failure of the fetcher (metadata probe or media download).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Network error while downloading: {0}")]
    Network(String),
    #[error("Video is unavailable: {0}")]
    Unavailable(String),
    #[error("Video requires authentication or is blocked")]
    AuthRequired,
    #[error("Unsupported media or format: {0}")]
    UnsupportedFormat(String),
    #[error("Timeout while fetching video info")]
    Timeout,
    #[error("Download failed: {0}")]
    Failed(String),
    #[error("Download finished but no output file was found")]
    MissingOutput,
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Unavailable(_) => "unavailable",
            FetchError::AuthRequired => "auth_required",
            FetchError::UnsupportedFormat(_) => "unsupported_format",
            FetchError::Timeout => "timeout",
            FetchError::Failed(_) | FetchError::MissingOutput => "fetch_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Could not start transcoder: {0}")]
    Spawn(String),
    #[error("Conversion failed: {0}")]
    Failed(String),
    #[error("Conversion finished but produced no output")]
    MissingOutput,
}

/// The reason recorded on a job that reached `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("Download failed unexpectedly: {0}")]
    Internal(String),
}

impl JobFailure {
    pub fn kind(&self) -> &'static str {
        match self {
            JobFailure::Fetch(e) => e.kind(),
            JobFailure::Conversion(_) => "conversion_failed",
            JobFailure::Internal(_) => "internal",
        }
    }
}

impl Serialize for JobFailure {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job {id} cannot move from {from} to {to}")]
pub struct TransitionError {
    pub id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("job id {0} is already registered")]
    DuplicateId(JobId),
}

#[derive(Debug, Error)]
pub enum FileStoreError {
    #[error("Invalid filename")]
    InvalidFilename(String),
    #[error("File not found")]
    NotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by the orchestrator to request handlers.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    FileStore(#[from] FileStoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Download not found")]
    JobNotFound(JobId),
}
