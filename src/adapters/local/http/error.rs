use crate::error::{FileStoreError, ServiceError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error returned by request handlers, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid request")]
    InvalidRequest,
    #[error("File not found")]
    FileNotFound,
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiError::FileNotFound => StatusCode::NOT_FOUND,
            ApiError::Service(err) => match err {
                ServiceError::Validation(_) | ServiceError::Fetch(_) => StatusCode::BAD_REQUEST,
                ServiceError::JobNotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::FileStore(FileStoreError::InvalidFilename(_)) => {
                    StatusCode::BAD_REQUEST
                }
                ServiceError::FileStore(FileStoreError::NotFound(_)) => StatusCode::NOT_FOUND,
                ServiceError::FileStore(FileStoreError::Io(_)) | ServiceError::Registry(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!("Request failed: {}", self);
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
