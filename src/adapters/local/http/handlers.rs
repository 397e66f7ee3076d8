use super::error::ApiError;
use super::AppState;
use crate::domain::jobs::{FormatSelector, JobId, JobView};
use crate::domain::media::MediaInfo;
use crate::ports::fetcher::MediaFetcher;
use crate::ports::storage::{FileStore, StoredFile};
use crate::ports::transcoder::Transcoder;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{header, HeaderValue};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;

const INDEX_HTML: &str = include_str!("index.html");

#[derive(Debug, Deserialize)]
pub struct InfoRequest {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadPayload {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub audio_only: bool,
}

#[derive(Debug, Serialize)]
pub struct DownloadStarted {
    pub job_id: JobId,
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn video_info<F, T, S>(
    State(state): State<AppState<F, T, S>>,
    payload: Result<Json<InfoRequest>, JsonRejection>,
) -> Result<Json<MediaInfo>, ApiError>
where
    F: MediaFetcher + 'static,
    T: Transcoder + 'static,
    S: FileStore + 'static,
{
    let Json(payload) = payload.map_err(|_| ApiError::InvalidRequest)?;
    let info = state.service.video_info(&payload.url).await?;
    Ok(Json(info))
}

pub async fn start_download<F, T, S>(
    State(state): State<AppState<F, T, S>>,
    payload: Result<Json<DownloadPayload>, JsonRejection>,
) -> Result<Json<DownloadStarted>, ApiError>
where
    F: MediaFetcher + 'static,
    T: Transcoder + 'static,
    S: FileStore + 'static,
{
    let Json(payload) = payload.map_err(|_| ApiError::InvalidRequest)?;
    let format = payload
        .format
        .as_deref()
        .map(FormatSelector::parse_lenient)
        .unwrap_or_default();

    let job_id = state
        .service
        .create_job(&payload.url, format, payload.audio_only)?;
    Ok(Json(DownloadStarted { job_id }))
}

pub async fn progress<F, T, S>(
    State(state): State<AppState<F, T, S>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobView>, ApiError>
where
    F: MediaFetcher + 'static,
    T: Transcoder + 'static,
    S: FileStore + 'static,
{
    let view = state.service.get_progress(&JobId::from(job_id))?;
    Ok(Json(view))
}

pub async fn list_downloads<F, T, S>(
    State(state): State<AppState<F, T, S>>,
) -> Result<Json<Vec<StoredFile>>, ApiError>
where
    F: MediaFetcher + 'static,
    T: Transcoder + 'static,
    S: FileStore + 'static,
{
    Ok(Json(state.service.list_files().await?))
}

pub async fn delete_file<F, T, S>(
    State(state): State<AppState<F, T, S>>,
    Path(filename): Path<String>,
) -> Result<Json<Value>, ApiError>
where
    F: MediaFetcher + 'static,
    T: Transcoder + 'static,
    S: FileStore + 'static,
{
    state.service.delete_file(&filename).await?;
    Ok(Json(json!({ "success": true })))
}

/// Streams a finished file as an attachment. Invalid names are reported as
/// missing.
pub async fn serve_download<F, T, S>(
    State(state): State<AppState<F, T, S>>,
    Path(filename): Path<String>,
    request: Request,
) -> Result<Response, ApiError>
where
    F: MediaFetcher + 'static,
    T: Transcoder + 'static,
    S: FileStore + 'static,
{
    let path = state.service.resolve_file(&filename).await.map_err(|e| {
        debug!(filename, "Refusing to serve file: {}", e);
        ApiError::FileNotFound
    })?;

    let mut response = match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    };
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&filename)) {
        response.headers_mut().insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `attachment` disposition with an ASCII fallback name and the exact UTF-8
/// name in RFC 5987 form.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .filter(|c| *c != '"' && *c != '\\')
        .collect();

    let mut encoded = String::with_capacity(filename.len());
    for byte in filename.bytes() {
        if byte.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&byte) {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }

    format!("attachment; filename=\"{}\"; filename*=UTF-8''{}", fallback, encoded)
}
