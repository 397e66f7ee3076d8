//! HTTP inbound adapter.
//!
//! JSON API for starting downloads and polling their progress, plus listing,
//! serving and deleting finished files.

pub mod error;
pub mod handlers;


use crate::application::orchestrator::OrchestratorService;
use crate::ports::fetcher::MediaFetcher;
use crate::ports::storage::FileStore;
use crate::ports::transcoder::Transcoder;
use axum::http::{HeaderName, HeaderValue};
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

pub struct AppState<F, T, S> {
    pub service: Arc<OrchestratorService<F, T, S>>,
}

impl<F, T, S> Clone for AppState<F, T, S> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
        }
    }
}

const SECURITY_HEADERS: [(&str, &str); 4] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

pub fn router<F, T, S>(service: Arc<OrchestratorService<F, T, S>>) -> Router
where
    F: MediaFetcher + 'static,
    T: Transcoder + 'static,
    S: FileStore + 'static,
{
    let mut router = Router::new()
        .route("/", get(handlers::index))
        .route("/api/info", post(handlers::video_info::<F, T, S>))
        .route("/api/download", post(handlers::start_download::<F, T, S>))
        .route("/api/progress/:job_id", get(handlers::progress::<F, T, S>))
        .route("/api/downloads", get(handlers::list_downloads::<F, T, S>))
        .route("/api/delete/:filename", delete(handlers::delete_file::<F, T, S>))
        .route("/downloads/:filename", get(handlers::serve_download::<F, T, S>))
        .with_state(AppState { service });

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    router.layer(TraceLayer::new_for_http())
}
