//! vidget - Video download service
//!
//! Hexagonal Architecture:
//! - domain/: Pure business logic (jobs, allow-list, media rules)
//! - ports/: Trait definitions (fetcher, transcoder, file store)
//! - adapters/: Concrete implementations (yt-dlp, ffmpeg, filesystem, HTTP)
//! - application/: Job registry, orchestrator and per-job pipelines
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AppConfig;
