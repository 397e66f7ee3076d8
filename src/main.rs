//! Server binary - single-process deployment
//!
//! Wires up:
//! - Local adapters (yt-dlp, ffmpeg, download directory)
//! - The job orchestrator and the optional job pruner
//! - HTTP inbound adapter

use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use vidget::adapters::local::{http, FfmpegTranscoder, LocalFileStore, YtDlpFetcher};
use vidget::application::orchestrator::OrchestratorService;
use vidget::application::pruner;
use vidget::application::registry::JobRegistry;
use vidget::domain::allow_list::AllowList;
use vidget::AppConfig;

#[tokio::main]
async fn main() -> ExitCode {
    let config = AppConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vidget=info,tower_http=info")),
        )
        .init();

    if let Err(e) = tokio::fs::create_dir_all(&config.download_dir).await {
        error!(dir = %config.download_dir.display(), "Failed to create download directory: {}", e);
        return ExitCode::FAILURE;
    }

    // 1. Adapters
    let fetcher = YtDlpFetcher::new(
        &config.ytdlp_bin,
        &config.download_dir,
        &config.user_agent,
        config.info_timeout,
    );
    let transcoder = FfmpegTranscoder::new(&config.ffmpeg_bin, &config.ffprobe_bin);
    let store = LocalFileStore::new(&config.download_dir);

    let allow_list = if config.allowed_domains.is_empty() {
        AllowList::default()
    } else {
        AllowList::new(&config.allowed_domains)
    };

    // 2. Application services
    let registry = JobRegistry::new();
    let orchestrator = Arc::new(OrchestratorService::new(
        fetcher,
        transcoder,
        store,
        registry.clone(),
        allow_list,
        config.max_concurrent_jobs,
    ));

    let shutdown = CancellationToken::new();
    let pruner = config.job_retention.map(|retention| {
        pruner::spawn(registry, retention, config.prune_interval, shutdown.clone())
    });

    // 3. HTTP layer
    let app = http::router(orchestrator);

    // 4. Start server
    let listener = match tokio::net::TcpListener::bind(config.bind_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", config.bind_address(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        download_dir = %config.download_dir.display(),
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Listening at http://{}",
        config.bind_address()
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Some(pruner) = pruner {
        let _ = pruner.await;
    }

    match served {
        Ok(()) => {
            info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Server failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for ctrl-c: {}", e);
                shutdown.cancelled().await;
                return;
            }
            info!("Shutting down");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
