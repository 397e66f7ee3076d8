//! Scripted fetcher/transcoder doubles used by the application and HTTP tests.

use crate::domain::events::{AdapterEvent, EventStream};
use crate::domain::jobs::{AcceptedUrl, DownloadRequest};
use crate::domain::media::{CompatibilityProfile, FetchedMedia, MediaInfo, MediaKind};
use crate::error::{ConversionError, FetchError};
use crate::ports::fetcher::MediaFetcher;
use crate::ports::transcoder::Transcoder;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Name the scripted adapters give to the file fetched for `url`:
/// the last path segment, e.g. `https://youtube.com/x` -> `x`.
pub fn stem_for(url: &AcceptedUrl) -> String {
    url.as_str()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("media")
        .replace(['?', '=', '&'], "_")
}

pub struct ScriptedFetcher {
    dir: PathBuf,
    extension: String,
    progress: Vec<u8>,
    step: Duration,
    failures: HashMap<String, FetchError>,
    gate: Option<Arc<Semaphore>>,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            extension: "mp4".to_string(),
            progress: vec![10, 35, 60, 90, 100],
            step: Duration::from_millis(2),
            failures: HashMap::new(),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn extension(mut self, extension: &str) -> Self {
        self.extension = extension.to_string();
        self
    }

    pub fn progress(mut self, progress: Vec<u8>) -> Self {
        self.progress = progress;
        self
    }

    pub fn step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    /// Make downloads whose URL ends in `stem` fail with `error`.
    pub fn fail(mut self, stem: &str, error: FetchError) -> Self {
        self.failures.insert(stem.to_string(), error);
        self
    }

    /// Hold every download before its final event until the gate hands out a permit.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for ScriptedFetcher {
    async fn probe(&self, url: &AcceptedUrl) -> Result<MediaInfo, FetchError> {
        let stem = stem_for(url);
        if let Some(err) = self.failures.get(&stem) {
            return Err(err.clone());
        }
        Ok(MediaInfo {
            title: stem,
            thumbnail: String::new(),
            duration: 12.5,
            uploader: "Unknown".to_string(),
            view_count: 7,
            description: String::new(),
        })
    }

    fn fetch(&self, request: &DownloadRequest) -> EventStream<FetchedMedia, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let stem = stem_for(&request.url);
        let failure = self.failures.get(&stem).cloned();
        let (extension, kind) = if request.audio_only {
            ("mp3".to_string(), MediaKind::Audio)
        } else {
            (self.extension.clone(), MediaKind::Video)
        };
        let path = self.dir.join(format!("{}.{}", stem, extension));
        let step = self.step;
        let gate = self.gate.clone();

        let progress = stream::iter(self.progress.clone()).then(move |percent| async move {
            tokio::time::sleep(step).await;
            AdapterEvent::Progress(percent)
        });
        let finish = stream::once(async move {
            if let Some(gate) = gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
            let result = match failure {
                Some(err) => Err(err),
                None => tokio::fs::write(&path, b"media")
                    .await
                    .map(|_| FetchedMedia { path, kind })
                    .map_err(|e| FetchError::Failed(e.to_string())),
            };
            AdapterEvent::Finished(result)
        });

        progress.chain(finish).boxed()
    }
}

/// Fetcher whose download stream ends without ever reporting a result.
pub struct SilentFetcher;

#[async_trait]
impl MediaFetcher for SilentFetcher {
    async fn probe(&self, _url: &AcceptedUrl) -> Result<MediaInfo, FetchError> {
        Err(FetchError::Timeout)
    }

    fn fetch(&self, _request: &DownloadRequest) -> EventStream<FetchedMedia, FetchError> {
        stream::iter(vec![AdapterEvent::Progress(5)]).boxed()
    }
}

/// Fetcher whose download panics mid-stream.
pub struct PanickingFetcher;

#[async_trait]
impl MediaFetcher for PanickingFetcher {
    async fn probe(&self, _url: &AcceptedUrl) -> Result<MediaInfo, FetchError> {
        Err(FetchError::Timeout)
    }

    fn fetch(&self, _request: &DownloadRequest) -> EventStream<FetchedMedia, FetchError> {
        stream::iter(vec![AdapterEvent::Progress(5)])
            .chain(stream::once(async { explode() }))
            .boxed()
    }
}

fn explode() -> AdapterEvent<FetchedMedia, FetchError> {
    panic!("fetcher blew up")
}

pub struct ScriptedTranscoder {
    codec: Option<String>,
    progress: Vec<u8>,
    step: Duration,
    failure: Option<ConversionError>,
    profile: CompatibilityProfile,
    calls: AtomicUsize,
}

impl ScriptedTranscoder {
    /// Transcoder that reports `codec` for every probed file.
    pub fn reporting(codec: Option<&str>) -> Self {
        Self {
            codec: codec.map(str::to_owned),
            progress: vec![20, 50, 80],
            step: Duration::from_millis(2),
            failure: None,
            profile: CompatibilityProfile::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn step(mut self, step: Duration) -> Self {
        self.step = step;
        self
    }

    pub fn failing(mut self, error: ConversionError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcoder for ScriptedTranscoder {
    async fn probe_video_codec(&self, _path: &Path) -> Option<String> {
        self.codec.clone()
    }

    fn transcode(&self, source: &Path) -> EventStream<PathBuf, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let source = source.to_path_buf();
        let staging = self.profile.staging_path(&source);
        let target = self.profile.final_path(&source);
        let failure = self.failure.clone();
        let step = self.step;

        let progress = stream::iter(self.progress.clone()).then(move |percent| async move {
            tokio::time::sleep(step).await;
            AdapterEvent::Progress(percent)
        });
        let finish = stream::once(async move {
            let result = match failure {
                Some(err) => Err(err),
                None => async move {
                    tokio::fs::write(&staging, b"converted").await?;
                    tokio::fs::rename(&staging, &target).await?;
                    if source != target {
                        tokio::fs::remove_file(&source).await?;
                    }
                    Ok::<_, std::io::Error>(target)
                }
                .await
                .map_err(|e| ConversionError::Failed(e.to_string())),
            };
            AdapterEvent::Finished(result)
        });

        progress.chain(finish).boxed()
    }
}
