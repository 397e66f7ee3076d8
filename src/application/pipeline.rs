//! Fetch, optional conversion and finalisation for a single job.

use crate::application::registry::JobRegistry;
use crate::domain::events::{AdapterEvent, EventStream};
use crate::domain::jobs::{DownloadRequest, Job, JobId};
use crate::domain::media::CompatibilityProfile;
use crate::error::{ConversionError, FetchError, JobFailure, TransitionError};
use crate::ports::fetcher::MediaFetcher;
use crate::ports::transcoder::Transcoder;
use futures::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Everything one background task needs to drive its job to a terminal state.
/// The task is the only writer of its registry entry.
pub struct Pipeline<F, T> {
    pub(crate) id: JobId,
    pub(crate) request: DownloadRequest,
    pub(crate) registry: JobRegistry,
    pub(crate) fetcher: Arc<F>,
    pub(crate) transcoder: Arc<T>,
    pub(crate) profile: CompatibilityProfile,
    pub(crate) permits: Arc<Semaphore>,
}

impl<F, T> Pipeline<F, T>
where
    F: MediaFetcher + 'static,
    T: Transcoder + 'static,
{
    pub async fn run(self) {
        // The job stays `queued` until a slot frees up.
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!(job = %self.id, "Job semaphore closed, running without a slot");
                None
            }
        };

        let outcome = match AssertUnwindSafe(self.execute()).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => Err(JobFailure::Internal("pipeline task panicked".to_string())),
        };

        match outcome {
            Ok(path) => {
                info!(job = %self.id, output = %path.display(), "Job completed");
                self.apply(|job| job.complete(path));
            }
            Err(failure) => {
                warn!(job = %self.id, kind = failure.kind(), "Job failed: {}", failure);
                self.apply(|job| job.fail(failure));
            }
        }
    }

    async fn execute(&self) -> Result<PathBuf, JobFailure> {
        self.apply(Job::begin_fetching);
        info!(job = %self.id, url = %self.request.url, "Fetching");

        let fetched = self
            .forward(self.fetcher.fetch(&self.request))
            .await
            .unwrap_or_else(|| Err(FetchError::Failed("fetcher ended without a result".into())))?;

        let codec = if self.request.audio_only {
            None
        } else {
            self.transcoder.probe_video_codec(&fetched.path).await
        };

        if !self.profile.requires_conversion(&fetched, codec.as_deref()) {
            debug!(job = %self.id, codec = ?codec, "No conversion needed");
            self.registry.mutate(&self.id, |job| job.report_progress(100));
            return Ok(fetched.path);
        }

        self.apply(Job::begin_converting);
        info!(
            job = %self.id,
            codec = codec.as_deref().unwrap_or("unknown"),
            target = %self.profile.video_codec,
            "Converting"
        );

        let converted = self
            .forward(self.transcoder.transcode(&fetched.path))
            .await
            .unwrap_or(Err(ConversionError::MissingOutput));

        match converted {
            Ok(path) => Ok(path),
            Err(err) => {
                discard(&fetched.path).await;
                Err(err.into())
            }
        }
    }

    /// Relays progress events into the registry until the adapter reports its
    /// result. `None` means the stream ended without one.
    async fn forward<O, E>(&self, mut events: EventStream<O, E>) -> Option<Result<O, E>> {
        while let Some(event) = events.next().await {
            match event {
                AdapterEvent::Progress(percent) => {
                    let changed = self
                        .registry
                        .mutate(&self.id, |job| job.report_progress(percent))
                        .unwrap_or(false);
                    if changed {
                        debug!(job = %self.id, percent, "Progress");
                    }
                }
                AdapterEvent::Finished(result) => return Some(result),
            }
        }
        None
    }

    fn apply<F2>(&self, transition: F2)
    where
        F2: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        match self.registry.mutate(&self.id, transition) {
            Some(Ok(())) => {}
            Some(Err(err)) => error!("Rejected state change: {}", err),
            None => error!(job = %self.id, "Job vanished from the registry"),
        }
    }
}

async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Discarded intermediate file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Could not discard intermediate file: {}", e),
    }
}
