use crate::application::pipeline::Pipeline;
use crate::application::registry::JobRegistry;
use crate::domain::allow_list::AllowList;
use crate::domain::jobs::{DownloadRequest, FormatSelector, Job, JobId, JobView};
use crate::domain::media::{CompatibilityProfile, MediaInfo};
use crate::error::{FileStoreError, ServiceError};
use crate::ports::fetcher::MediaFetcher;
use crate::ports::storage::{FileStore, StoredFile};
use crate::ports::transcoder::Transcoder;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::info;

pub struct OrchestratorService<F, T, S> {
    fetcher: Arc<F>,
    transcoder: Arc<T>,
    store: S,
    registry: JobRegistry,
    allow_list: AllowList,
    profile: CompatibilityProfile,
    permits: Arc<Semaphore>,
}

impl<F, T, S> OrchestratorService<F, T, S>
where
    F: MediaFetcher + 'static,
    T: Transcoder + 'static,
    S: FileStore,
{
    pub fn new(
        fetcher: F,
        transcoder: T,
        store: S,
        registry: JobRegistry,
        allow_list: AllowList,
        max_concurrent_jobs: usize,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            transcoder: Arc::new(transcoder),
            store,
            registry,
            allow_list,
            profile: CompatibilityProfile::default(),
            permits: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    #[cfg(test)]
    pub(crate) fn fetcher(&self) -> &F {
        &self.fetcher
    }

    #[cfg(test)]
    pub(crate) fn transcoder(&self) -> &T {
        &self.transcoder
    }

    /// Validates the URL, registers a `queued` job and starts its pipeline in
    /// the background. Returns as soon as the job is registered.
    pub fn create_job(
        &self,
        url: &str,
        format: FormatSelector,
        audio_only: bool,
    ) -> Result<JobId, ServiceError> {
        let url = self.allow_list.validate(url)?;
        let request = DownloadRequest {
            url,
            format,
            audio_only,
        };

        let job = Job::new(request.clone());
        let id = job.id.clone();
        self.registry.insert(job)?;

        let pipeline = Pipeline {
            id: id.clone(),
            request,
            registry: self.registry.clone(),
            fetcher: self.fetcher.clone(),
            transcoder: self.transcoder.clone(),
            profile: self.profile.clone(),
            permits: self.permits.clone(),
        };
        tokio::spawn(pipeline.run());

        info!(job = %id, format = ?format, audio_only, "Job queued");
        Ok(id)
    }

    pub fn get_progress(&self, id: &JobId) -> Result<JobView, ServiceError> {
        self.registry
            .view(id)
            .ok_or_else(|| ServiceError::JobNotFound(id.clone()))
    }

    pub async fn video_info(&self, url: &str) -> Result<MediaInfo, ServiceError> {
        let url = self.allow_list.validate(url)?;
        Ok(self.fetcher.probe(&url).await?)
    }

    pub async fn list_files(&self) -> Result<Vec<StoredFile>, ServiceError> {
        Ok(self.store.list().await?)
    }

    pub async fn resolve_file(&self, filename: &str) -> Result<PathBuf, ServiceError> {
        Ok(self.store.resolve(filename).await?)
    }

    /// Deletes an output file and withdraws it from every job that produced it.
    pub async fn delete_file(&self, filename: &str) -> Result<(), ServiceError> {
        match self.store.delete(filename).await {
            Ok(()) => {
                let released = self.registry.release_output(filename);
                info!(filename, released, "Deleted file");
                Ok(())
            }
            Err(FileStoreError::NotFound(name)) => {
                // A file removed behind our back should not stay advertised.
                self.registry.release_output(&name);
                Err(FileStoreError::NotFound(name).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
