use crate::domain::events::EventStream;
use crate::domain::jobs::{AcceptedUrl, DownloadRequest};
use crate::domain::media::{FetchedMedia, MediaInfo};
use crate::error::FetchError;
use async_trait::async_trait;

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch metadata without downloading the media
    async fn probe(&self, url: &AcceptedUrl) -> Result<MediaInfo, FetchError>;

    /// Download the media described by `request`.
    /// Nothing runs until the returned stream is polled.
    fn fetch(&self, request: &DownloadRequest) -> EventStream<FetchedMedia, FetchError>;
}
