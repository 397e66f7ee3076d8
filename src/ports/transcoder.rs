use crate::domain::events::EventStream;
use crate::error::ConversionError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Codec name of the first video stream, `None` if it cannot be determined
    async fn probe_video_codec(&self, path: &Path) -> Option<String>;

    /// Re-encode `source` to the target profile.
    /// On success the stream finishes with the converted file's path and
    /// `source` no longer exists.
    fn transcode(&self, source: &Path) -> EventStream<PathBuf, ConversionError>;
}
