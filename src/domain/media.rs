use serde::Serialize;
use std::path::{Path, PathBuf};

const DESCRIPTION_PREVIEW_CHARS: usize = 200;

/// Metadata shown to the user before a download starts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaInfo {
    pub title: String,
    pub thumbnail: String,
    pub duration: f64,
    pub uploader: String,
    pub view_count: u64,
    pub description: String,
}

impl MediaInfo {
    /// Shortens a description to its first 200 characters followed by `...`.
    pub fn preview_description(description: Option<&str>) -> String {
        match description {
            Some(text) if !text.is_empty() => {
                let head: String = text.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
                format!("{}...", head)
            }
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Audio,
}

/// A file the fetcher finished writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub kind: MediaKind,
}

/// The codec/container target that finished videos must satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityProfile {
    pub video_codec: String,
    pub container: String,
}

impl Default for CompatibilityProfile {
    fn default() -> Self {
        Self {
            video_codec: "h264".to_string(),
            container: "mp4".to_string(),
        }
    }
}

impl CompatibilityProfile {
    /// Decides whether `media` must go through the transcoder. `probed_codec`
    /// is `None` when the codec could not be determined; such files are kept
    /// as they are.
    pub fn requires_conversion(&self, media: &FetchedMedia, probed_codec: Option<&str>) -> bool {
        if media.kind == MediaKind::Audio {
            return false;
        }
        match probed_codec {
            Some(codec) => !codec.trim().eq_ignore_ascii_case(&self.video_codec),
            None => false,
        }
    }

    /// Where the transcoder writes before the result replaces the source.
    pub fn staging_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        source.with_file_name(format!("{}_converted.{}", stem, self.container))
    }

    /// Final location of a converted file.
    pub fn final_path(&self, source: &Path) -> PathBuf {
        source.with_extension(&self.container)
    }
}
