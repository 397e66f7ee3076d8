use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command as TokioCommand;

// One-shot ffprobe invocations used by the transcoder
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn run_ffprobe_codec(&self, path: &Path) -> io::Result<Output>;
    async fn run_ffprobe_duration(&self, path: &Path) -> io::Result<Output>;
}

pub struct RealProbeRunner {
    ffprobe: PathBuf,
}

impl RealProbeRunner {
    pub fn new(ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

#[async_trait]
impl ProbeRunner for RealProbeRunner {
    async fn run_ffprobe_codec(&self, path: &Path) -> io::Result<Output> {
        TokioCommand::new(&self.ffprobe)
            .arg("-v").arg("error")
            .arg("-select_streams").arg("v:0")
            .arg("-show_entries").arg("stream=codec_name")
            .arg("-of").arg("csv=p=0")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
    }

    async fn run_ffprobe_duration(&self, path: &Path) -> io::Result<Output> {
        TokioCommand::new(&self.ffprobe)
            .arg("-v").arg("error")
            .arg("-show_entries").arg("format=duration")
            .arg("-of").arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
    }
}

/// Client selection that keeps YouTube from serving the bot check page.
pub const YOUTUBE_EXTRACTOR_ARGS: &str = "youtube:player_client=web,default;youtube:player_skip=webpage";

// Metadata lookups that do not download anything
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataRunner: Send + Sync {
    async fn run_ytdlp_dump_json(&self, url: &str) -> io::Result<Output>;
}

pub struct RealMetadataRunner {
    ytdlp: PathBuf,
    user_agent: String,
}

impl RealMetadataRunner {
    pub fn new(ytdlp: impl Into<PathBuf>, user_agent: impl Into<String>) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl MetadataRunner for RealMetadataRunner {
    async fn run_ytdlp_dump_json(&self, url: &str) -> io::Result<Output> {
        TokioCommand::new(&self.ytdlp)
            .arg("--dump-json")
            .arg("--no-download")
            .arg("--no-check-certificates")
            .arg("--geo-bypass")
            .arg("--user-agent").arg(&self.user_agent)
            .arg("--extractor-args").arg(YOUTUBE_EXTRACTOR_ARGS)
            .arg("--")
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
    }
}

/// Last non-empty stderr line of a failed command, for logs and error messages.
pub fn stderr_tail(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("")
        .to_string()
}
