//! Media fetcher backed by the `yt-dlp` command line tool.
//!
//! Downloads run as a child process whose `--newline` output is parsed line by
//! line for progress, the output location and error messages. Metadata lookups
//! go through a [`MetadataRunner`] so they can be mocked.

use crate::adapters::local::cmd::{
    stderr_tail, MetadataRunner, RealMetadataRunner, YOUTUBE_EXTRACTOR_ARGS,
};
use crate::adapters::local::process::MergedLines;
use crate::domain::events::{percent_from_f64, AdapterEvent, EventStream};
use crate::domain::jobs::{AcceptedUrl, DownloadRequest, FormatSelector};
use crate::domain::media::{FetchedMedia, MediaInfo, MediaKind};
use crate::error::FetchError;
use crate::ports::fetcher::MediaFetcher;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Deserialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr, ChildStdout, Command as TokioCommand};
use tracing::{debug, warn};

const OUTPUT_EXTENSIONS: [&str; 4] = ["mp4", "webm", "mkv", "mp3"];
const ERROR_MESSAGE_CHARS: usize = 100;

pub struct YtDlpFetcher<R = RealMetadataRunner> {
    binary: PathBuf,
    download_dir: PathBuf,
    user_agent: String,
    info_timeout: Duration,
    runner: R,
}

impl YtDlpFetcher<RealMetadataRunner> {
    pub fn new(
        binary: impl Into<PathBuf>,
        download_dir: impl Into<PathBuf>,
        user_agent: impl Into<String>,
        info_timeout: Duration,
    ) -> Self {
        let binary = binary.into();
        let user_agent = user_agent.into();
        let runner = RealMetadataRunner::new(binary.clone(), user_agent.clone());
        Self::with_runner(runner, binary, download_dir, user_agent, info_timeout)
    }
}

impl<R: MetadataRunner> YtDlpFetcher<R> {
    pub fn with_runner(
        runner: R,
        binary: impl Into<PathBuf>,
        download_dir: impl Into<PathBuf>,
        user_agent: impl Into<String>,
        info_timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            download_dir: download_dir.into(),
            user_agent: user_agent.into(),
            info_timeout,
            runner,
        }
    }

    fn download_args(&self, request: &DownloadRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "--newline",
            "--progress",
            "--no-check-certificates",
            "--geo-bypass",
            "--user-agent",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        args.push(self.user_agent.clone().into());
        args.push("--extractor-args".into());
        args.push(YOUTUBE_EXTRACTOR_ARGS.into());

        if request.audio_only {
            args.extend(["-x", "--audio-format", "mp3"].map(OsString::from));
        } else {
            args.push("-f".into());
            args.push(format_expression(request.format).into());
            args.extend(["--merge-output-format", "mp4"].map(OsString::from));
        }

        args.push("-o".into());
        args.push(self.download_dir.join("%(title)s.%(ext)s").into_os_string());
        args.push("--".into());
        args.push(request.url.as_str().into());
        args
    }
}

/// yt-dlp format expression preferring H.264 video and AAC audio, capped at
/// the requested height.
pub fn format_expression(format: FormatSelector) -> String {
    match format.max_height() {
        None => "bestvideo[vcodec^=avc1]+bestaudio[acodec^=mp4a]/bestvideo[vcodec^=avc1]+bestaudio/best[vcodec^=avc1]/bestvideo+bestaudio/best".to_string(),
        Some(h) => format!(
            "bestvideo[height<={h}][vcodec^=avc1]+bestaudio[acodec^=mp4a]/bestvideo[height<={h}][vcodec^=avc1]+bestaudio/best[height<={h}][vcodec^=avc1]/bestvideo[height<={h}]+bestaudio/best[height<={h}]"
        ),
    }
}

#[async_trait]
impl<R: MetadataRunner> MediaFetcher for YtDlpFetcher<R> {
    async fn probe(&self, url: &AcceptedUrl) -> Result<MediaInfo, FetchError> {
        let lookup = self.runner.run_ytdlp_dump_json(url.as_str());
        let output = tokio::time::timeout(self.info_timeout, lookup)
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(|e| FetchError::Failed(format!("could not run yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let errors: Vec<String> = stderr
                .lines()
                .filter(|l| is_error_line(l))
                .map(str::to_owned)
                .collect();
            warn!(url = %url, "yt-dlp metadata lookup failed: {}", stderr_tail(&output));
            return Err(classify_failure(&errors));
        }

        parse_media_info(&String::from_utf8_lossy(&output.stdout))
    }

    fn fetch(&self, request: &DownloadRequest) -> EventStream<FetchedMedia, FetchError> {
        let invocation = Invocation {
            binary: self.binary.clone(),
            args: self.download_args(request),
            kind: if request.audio_only {
                MediaKind::Audio
            } else {
                MediaKind::Video
            },
        };

        stream::unfold(Step::Pending(invocation), |step| async move {
            match step {
                Step::Done => None,
                Step::Pending(invocation) => match invocation.spawn() {
                    Ok(download) => download.next_event().await,
                    Err(e) => {
                        let reason = format!("could not start yt-dlp: {}", e);
                        Some((AdapterEvent::Finished(Err(FetchError::Failed(reason))), Step::Done))
                    }
                },
                Step::Running(download) => download.next_event().await,
            }
        })
        .boxed()
    }
}

struct Invocation {
    binary: PathBuf,
    args: Vec<OsString>,
    kind: MediaKind,
}

impl Invocation {
    fn spawn(self) -> std::io::Result<Download> {
        debug!(binary = %self.binary.display(), args = ?self.args, "Spawning yt-dlp");
        let mut child = TokioCommand::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;
        let lines = MergedLines::from_child(&mut child);
        Ok(Download {
            child,
            lines,
            tracker: OutputTracker::default(),
            kind: self.kind,
        })
    }
}

enum Step {
    Pending(Invocation),
    Running(Download),
    Done,
}

struct Download {
    child: Child,
    lines: MergedLines<BufReader<ChildStdout>, BufReader<ChildStderr>>,
    tracker: OutputTracker,
    kind: MediaKind,
}

impl Download {
    async fn next_event(mut self) -> Option<(AdapterEvent<FetchedMedia, FetchError>, Step)> {
        while let Some(line) = self.lines.next_line().await {
            if let Some(percent) = self.tracker.observe(&line) {
                return Some((AdapterEvent::Progress(percent), Step::Running(self)));
            }
        }

        let result = match self.child.wait().await {
            Ok(status) => self.finish(status).await,
            Err(e) => Err(FetchError::Failed(format!("lost track of yt-dlp: {}", e))),
        };
        Some((AdapterEvent::Finished(result), Step::Done))
    }

    async fn finish(&self, status: ExitStatus) -> Result<FetchedMedia, FetchError> {
        if !status.success() {
            return Err(classify_failure(&self.tracker.errors));
        }
        let path = locate_output(self.tracker.destination.as_deref())
            .await
            .ok_or(FetchError::MissingOutput)?;
        Ok(FetchedMedia {
            path,
            kind: self.kind,
        })
    }
}

fn progress_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%").expect("valid regex"))
}

fn destination_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[(?:download|ExtractAudio)\] Destination: (.+)$").expect("valid regex")
    })
}

fn already_downloaded_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\[download\] (.+) has already been downloaded").expect("valid regex")
    })
}

fn merger_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^\[Merger\] Merging formats into "(.+)"$"#).expect("valid regex")
    })
}

/// State accumulated from yt-dlp's output while a download runs.
#[derive(Debug, Default)]
struct OutputTracker {
    destination: Option<PathBuf>,
    errors: Vec<String>,
    last_percent: Option<u8>,
}

impl OutputTracker {
    /// Consumes one output line. Returns a percentage when it changed.
    fn observe(&mut self, line: &str) -> Option<u8> {
        let line = line.trim();
        if is_error_line(line) {
            self.errors.push(line.to_string());
        }

        if let Some(caps) = merger_re().captures(line) {
            self.destination = Some(PathBuf::from(&caps[1]));
            return self.update(100);
        }
        if let Some(caps) = destination_re().captures(line) {
            self.destination = Some(PathBuf::from(caps[1].trim()));
            if line.starts_with("[ExtractAudio]") {
                return self.update(100);
            }
            return None;
        }
        if let Some(caps) = already_downloaded_re().captures(line) {
            self.destination = Some(PathBuf::from(&caps[1]));
            return self.update(100);
        }
        if let Some(caps) = progress_re().captures(line) {
            let percent = caps[1].parse::<f64>().map(percent_from_f64).ok()?;
            return self.update(percent);
        }
        None
    }

    fn update(&mut self, percent: u8) -> Option<u8> {
        if self.last_percent == Some(percent) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(percent)
    }
}

fn is_error_line(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("ERROR:") || line.starts_with("error:")
}

/// Finds the file yt-dlp produced. The reported destination can name an
/// intermediate format file (`title.f137.mp4`), so siblings with the same base
/// name and a known media extension are tried as well.
async fn locate_output(destination: Option<&Path>) -> Option<PathBuf> {
    let destination = destination?;
    if tokio::fs::metadata(destination).await.is_ok_and(|m| m.is_file()) {
        return Some(destination.to_path_buf());
    }
    for candidate in output_candidates(destination) {
        if tokio::fs::metadata(&candidate).await.is_ok_and(|m| m.is_file()) {
            return Some(candidate);
        }
    }
    None
}

fn output_candidates(destination: &Path) -> Vec<PathBuf> {
    let mut bases = vec![destination.with_extension("")];
    if let Some(stem) = bases[0].file_name().and_then(|n| n.to_str()) {
        if let Some((title, format_id)) = stem.rsplit_once('.') {
            let is_format_id = format_id.len() > 1
                && format_id.starts_with('f')
                && format_id[1..].chars().all(|c| c.is_ascii_digit());
            if is_format_id {
                bases.push(destination.with_file_name(title));
            }
        }
    }
    bases
        .iter()
        .flat_map(|base| {
            OUTPUT_EXTENSIONS.iter().map(move |ext| {
                let mut name = base.clone().into_os_string();
                name.push(".");
                name.push(ext);
                PathBuf::from(name)
            })
        })
        .collect()
}

/// Maps yt-dlp's error output to a failure class. Only the last error line is
/// considered.
pub fn classify_failure(errors: &[String]) -> FetchError {
    let Some(last) = errors.last() else {
        return FetchError::Unavailable("video may be unavailable".to_string());
    };
    let lower = last.to_lowercase();
    let message: String = last
        .trim_start_matches("ERROR:")
        .trim()
        .chars()
        .take(ERROR_MESSAGE_CHARS)
        .collect();

    if last.contains("Sign in") || lower.contains("bot") {
        FetchError::AuthRequired
    } else if lower.contains("unsupported url")
        || lower.contains("requested format is not available")
    {
        FetchError::UnsupportedFormat(message)
    } else if ["network", "connection", "timed out", "getaddrinfo", "http error 5"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        FetchError::Network(message)
    } else if ["unavailable", "private", "removed", "http error 404"]
        .iter()
        .any(|needle| lower.contains(needle))
    {
        FetchError::Unavailable(message)
    } else {
        FetchError::Failed(message)
    }
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    title: Option<String>,
    thumbnail: Option<String>,
    duration: Option<f64>,
    uploader: Option<String>,
    view_count: Option<u64>,
    description: Option<String>,
}

/// Parses the first JSON document of `yt-dlp --dump-json` output.
pub fn parse_media_info(stdout: &str) -> Result<MediaInfo, FetchError> {
    let document = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| FetchError::Failed("Failed to fetch video information".to_string()))?;
    let raw: RawInfo = serde_json::from_str(document)
        .map_err(|_| FetchError::Failed("Failed to fetch video information".to_string()))?;

    Ok(MediaInfo {
        title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
        thumbnail: raw.thumbnail.unwrap_or_default(),
        duration: raw.duration.unwrap_or(0.0),
        uploader: raw.uploader.unwrap_or_else(|| "Unknown".to_string()),
        view_count: raw.view_count.unwrap_or(0),
        description: MediaInfo::preview_description(raw.description.as_deref()),
    })
}
