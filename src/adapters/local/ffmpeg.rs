//! Transcoder that re-encodes videos to H.264/AAC MP4 with the `ffmpeg` CLI.

use crate::adapters::local::cmd::{ProbeRunner, RealProbeRunner};
use crate::adapters::local::process::MergedLines;
use crate::domain::events::{AdapterEvent, EventStream};
use crate::domain::media::CompatibilityProfile;
use crate::error::ConversionError;
use crate::ports::transcoder::Transcoder;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr, ChildStdout, Command as TokioCommand};
use tracing::{debug, warn};

pub struct FfmpegTranscoder<P = RealProbeRunner> {
    ffmpeg: PathBuf,
    profile: CompatibilityProfile,
    probe: Arc<P>,
}

impl FfmpegTranscoder<RealProbeRunner> {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self::with_runner(RealProbeRunner::new(ffprobe), ffmpeg)
    }
}

impl<P: ProbeRunner + 'static> FfmpegTranscoder<P> {
    pub fn with_runner(probe: P, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            profile: CompatibilityProfile::default(),
            probe: Arc::new(probe),
        }
    }
}

#[async_trait]
impl<P: ProbeRunner + 'static> Transcoder for FfmpegTranscoder<P> {
    async fn probe_video_codec(&self, path: &Path) -> Option<String> {
        match self.probe.run_ffprobe_codec(path).await {
            Ok(output) if output.status.success() => {
                parse_codec(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                debug!(
                    path = %path.display(),
                    "ffprobe could not read the video stream: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                None
            }
            Err(e) => {
                warn!("ffprobe is not available, skipping codec check: {}", e);
                None
            }
        }
    }

    fn transcode(&self, source: &Path) -> EventStream<PathBuf, ConversionError> {
        let request = Conversion {
            ffmpeg: self.ffmpeg.clone(),
            probe: self.probe.clone(),
            source: source.to_path_buf(),
            staging: self.profile.staging_path(source),
            target: self.profile.final_path(source),
        };

        stream::unfold(Step::Pending(request), |step| async move {
            match step {
                Step::Done => None,
                Step::Pending(request) => match request.start().await {
                    Ok(running) => running.next_event().await,
                    Err(e) => Some((AdapterEvent::Finished(Err(e)), Step::Done)),
                },
                Step::Running(running) => running.next_event().await,
            }
        })
        .boxed()
    }
}

/// First non-empty line of `ffprobe -show_entries stream=codec_name` output.
fn parse_codec(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .map(|line| line.trim().trim_end_matches(','))
        .find(|line| !line.is_empty())
        .map(str::to_owned)
}

fn parse_duration_us(stdout: &str) -> Option<u64> {
    let seconds: f64 = stdout.trim().parse().ok()?;
    (seconds.is_finite() && seconds > 0.0).then(|| (seconds * 1_000_000.0) as u64)
}

struct Conversion<P> {
    ffmpeg: PathBuf,
    probe: Arc<P>,
    source: PathBuf,
    staging: PathBuf,
    target: PathBuf,
}

impl<P: ProbeRunner> Conversion<P> {
    async fn start(self) -> Result<Running, ConversionError> {
        let duration_us = match self.probe.run_ffprobe_duration(&self.source).await {
            Ok(output) if output.status.success() => {
                parse_duration_us(&String::from_utf8_lossy(&output.stdout))
            }
            _ => None,
        };
        if duration_us.is_none() {
            debug!(
                source = %self.source.display(),
                "Unknown duration, conversion progress will not be reported"
            );
        }

        let mut child = TokioCommand::new(&self.ffmpeg)
            .arg("-i").arg(&self.source)
            .arg("-c:v").arg("libx264")
            .arg("-preset").arg("fast")
            .arg("-crf").arg("22")
            .arg("-c:a").arg("aac")
            .arg("-b:a").arg("192k")
            .arg("-movflags").arg("+faststart")
            .arg("-progress").arg("pipe:1")
            .arg("-nostats")
            .arg("-loglevel").arg("error")
            .arg("-y")
            .arg(&self.staging)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConversionError::Spawn(e.to_string()))?;

        let lines = MergedLines::from_child(&mut child);
        Ok(Running {
            child,
            lines,
            tracker: ProgressTracker::new(duration_us),
            source: self.source,
            staging: self.staging,
            target: self.target,
        })
    }
}

enum Step<P> {
    Pending(Conversion<P>),
    Running(Running),
    Done,
}

struct Running {
    child: Child,
    lines: MergedLines<BufReader<ChildStdout>, BufReader<ChildStderr>>,
    tracker: ProgressTracker,
    source: PathBuf,
    staging: PathBuf,
    target: PathBuf,
}

impl Running {
    async fn next_event<P>(mut self) -> Option<(AdapterEvent<PathBuf, ConversionError>, Step<P>)> {
        while let Some(line) = self.lines.next_line().await {
            if let Some(percent) = self.tracker.observe(&line) {
                return Some((AdapterEvent::Progress(percent), Step::Running(self)));
            }
        }

        let result = match self.child.wait().await {
            Ok(status) => self.finish(status).await,
            Err(e) => Err(ConversionError::Failed(format!("lost track of ffmpeg: {}", e))),
        };
        Some((AdapterEvent::Finished(result), Step::Done))
    }

    async fn finish(&self, status: ExitStatus) -> Result<PathBuf, ConversionError> {
        if !status.success() {
            remove_quietly(&self.staging).await;
            let reason = self
                .tracker
                .last_error
                .clone()
                .unwrap_or_else(|| format!("ffmpeg exited with {}", status));
            return Err(ConversionError::Failed(reason));
        }

        if !tokio::fs::try_exists(&self.staging).await.unwrap_or(false) {
            return Err(ConversionError::MissingOutput);
        }
        // Replaces the source in place when it already has the target name.
        if let Err(e) = tokio::fs::rename(&self.staging, &self.target).await {
            remove_quietly(&self.staging).await;
            return Err(ConversionError::Failed(format!("could not move converted file: {}", e)));
        }
        if self.source != self.target {
            remove_quietly(&self.source).await;
        }
        Ok(self.target.clone())
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), "Could not remove file: {}", e);
        }
    }
}

/// Reads `ffmpeg -progress` key/value output. Progress stays below 100 until
/// ffmpeg reports `progress=end`.
#[derive(Debug)]
struct ProgressTracker {
    duration_us: Option<u64>,
    last_percent: Option<u8>,
    last_error: Option<String>,
}

impl ProgressTracker {
    fn new(duration_us: Option<u64>) -> Self {
        Self {
            duration_us,
            last_percent: None,
            last_error: None,
        }
    }

    fn observe(&mut self, line: &str) -> Option<u8> {
        let line = line.trim();
        let Some((key, value)) = line.split_once('=') else {
            if !line.is_empty() {
                self.last_error = Some(line.to_string());
            }
            return None;
        };

        let percent = match key {
            // out_time_ms is in microseconds as well
            "out_time_us" | "out_time_ms" => {
                let elapsed: u64 = value.parse().ok()?;
                let total = self.duration_us.filter(|d| *d > 0)?;
                (elapsed.saturating_mul(100) / total).min(99) as u8
            }
            "progress" if value == "end" => 100,
            _ => return None,
        };

        if self.last_percent.is_some_and(|last| percent <= last) {
            return None;
        }
        self.last_percent = Some(percent);
        Some(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::local::cmd::test_helpers::{mock_output, write_script};
    use crate::adapters::local::cmd::MockProbeRunner;
    use std::io;
    use tempfile::tempdir;

    #[test]
    fn test_parse_codec() {
        assert_eq!(parse_codec("h264\n"), Some("h264".to_string()));
        assert_eq!(parse_codec("\nvp9,\n"), Some("vp9".to_string()));
        assert_eq!(parse_codec(""), None);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_us("12.5\n"), Some(12_500_000));
        assert_eq!(parse_duration_us("N/A"), None);
        assert_eq!(parse_duration_us("0"), None);
    }

    #[test]
    fn test_progress_tracker() {
        let mut tracker = ProgressTracker::new(Some(10_000_000));
        let lines = [
            "frame=10",
            "out_time_us=1000000",
            "out_time_ms=1000000",
            "out_time_us=N/A",
            "out_time_us=5500000",
            "progress=continue",
            "out_time_us=10000000",
            "progress=end",
        ];
        let seen: Vec<u8> = lines.iter().filter_map(|l| tracker.observe(l)).collect();
        assert_eq!(seen, vec![10, 55, 99, 100]);
        assert!(tracker.last_error.is_none());
    }

    #[test]
    fn test_progress_tracker_without_duration() {
        let mut tracker = ProgressTracker::new(None);
        assert_eq!(tracker.observe("out_time_us=5000000"), None);
        assert_eq!(tracker.observe("Error while decoding stream #0:0"), None);
        assert_eq!(tracker.observe("progress=end"), Some(100));
        assert_eq!(tracker.last_error.as_deref(), Some("Error while decoding stream #0:0"));
    }

    #[tokio::test]
    async fn test_probe_video_codec() {
        let mut runner = MockProbeRunner::new();
        runner
            .expect_run_ffprobe_codec()
            .withf(|path| path == Path::new("/dl/a.webm"))
            .times(1)
            .returning(|_| Ok(mock_output("vp9\n", "", true)));
        let transcoder = FfmpegTranscoder::with_runner(runner, "ffmpeg");

        assert_eq!(
            transcoder.probe_video_codec(Path::new("/dl/a.webm")).await,
            Some("vp9".to_string())
        );
    }

    #[tokio::test]
    async fn test_probe_video_codec_unknown() {
        let mut runner = MockProbeRunner::new();
        runner
            .expect_run_ffprobe_codec()
            .times(1)
            .returning(|_| Ok(mock_output("", "Invalid data found", false)));
        let transcoder = FfmpegTranscoder::with_runner(runner, "ffmpeg");
        assert_eq!(transcoder.probe_video_codec(Path::new("/dl/a.bin")).await, None);

        let mut runner = MockProbeRunner::new();
        runner
            .expect_run_ffprobe_codec()
            .times(1)
            .returning(|_| Err(io::Error::new(io::ErrorKind::NotFound, "ffprobe not found")));
        let transcoder = FfmpegTranscoder::with_runner(runner, "ffmpeg");
        assert_eq!(transcoder.probe_video_codec(Path::new("/dl/a.webm")).await, None);
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_keeps_source() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.webm");
        tokio::fs::write(&source, b"webm").await.unwrap();

        let mut runner = MockProbeRunner::new();
        runner
            .expect_run_ffprobe_duration()
            .times(1)
            .returning(|_| Ok(mock_output("3.0\n", "", true)));
        let transcoder = FfmpegTranscoder::with_runner(runner, "/nonexistent/ffmpeg");

        let events: Vec<_> = transcoder.transcode(&source).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AdapterEvent::Finished(Err(ConversionError::Spawn(_)))));
        assert!(source.exists());
        assert!(!dir.path().join("clip_converted.mp4").exists());
    }

    fn three_second_probe() -> MockProbeRunner {
        let mut runner = MockProbeRunner::new();
        runner
            .expect_run_ffprobe_duration()
            .times(1)
            .returning(|_| Ok(mock_output("3.0\n", "", true)));
        runner
    }

    // The staging file is ffmpeg's last argument.
    const WRITE_OUTPUT: &str = r#"for out; do :; done
echo converted > "$out""#;

    #[tokio::test]
    async fn test_failed_conversion_removes_partial_output() {
        let bin = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.webm");
        tokio::fs::write(&source, b"webm").await.unwrap();
        let ffmpeg = write_script(
            bin.path(),
            "ffmpeg",
            &format!(
                "{}\necho out_time_us=1500000\necho 'Conversion failed!' >&2\nexit 1",
                WRITE_OUTPUT
            ),
        );
        let transcoder = FfmpegTranscoder::with_runner(three_second_probe(), ffmpeg);

        let events: Vec<_> = transcoder.transcode(&source).collect().await;
        assert_eq!(
            events,
            vec![
                AdapterEvent::Progress(50),
                AdapterEvent::Finished(Err(ConversionError::Failed(
                    "Conversion failed!".to_string()
                ))),
            ]
        );
        assert!(source.exists());
        assert!(!dir.path().join("clip_converted.mp4").exists());
        assert!(!dir.path().join("clip.mp4").exists());
    }

    #[tokio::test]
    async fn test_successful_conversion_replaces_source() {
        let bin = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.webm");
        tokio::fs::write(&source, b"webm").await.unwrap();
        let ffmpeg = write_script(
            bin.path(),
            "ffmpeg",
            &format!("{}\necho out_time_us=1500000\necho progress=end", WRITE_OUTPUT),
        );
        let transcoder = FfmpegTranscoder::with_runner(three_second_probe(), ffmpeg);

        let target = dir.path().join("clip.mp4");
        let events: Vec<_> = transcoder.transcode(&source).collect().await;
        assert_eq!(
            events,
            vec![
                AdapterEvent::Progress(50),
                AdapterEvent::Progress(100),
                AdapterEvent::Finished(Ok(target.clone())),
            ]
        );
        assert!(!source.exists());
        assert!(!dir.path().join("clip_converted.mp4").exists());
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "converted\n");
    }

    #[tokio::test]
    async fn test_mp4_source_is_replaced_in_place() {
        let bin = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        tokio::fs::write(&source, b"hevc").await.unwrap();
        let ffmpeg = write_script(
            bin.path(),
            "ffmpeg",
            &format!("{}\necho progress=end", WRITE_OUTPUT),
        );
        let transcoder = FfmpegTranscoder::with_runner(three_second_probe(), ffmpeg);

        let events: Vec<_> = transcoder.transcode(&source).collect().await;
        assert_eq!(events.last(), Some(&AdapterEvent::Finished(Ok(source.clone()))));
        assert_eq!(std::fs::read_to_string(&source).unwrap(), "converted\n");
        assert!(!dir.path().join("clip_converted.mp4").exists());
    }

    #[tokio::test]
    async fn test_clean_exit_without_output_keeps_source() {
        let bin = tempdir().unwrap();
        let dir = tempdir().unwrap();
        let source = dir.path().join("clip.webm");
        tokio::fs::write(&source, b"webm").await.unwrap();
        let ffmpeg = write_script(bin.path(), "ffmpeg", "exit 0");
        let transcoder = FfmpegTranscoder::with_runner(three_second_probe(), ffmpeg);

        let events: Vec<_> = transcoder.transcode(&source).collect().await;
        assert_eq!(events, vec![AdapterEvent::Finished(Err(ConversionError::MissingOutput))]);
        assert!(source.exists());
    }
}
