use crate::error::{JobFailure, TransitionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;
use uuid::Uuid;

/// Opaque job identifier, unique for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(format!("dl_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Fetching,
    Converting,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Queued => "queued",
            JobStatus::Fetching => "fetching",
            JobStatus::Converting => "converting",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Requested quality. Anything unrecognised falls back to `Best`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FormatSelector {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
}

impl FormatSelector {
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "1080p" => FormatSelector::P1080,
            "720p" => FormatSelector::P720,
            "480p" => FormatSelector::P480,
            _ => FormatSelector::Best,
        }
    }

    /// Height cap in pixels, `None` for `Best`.
    pub fn max_height(self) -> Option<u32> {
        match self {
            FormatSelector::Best => None,
            FormatSelector::P1080 => Some(1080),
            FormatSelector::P720 => Some(720),
            FormatSelector::P480 => Some(480),
        }
    }
}

/// A URL that passed the allow-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedUrl {
    url: Url,
    host: String,
}

impl AcceptedUrl {
    pub(crate) fn new(url: Url, host: String) -> Self {
        Self { url, host }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Normalised host (lowercase, no leading `www.`).
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for AcceptedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Immutable inputs captured when a job is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub url: AcceptedUrl,
    pub format: FormatSelector,
    pub audio_only: bool,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub request: DownloadRequest,
    pub status: JobStatus,
    pub progress: u8,
    pub output_path: Option<PathBuf>,
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when the output file was deleted from the store after completion.
    pub output_released: bool,
}

impl Job {
    pub fn new(request: DownloadRequest) -> Self {
        Self {
            id: JobId::generate(),
            request,
            status: JobStatus::Queued,
            progress: 0,
            output_path: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
            output_released: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, allowed: &[JobStatus], to: JobStatus) -> Result<(), TransitionError> {
        if !allowed.contains(&self.status) {
            return Err(TransitionError {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn begin_fetching(&mut self) -> Result<(), TransitionError> {
        self.transition(&[JobStatus::Queued], JobStatus::Fetching)?;
        self.progress = 0;
        Ok(())
    }

    /// Conversion runs on its own 0-100 scale.
    pub fn begin_converting(&mut self) -> Result<(), TransitionError> {
        self.transition(&[JobStatus::Fetching], JobStatus::Converting)?;
        self.progress = 0;
        Ok(())
    }

    /// Records a progress sample for the active phase. Samples lower than the
    /// current value are ignored; returns whether the value changed.
    pub fn report_progress(&mut self, percent: u8) -> bool {
        if !matches!(self.status, JobStatus::Fetching | JobStatus::Converting) {
            return false;
        }
        let percent = percent.min(100);
        if percent > self.progress {
            self.progress = percent;
            true
        } else {
            false
        }
    }

    pub fn complete(&mut self, output_path: PathBuf) -> Result<(), TransitionError> {
        self.transition(
            &[JobStatus::Fetching, JobStatus::Converting],
            JobStatus::Completed,
        )?;
        self.progress = 100;
        self.output_path = Some(output_path);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// A job still `queued` may fail too: that only happens when its task dies
    /// before the fetch starts.
    pub fn fail(&mut self, failure: JobFailure) -> Result<(), TransitionError> {
        self.transition(
            &[JobStatus::Queued, JobStatus::Fetching, JobStatus::Converting],
            JobStatus::Failed,
        )?;
        self.error = Some(failure);
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn output_filename(&self) -> Option<&str> {
        self.output_path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
    }

    pub fn output_available(&self) -> bool {
        self.status == JobStatus::Completed && self.output_path.is_some() && !self.output_released
    }

    pub fn view(&self) -> JobView {
        let output_available = self.output_available();
        JobView {
            id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            output_available,
            filename: if output_available {
                self.output_filename().map(str::to_owned)
            } else {
                None
            },
            error: self.error.as_ref().map(ToString::to_string),
            error_kind: self.error.as_ref().map(JobFailure::kind),
            created_at: self.created_at,
        }
    }
}

/// Read-only snapshot handed to polling clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub output_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    pub created_at: DateTime<Utc>,
}
