//! Core data models for the download orchestration core

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Download mode enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DownloadMode {
    Audio,

    Video,
}

impl DownloadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Parse a persisted / user supplied mode. Anything that is not "video" is audio.
    pub fn parse_lenient(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("video") {
            Self::Video
        } else {
            Self::Audio
        }
    }

    /// Container / codec used when the caller does not pick one
    pub fn default_format(&self) -> &'static str {
        match self {
            Self::Audio => "mp3",
            Self::Video => "mp4",
        }
    }
}

impl fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality presets understood by the video format selector
pub const QUALITY_PRESETS: [&str; 5] = ["best", "1080p", "720p", "480p", "360p"];

pub fn is_quality_preset(quality: &str) -> bool {
    let quality = quality.trim().to_ascii_lowercase();
    QUALITY_PRESETS.contains(&quality.as_str())
}

/// Task status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,

    Downloading,

    Completed,

    Failed,

    /// Resolved by the SKIP duplicate policy without downloading
    Skipped,

    /// Never stored; reported for queued tasks while the pause gate is closed
    Paused,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// Only `Queued -> Downloading -> {Completed | Failed | Skipped}` is legal.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Downloading)
                | (Self::Downloading, Self::Completed)
                | (Self::Downloading, Self::Failed)
                | (Self::Downloading, Self::Skipped)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Behaviour when the expected output file already exists
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Ask,

    Skip,

    Replace,
}

impl DuplicatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ask => "ask",
            Self::Skip => "skip",
            Self::Replace => "replace",
        }
    }
}

impl std::str::FromStr for DuplicatePolicy {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ask" => Ok(Self::Ask),
            "skip" => Ok(Self::Skip),
            "replace" => Ok(Self::Replace),
            other => Err(AppError::Config(format!(
                "unknown duplicate policy '{}', expected ask|skip|replace",
                other
            ))),
        }
    }
}

/// One queued download request and its mutable progress/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub id: String,

    pub url: String,

    pub mode: DownloadMode,

    pub quality: String,

    pub output_format: String,

    pub output_dir: PathBuf,

    pub speed_limit_kbps: u64,

    /// Policy snapshot taken at enqueue time
    pub duplicate_policy: DuplicatePolicy,

    pub status: TaskStatus,

    pub progress_percent: f64,

    pub title: String,

    pub thumbnail_url: String,

    pub error_message: Option<String>,

    pub output_path: Option<PathBuf>,

    /// Number of earlier failed attempts replayed from the failure ledger
    pub replay_attempt: u32,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Parameters for a new task, as supplied by the UI collaborator
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub url: String,
    pub mode: DownloadMode,
    pub quality: String,
    pub output_format: String,
    pub speed_limit_kbps: u64,
}

impl TaskRequest {
    pub fn new(url: impl Into<String>, mode: DownloadMode) -> Self {
        Self {
            url: url.into(),
            mode,
            quality: "best".to_string(),
            output_format: mode.default_format().to_string(),
            speed_limit_kbps: 0,
        }
    }

    pub fn quality(mut self, quality: impl Into<String>) -> Self {
        self.quality = quality.into();
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.output_format = format.into();
        self
    }

    pub fn speed_limit(mut self, kbps: u64) -> Self {
        self.speed_limit_kbps = kbps;
        self
    }
}

impl DownloadTask {
    pub fn new(request: TaskRequest, output_dir: PathBuf, policy: DuplicatePolicy) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: request.url.trim().to_string(),
            mode: request.mode,
            quality: request.quality,
            output_format: request.output_format,
            output_dir,
            speed_limit_kbps: request.speed_limit_kbps,
            duplicate_policy: policy,
            status: TaskStatus::Queued,
            progress_percent: 0.0,
            title: String::new(),
            thumbnail_url: String::new(),
            error_message: None,
            output_path: None,
            replay_attempt: 0,
            created_at: chrono::Utc::now(),
        }
    }

    /// Child task for one playlist/channel entry, inheriting the parent's settings
    pub fn child(&self, url: &str, title: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            url: url.to_string(),
            title: title.to_string(),
            thumbnail_url: String::new(),
            status: TaskStatus::Queued,
            progress_percent: 0.0,
            error_message: None,
            output_path: None,
            created_at: chrono::Utc::now(),
            ..self.clone()
        }
    }

    pub fn set_status(&mut self, next: TaskStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Title if known, otherwise the source URL
    pub fn display_name(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }
}

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("External tool is missing: {tool}")]
    ToolMissing { tool: String },

    #[error("Download aborted")]
    Aborted,

    #[error("Illegal status transition {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("System error: {0}")]
    System(String),
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
