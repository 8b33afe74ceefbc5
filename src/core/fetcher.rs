//! Capability interface over the external media-fetching tool
//!
//! The worker only talks to `MediaFetcher`, so the orchestration control flow
//! can be exercised with a scripted fake instead of real network calls.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use crate::core::models::AppResult;
use crate::core::options::FetchOptions;

/// Metadata resolved for a URL before downloading
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MediaMetadata {
    pub title: String,
    pub thumbnail_url: String,
    /// Non-empty for playlist and channel URLs
    pub entries: Vec<PlaylistEntry>,
}

impl MediaMetadata {
    pub fn is_playlist(&self) -> bool {
        !self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaylistEntry {
    pub url: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Downloading,
    Finished,
}

/// One progress report from the fetch tool
#[derive(Debug, Clone, PartialEq)]
pub struct FetchProgress {
    pub status: FetchStatus,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds
    pub eta: Option<u64>,
    pub filename: Option<String>,
}

impl FetchProgress {
    pub fn downloading(downloaded_bytes: u64, total_bytes: Option<u64>) -> Self {
        Self {
            status: FetchStatus::Downloading,
            downloaded_bytes,
            total_bytes,
            total_bytes_estimate: None,
            speed: None,
            eta: None,
            filename: None,
        }
    }

    pub fn finished(filename: impl Into<String>) -> Self {
        Self {
            status: FetchStatus::Finished,
            downloaded_bytes: 0,
            total_bytes: None,
            total_bytes_estimate: None,
            speed: None,
            eta: None,
            filename: Some(filename.into()),
        }
    }
}

/// What the worker asks the fetch tool to do for one task
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub options: FetchOptions,
}

pub trait MediaFetcher: Send + Sync {
    /// Resolve title, thumbnail and playlist entries without downloading.
    fn resolve_metadata(&self, url: &str) -> AppResult<MediaMetadata>;

    /// Download (and post-process) `request`, reporting progress as it goes.
    ///
    /// Implementations should return `AppError::Aborted` promptly once `abort`
    /// becomes true. Returns the final output path.
    fn download_with_progress(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(&FetchProgress),
        abort: &AtomicBool,
    ) -> AppResult<PathBuf>;
}
