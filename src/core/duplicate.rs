//! Duplicate Resolver - what to do when the expected output file already exists

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::models::{DownloadMode, DownloadTask, DuplicatePolicy};
use crate::core::options::{audio_codec, video_container};
use crate::utils::sanitize_filename;

/// Answer from the UI collaborator for the ASK policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateDecision {
    Skip,
    Replace,
    /// Download anyway and let the write overwrite the file
    Overwrite,
}

/// UI hook consulted under the ASK policy. May block the calling worker
/// until the user decides.
pub trait DuplicatePrompt: Send + Sync {
    fn decide(&self, task: &DownloadTask, existing: &Path) -> DuplicateDecision;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateOutcome {
    /// No conflict, or the policy lets the download overwrite
    Proceed,
    /// Existing file was deleted
    Replaced,
    Skip { reason: String },
}

/// `<output_dir>/<title>.<ext>` as the fetch tool would name the final file
pub fn expected_output_path(task: &DownloadTask) -> Option<PathBuf> {
    if task.title.trim().is_empty() {
        return None;
    }
    let ext = match task.mode {
        DownloadMode::Audio => audio_codec(&task.output_format),
        DownloadMode::Video => video_container(&task.output_format),
    };
    Some(
        task.output_dir
            .join(format!("{}.{}", sanitize_filename(&task.title), ext)),
    )
}

fn existing_non_empty(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

pub fn resolve(task: &DownloadTask, prompt: Option<&dyn DuplicatePrompt>) -> DuplicateOutcome {
    let Some(path) = expected_output_path(task) else {
        return DuplicateOutcome::Proceed;
    };
    if !existing_non_empty(&path) {
        return DuplicateOutcome::Proceed;
    }

    let decision = match task.duplicate_policy {
        DuplicatePolicy::Skip => DuplicateDecision::Skip,
        DuplicatePolicy::Replace => DuplicateDecision::Replace,
        DuplicatePolicy::Ask => prompt
            .map(|p| p.decide(task, &path))
            .unwrap_or(DuplicateDecision::Overwrite),
    };
    debug!("Existing file {:?} for task {}: {:?}", path, task.id, decision);

    match decision {
        DuplicateDecision::Skip => DuplicateOutcome::Skip {
            reason: format!("File exists: {}", task.title),
        },
        DuplicateDecision::Replace => match std::fs::remove_file(&path) {
            Ok(()) => DuplicateOutcome::Replaced,
            Err(e) => {
                // The download overwrites it anyway.
                warn!("Failed to remove existing file {:?}: {}", path, e);
                DuplicateOutcome::Proceed
            }
        },
        DuplicateDecision::Overwrite => DuplicateOutcome::Proceed,
    }
}
