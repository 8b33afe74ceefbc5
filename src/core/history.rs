//! History Ledger - bounded, persisted record of completed downloads
//!
//! `history.json` holds a JSON array, newest entry first, capped at
//! [`HISTORY_LIMIT`] entries and rewritten wholesale on every append.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::models::{AppResult, DownloadMode, DownloadTask, TaskStatus};
use crate::utils::atomic_write;

pub const HISTORY_FILE: &str = "history.json";
pub const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub title: String,
    pub url: String,
    pub mode: DownloadMode,
    pub quality: String,
    pub output_path: String,
    pub status: TaskStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl HistoryEntry {
    pub fn completed(task: &DownloadTask) -> Self {
        Self {
            title: task.title.clone(),
            url: task.url.clone(),
            mode: task.mode,
            quality: task.quality.clone(),
            output_path: task
                .output_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            status: TaskStatus::Completed,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Shared by every worker; appends are serialized by an internal lock
pub struct HistoryLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl HistoryLedger {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(HISTORY_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entries newest first. A missing or unreadable file reads as empty.
    pub fn load(&self) -> Vec<HistoryEntry> {
        let _guard = self.write_lock.lock();
        self.read_entries()
    }

    pub fn append(&self, entry: HistoryEntry) -> AppResult<()> {
        let _guard = self.write_lock.lock();

        let mut entries = self.read_entries();
        entries.insert(0, entry);
        entries.truncate(HISTORY_LIMIT);

        let json = serde_json::to_vec_pretty(&entries)?;
        atomic_write(&self.path, &json)?;
        debug!("History now holds {} entries", entries.len());
        Ok(())
    }

    pub fn clear(&self) -> AppResult<()> {
        let _guard = self.write_lock.lock();
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    fn read_entries(&self) -> Vec<HistoryEntry> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Ignoring unreadable history file {:?}: {}", self.path, e);
                Vec::new()
            }
        }
    }
}
