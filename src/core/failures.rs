//! Failure Ledger - failed tasks kept for one replay at the next startup
//!
//! `failed.txt` holds one pipe-delimited line per failed attempt:
//! `url|mode|quality|output_dir[|attempt=N]`. A line without the attempt field
//! counts as the first failure. The `attempt=` marker keeps the counter apart
//! from output directories that contain `|` themselves.

use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::models::{AppResult, DownloadMode, DownloadTask};

pub const FAILURE_FILE: &str = "failed.txt";

const ATTEMPT_MARKER: &str = "attempt=";

#[derive(Debug, Clone, PartialEq)]
pub struct FailureEntry {
    pub url: String,
    pub mode: DownloadMode,
    pub quality: String,
    pub output_dir: PathBuf,
    /// Failed attempts so far, including the one that wrote this line
    pub attempt: u32,
}

impl FailureEntry {
    pub fn from_task(task: &DownloadTask) -> Self {
        Self {
            url: task.url.clone(),
            mode: task.mode,
            quality: task.quality.clone(),
            output_dir: task.output_dir.clone(),
            attempt: task.replay_attempt + 1,
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}{}",
            self.url,
            self.mode.as_str(),
            self.quality,
            self.output_dir.to_string_lossy(),
            ATTEMPT_MARKER,
            self.attempt
        )
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.trim().split('|').collect();
        if parts.len() < 4 || parts[0].is_empty() {
            return None;
        }

        // Only a marked trailing field is the attempt counter; everything
        // else belongs to the output directory.
        let last = parts[parts.len() - 1];
        let (dir_parts, attempt) = match last
            .strip_prefix(ATTEMPT_MARKER)
            .and_then(|n| n.parse::<u32>().ok())
        {
            Some(attempt) if parts.len() > 4 => (&parts[3..parts.len() - 1], attempt.max(1)),
            _ => (&parts[3..], 1),
        };

        Some(Self {
            url: parts[0].to_string(),
            mode: DownloadMode::parse_lenient(parts[1]),
            quality: parts[2].to_string(),
            output_dir: PathBuf::from(dir_parts.join("|")),
            attempt,
        })
    }
}

/// Shared by every worker; appends are serialized by an internal lock
pub struct FailureLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FailureLedger {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join(FAILURE_FILE),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &FailureEntry) -> AppResult<()> {
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.to_line())?;
        Ok(())
    }

    /// Current entries without consuming them
    pub fn peek(&self) -> AppResult<Vec<FailureEntry>> {
        let _guard = self.write_lock.lock();
        self.read_entries()
    }

    /// Read every entry and delete the ledger file.
    pub fn take_all(&self) -> AppResult<Vec<FailureEntry>> {
        let _guard = self.write_lock.lock();
        let entries = self.read_entries()?;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
            info!(
                "Consumed {} failure ledger entries from {:?}",
                entries.len(),
                self.path
            );
        }
        Ok(entries)
    }

    fn read_entries(&self) -> AppResult<Vec<FailureEntry>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| {
                let parsed = FailureEntry::parse_line(line);
                if parsed.is_none() {
                    warn!("Skipping malformed failure ledger line: {}", line);
                }
                parsed
            })
            .collect())
    }
}
