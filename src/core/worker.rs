//! Worker - one OS thread that claims tasks from the queue and drives them
//! through metadata resolution, the duplicate check and the download.
//!
//! Per-task errors are converted into a `Failed` event plus a failure ledger
//! line; nothing escapes the loop.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::core::config::FetcherConfig;
use crate::core::duplicate::{self, DuplicateOutcome, DuplicatePrompt};
use crate::core::events::{DownloadEvent, EventEmitter};
use crate::core::failures::{FailureEntry, FailureLedger};
use crate::core::fetcher::{FetchProgress, FetchRequest, FetchStatus, MediaFetcher, PlaylistEntry};
use crate::core::history::{HistoryEntry, HistoryLedger};
use crate::core::models::{DownloadTask, TaskStatus};
use crate::core::options::build_fetch_options;
use crate::core::pause_gate::{PauseGate, ShutdownSignal};
use crate::core::progress::{status_text, PROCESSING_TEXT};
use crate::core::queue::TaskQueue;

/// State shared by the manager and every worker thread
pub(crate) struct WorkerShared {
    pub queue: TaskQueue,
    pub gate: PauseGate,
    pub fetcher: Arc<dyn MediaFetcher>,
    pub events: EventEmitter,
    pub history: HistoryLedger,
    pub failures: FailureLedger,
    /// Latest snapshot of every known task, keyed by task id
    pub registry: DashMap<String, DownloadTask>,
    pub prompt: RwLock<Option<Arc<dyn DuplicatePrompt>>>,
    pub fetcher_config: FetcherConfig,
    pub dequeue_timeout: Duration,
}

/// Worker thread body. Returns once `shutdown` asks to stop.
pub(crate) fn run(worker_id: usize, shared: Arc<WorkerShared>, shutdown: Arc<ShutdownSignal>) {
    info!("👷 Worker {} started", worker_id);

    loop {
        shared.gate.wait_while_paused(&shutdown);
        if shutdown.is_stopping() {
            break;
        }

        let Some(task) = shared.queue.dequeue_timeout(shared.dequeue_timeout) else {
            continue;
        };

        // A pause raised while this worker sat in dequeue still blocks the claim.
        shared.gate.wait_while_paused(&shutdown);
        if shutdown.is_stopping() {
            debug!("Worker {} discarding {} after stop", worker_id, task.id);
            shared.registry.remove(&task.id);
            shared.queue.task_done();
            break;
        }

        debug!("Worker {} claimed {} ({})", worker_id, task.id, task.url);
        shared.process(task, &shutdown);

        if shared.queue.task_done() == 0 && !shutdown.is_stopping() {
            shared.events.emit(DownloadEvent::QueueDrained);
        }
    }

    info!("Worker {} exited", worker_id);
}

impl WorkerShared {
    fn publish(&self, task: &DownloadTask) {
        self.registry.insert(task.id.clone(), task.clone());
    }

    fn process(&self, task: DownloadTask, shutdown: &ShutdownSignal) {
        self.process_task(task, shutdown, true);
    }

    fn process_task(&self, mut task: DownloadTask, shutdown: &ShutdownSignal, allow_fan_out: bool) {
        if let Err(e) = task.set_status(TaskStatus::Downloading) {
            warn!("Refusing to process task {}: {}", task.id, e);
            return;
        }
        self.publish(&task);

        if task.title.is_empty() {
            match self.fetcher.resolve_metadata(&task.url) {
                Ok(metadata) if metadata.is_playlist() && allow_fan_out => {
                    self.events.log(format!(
                        "Expanding '{}' into {} entries",
                        if metadata.title.is_empty() { &task.url } else { &metadata.title },
                        metadata.entries.len()
                    ));
                    self.fan_out(task, metadata.entries, shutdown);
                    return;
                }
                Ok(metadata) => {
                    task.title = metadata.title;
                    task.thumbnail_url = metadata.thumbnail_url;
                    self.publish(&task);
                }
                Err(e) => {
                    self.fail(task, e.to_string());
                    return;
                }
            }
        }

        if let DuplicateOutcome::Skip { reason } = self.check_duplicate(&task) {
            self.skip(task, reason);
            return;
        }

        self.events.emit(DownloadEvent::Started {
            task_id: task.id.clone(),
            title: task.display_name().to_string(),
            thumbnail_url: task.thumbnail_url.clone(),
        });

        self.download(task, shutdown);
    }

    /// Playlist and channel URLs become one child task per entry, processed
    /// here in order. The parent itself never reaches a terminal state.
    fn fan_out(&self, parent: DownloadTask, entries: Vec<PlaylistEntry>, shutdown: &ShutdownSignal) {
        let total = entries.len();
        for (index, entry) in entries.into_iter().enumerate() {
            self.gate.wait_while_paused(shutdown);
            if shutdown.is_stopping() {
                self.events.log(format!(
                    "Stop requested, abandoning {} remaining playlist entries",
                    total - index
                ));
                break;
            }

            let child = parent.child(&entry.url, entry.title.as_deref().unwrap_or_default());
            debug!("Playlist entry {}/{} -> {}", index + 1, total, child.url);
            self.publish(&child);
            self.process_task(child, shutdown, false);
        }
        self.registry.remove(&parent.id);
    }

    fn check_duplicate(&self, task: &DownloadTask) -> DuplicateOutcome {
        let prompt = self.prompt.read().clone();
        let outcome = duplicate::resolve(task, prompt.as_deref());
        if outcome == DuplicateOutcome::Replaced {
            self.events
                .log(format!("Replacing existing file for {}", task.display_name()));
        }
        outcome
    }

    fn download(&self, mut task: DownloadTask, shutdown: &ShutdownSignal) {
        let request = FetchRequest {
            url: task.url.clone(),
            options: build_fetch_options(&task, &self.fetcher_config),
        };

        let task_id = task.id.clone();
        let mut on_progress = |progress: &FetchProgress| {
            let (percent, text) = match progress.status {
                FetchStatus::Downloading => match progress.percent() {
                    Some(percent) => (
                        percent,
                        status_text(percent, progress.speed, progress.eta),
                    ),
                    None => return,
                },
                FetchStatus::Finished => (100.0, PROCESSING_TEXT.to_string()),
            };
            if let Some(mut snapshot) = self.registry.get_mut(&task_id) {
                snapshot.progress_percent = percent;
            }
            self.events.emit(DownloadEvent::Progress {
                task_id: task_id.clone(),
                percent,
                status_text: text,
            });
        };

        match self
            .fetcher
            .download_with_progress(&request, &mut on_progress, shutdown.abort_flag())
        {
            Ok(output_path) => {
                task.output_path = Some(output_path);
                task.progress_percent = 100.0;
                self.complete(task);
            }
            Err(e) => self.fail(task, e.to_string()),
        }
    }

    fn complete(&self, mut task: DownloadTask) {
        if let Err(e) = task.set_status(TaskStatus::Completed) {
            warn!("{}", e);
        }
        self.publish(&task);

        let output_path = task
            .output_path
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        info!("✅ Download completed: {} -> {}", task.id, output_path);

        self.events.emit(DownloadEvent::Completed {
            task_id: task.id.clone(),
            title: task.display_name().to_string(),
            output_path,
        });

        if let Err(e) = self.history.append(HistoryEntry::completed(&task)) {
            warn!("Failed to record history for {}: {}", task.id, e);
        }
    }

    fn fail(&self, mut task: DownloadTask, message: String) {
        error!("❌ Download failed: {} - {}", task.id, message);
        task.error_message = Some(message.clone());
        if let Err(e) = task.set_status(TaskStatus::Failed) {
            warn!("{}", e);
        }
        self.publish(&task);

        self.events.emit(DownloadEvent::Failed {
            task_id: task.id.clone(),
            title: task.display_name().to_string(),
            error_message: message,
        });

        if let Err(e) = self.failures.append(&FailureEntry::from_task(&task)) {
            warn!("Failed to record failure for {}: {}", task.id, e);
        }
    }

    fn skip(&self, mut task: DownloadTask, reason: String) {
        if let Err(e) = task.set_status(TaskStatus::Skipped) {
            warn!("{}", e);
        }
        self.publish(&task);
        self.events.log(format!("Skipped {}: {}", task.display_name(), reason));
        self.events.emit(DownloadEvent::Skipped {
            task_id: task.id.clone(),
            reason,
        });
    }
}
