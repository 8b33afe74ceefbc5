//! Download Manager - orchestrates the task queue, the pause gate and the
//! worker pool.
//!
//! The manager lives on the coordinating (UI) thread. Workers are plain OS
//! threads; everything they report flows back through the event channel, and
//! the latest snapshot of every task is kept in a concurrent registry.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::core::config::{FetcherConfig, MAX_WORKERS, MIN_WORKERS};
use crate::core::duplicate::DuplicatePrompt;
use crate::core::events::{DownloadEvent, EventEmitter, EventSender};
use crate::core::failures::FailureLedger;
use crate::core::fetcher::MediaFetcher;
use crate::core::history::{HistoryEntry, HistoryLedger};
use crate::core::links::extract_youtube_urls;
use crate::core::models::{
    is_quality_preset, AppError, AppResult, DownloadMode, DownloadTask, DuplicatePolicy,
    TaskRequest, TaskStatus,
};
use crate::core::pause_gate::{PauseGate, ShutdownSignal};
use crate::core::queue::{TaskQueue, DEFAULT_DEQUEUE_TIMEOUT};
use crate::core::worker::{self, WorkerShared};
use crate::utils::is_valid_video_url;

/// How long aborted stragglers get to unwind before they are detached
const ABORT_GRACE: Duration = Duration::from_secs(2);
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Construction parameters for [`DownloadManager`]
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub output_dir: PathBuf,
    /// Directory holding history.json and failed.txt
    pub state_dir: PathBuf,
    pub worker_count: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub dequeue_timeout: Duration,
    /// Bounded wait for workers to exit on `stop()`
    pub shutdown_timeout: Duration,
    pub max_replay_attempts: u32,
    pub fetcher: FetcherConfig,
}

impl ManagerSettings {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            state_dir: Self::default_state_dir(&output_dir),
            output_dir,
            worker_count: 3,
            duplicate_policy: DuplicatePolicy::Ask,
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
            shutdown_timeout: Duration::from_secs(5),
            max_replay_attempts: 3,
            fetcher: FetcherConfig::default(),
        }
    }

    /// Ledgers sit next to the output directory, in its parent.
    pub fn default_state_dir(output_dir: &Path) -> PathBuf {
        output_dir
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

struct WorkerHandle {
    id: usize,
    thread: JoinHandle<()>,
}

pub struct DownloadManager {
    shared: Arc<WorkerShared>,

    /// Bound to tasks at enqueue time
    output_dir: PathBuf,
    duplicate_policy: DuplicatePolicy,

    /// Applied by the next `start()`
    worker_count: usize,
    shutdown_timeout: Duration,

    /// Stop/abort flags of the current worker generation
    shutdown: Arc<ShutdownSignal>,
    workers: Vec<WorkerHandle>,
    next_worker_id: usize,
}

impl DownloadManager {
    /// Create the manager and replay the failure ledger left by the previous run.
    pub fn new(
        settings: ManagerSettings,
        fetcher: Arc<dyn MediaFetcher>,
        events: EventSender,
    ) -> AppResult<Self> {
        std::fs::create_dir_all(&settings.output_dir)?;
        std::fs::create_dir_all(&settings.state_dir)?;

        let shared = Arc::new(WorkerShared {
            queue: TaskQueue::new(),
            gate: PauseGate::new(),
            fetcher,
            events: EventEmitter::new(events),
            history: HistoryLedger::new(&settings.state_dir),
            failures: FailureLedger::new(&settings.state_dir),
            registry: DashMap::new(),
            prompt: RwLock::new(None),
            fetcher_config: settings.fetcher.clone(),
            dequeue_timeout: settings.dequeue_timeout,
        });

        let manager = Self {
            shared,
            output_dir: settings.output_dir,
            duplicate_policy: settings.duplicate_policy,
            worker_count: settings.worker_count.clamp(MIN_WORKERS, MAX_WORKERS),
            shutdown_timeout: settings.shutdown_timeout,
            shutdown: Arc::new(ShutdownSignal::new()),
            workers: Vec::new(),
            next_worker_id: 0,
        };

        let replayed = manager.replay_failures(settings.max_replay_attempts);
        info!(
            "🚀 Download manager ready: {} workers, output {:?}, {} failed tasks replayed",
            manager.worker_count, manager.output_dir, replayed
        );
        Ok(manager)
    }

    /// Re-enqueue every entry of the failure ledger once and delete the file.
    fn replay_failures(&self, max_attempts: u32) -> usize {
        let entries = match self.shared.failures.take_all() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read failure ledger: {}", e);
                return 0;
            }
        };

        let mut replayed = 0;
        for entry in entries {
            if entry.attempt >= max_attempts {
                self.shared.events.log(format!(
                    "Giving up on {} after {} failed attempts",
                    entry.url, entry.attempt
                ));
                continue;
            }

            let request = TaskRequest::new(entry.url, entry.mode).quality(entry.quality);
            let mut task = DownloadTask::new(request, entry.output_dir, self.duplicate_policy);
            task.replay_attempt = entry.attempt;
            self.push(task);
            replayed += 1;
        }

        if replayed > 0 {
            self.shared
                .events
                .log(format!("Retrying {} previously failed downloads", replayed));
        }
        replayed
    }

    fn push(&self, task: DownloadTask) {
        debug!("Queued {} ({})", task.id, task.url);
        self.shared.registry.insert(task.id.clone(), task.clone());
        self.shared.queue.enqueue(task);
    }

    /// Queue one download bound to the current output directory and duplicate
    /// policy. Does not start workers.
    pub fn enqueue(&self, mut request: TaskRequest) -> AppResult<String> {
        if !is_valid_video_url(&request.url) {
            return Err(AppError::InvalidUrl(request.url));
        }

        // The video selector only knows the presets; anything else downloads best.
        if request.mode == DownloadMode::Video && !is_quality_preset(&request.quality) {
            self.shared.events.log(format!(
                "Unknown quality '{}' for {}, using best",
                request.quality, request.url
            ));
            request.quality = "best".to_string();
        }

        let task = DownloadTask::new(request, self.output_dir.clone(), self.duplicate_policy);
        let task_id = task.id.clone();
        self.push(task);
        Ok(task_id)
    }

    /// Queue every URL with the settings of `template`. Invalid URLs are
    /// reported through the event log and left out.
    pub fn enqueue_many<I, S>(&self, urls: I, template: &TaskRequest) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut task_ids = Vec::new();
        for url in urls {
            let request = TaskRequest {
                url: url.into(),
                ..template.clone()
            };
            match self.enqueue(request) {
                Ok(task_id) => task_ids.push(task_id),
                Err(e) => self.shared.events.log(format!("Not queued: {}", e)),
            }
        }
        info!("📋 Added {} tasks in batch", task_ids.len());
        task_ids
    }

    /// Queue every YouTube link found in free-form text.
    pub fn enqueue_text(&self, text: &str, template: &TaskRequest) -> Vec<String> {
        let urls = extract_youtube_urls(text);
        if urls.is_empty() {
            self.shared.events.log("No YouTube links found in input");
        }
        self.enqueue_many(urls, template)
    }

    /// Ensure exactly `worker_count` workers run and open the pause gate.
    /// Calling it again while workers run spawns nothing new.
    pub fn start(&mut self) {
        self.workers.retain(|worker| !worker.thread.is_finished());

        let missing = self.worker_count.saturating_sub(self.workers.len());
        for _ in 0..missing {
            let id = self.next_worker_id;
            self.next_worker_id += 1;

            let shared = Arc::clone(&self.shared);
            let shutdown = Arc::clone(&self.shutdown);
            match thread::Builder::new()
                .name(format!("download-worker-{}", id))
                .spawn(move || worker::run(id, shared, shutdown))
            {
                Ok(thread) => self.workers.push(WorkerHandle { id, thread }),
                Err(e) => error!("Failed to spawn worker {}: {}", id, e),
            }
        }

        self.shared.gate.resume();
        if missing > 0 {
            info!("Started {} workers ({} running)", missing, self.workers.len());
        }
    }

    /// Stop claiming new tasks. In-flight downloads keep running.
    pub fn pause(&self) {
        self.shared.gate.pause();
        self.shared.events.log("Downloads paused");
    }

    pub fn resume(&self) {
        self.shared.gate.resume();
        self.shared.events.log("Downloads resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.shared.gate.is_paused()
    }

    /// Stop the pool. Unclaimed tasks are discarded; in-flight tasks get
    /// `shutdown_timeout` to finish before their transfers are aborted.
    pub fn stop(&mut self) {
        info!("🛑 Stopping download manager");
        self.shutdown.request_stop();

        let dropped = self.shared.queue.drain();
        for task in &dropped {
            self.shared.registry.remove(&task.id);
        }
        if !dropped.is_empty() {
            self.shared
                .events
                .log(format!("Discarded {} queued downloads", dropped.len()));
        }

        self.shared.gate.wake_all();

        let deadline = Instant::now() + self.shutdown_timeout;
        let mut stragglers = Vec::new();
        for worker in self.workers.drain(..) {
            if wait_until_finished(&worker.thread, deadline) {
                join_worker(worker);
            } else {
                stragglers.push(worker);
            }
        }

        if !stragglers.is_empty() {
            warn!(
                "{} workers still busy after {:?}, aborting their transfers",
                stragglers.len(),
                self.shutdown_timeout
            );
            self.shutdown.request_abort();

            let grace = Instant::now() + ABORT_GRACE;
            for worker in stragglers {
                if wait_until_finished(&worker.thread, grace) {
                    join_worker(worker);
                } else {
                    warn!("Detaching unresponsive worker {}", worker.id);
                }
            }
        }

        // Workers spawned by a later start() get fresh flags.
        self.shutdown = Arc::new(ShutdownSignal::new());
        info!("✅ Download manager stopped");
    }

    /// Clamped to 1..=5. Takes effect on the next `start()`; running workers
    /// are never shrunk.
    pub fn set_worker_count(&mut self, count: usize) {
        self.worker_count = count.clamp(MIN_WORKERS, MAX_WORKERS);
        debug!("Worker count set to {}", self.worker_count);
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Output directory for tasks enqueued from now on.
    pub fn set_output_dir(&mut self, path: impl Into<PathBuf>) -> AppResult<()> {
        let path = path.into();
        std::fs::create_dir_all(&path)?;
        info!("Output directory set to {:?}", path);
        self.output_dir = path;
        Ok(())
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Policy for tasks enqueued from now on; claimed tasks keep theirs.
    pub fn set_duplicate_policy(&mut self, policy: DuplicatePolicy) {
        self.duplicate_policy = policy;
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        self.duplicate_policy
    }

    /// UI hook consulted by workers under the ASK policy
    pub fn set_duplicate_prompt(&self, prompt: Option<Arc<dyn DuplicatePrompt>>) {
        *self.shared.prompt.write() = prompt;
    }

    /// Completed downloads, most recent first.
    pub fn get_history(&self) -> Vec<HistoryEntry> {
        self.shared.history.load()
    }

    pub fn queue_size(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn running_workers(&self) -> usize {
        self.workers
            .iter()
            .filter(|worker| !worker.thread.is_finished())
            .count()
    }

    /// Latest snapshot of a task. Queued tasks report `Paused` while the gate
    /// is closed.
    pub fn task(&self, task_id: &str) -> Option<DownloadTask> {
        let task = self
            .shared
            .registry
            .get(task_id)
            .map(|entry| entry.value().clone())?;
        Some(self.reported(task))
    }

    /// Every known task, oldest first.
    pub fn tasks(&self) -> Vec<DownloadTask> {
        let snapshots: Vec<DownloadTask> = self
            .shared
            .registry
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        let mut tasks: Vec<DownloadTask> =
            snapshots.into_iter().map(|task| self.reported(task)).collect();
        tasks.sort_by_key(|task| task.created_at);
        tasks
    }

    fn reported(&self, mut task: DownloadTask) -> DownloadTask {
        if task.status == TaskStatus::Queued && self.shared.gate.is_paused() {
            task.status = TaskStatus::Paused;
        }
        task
    }

    /// Resolve metadata on a background thread and report it as a
    /// `MetadataFetched` or `MetadataFailed` event.
    pub fn fetch_metadata(&self, url: &str) {
        let url = url.trim().to_string();
        let events = self.shared.events.clone();
        if !is_valid_video_url(&url) {
            events.emit(DownloadEvent::MetadataFailed {
                error: AppError::InvalidUrl(url.clone()).to_string(),
                url,
            });
            return;
        }

        let fetcher = Arc::clone(&self.shared.fetcher);
        let spawned = thread::Builder::new()
            .name("metadata-lookup".to_string())
            .spawn(move || match fetcher.resolve_metadata(&url) {
                Ok(metadata) => events.emit(DownloadEvent::MetadataFetched { url, metadata }),
                Err(e) => events.emit(DownloadEvent::MetadataFailed {
                    url,
                    error: e.to_string(),
                }),
            });
        if let Err(e) = spawned {
            error!("Failed to spawn metadata lookup: {}", e);
        }
    }

    /// Block until every queued and in-flight task reached a terminal state.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.queue.wait_idle(timeout)
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}

fn wait_until_finished(thread: &JoinHandle<()>, deadline: Instant) -> bool {
    loop {
        if thread.is_finished() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
}

fn join_worker(worker: WorkerHandle) {
    if worker.thread.join().is_err() {
        error!("Worker {} panicked", worker.id);
    }
}
