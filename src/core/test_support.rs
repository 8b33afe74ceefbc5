//! Test helpers: a scripted `MediaFetcher` and event channel utilities

use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::core::events::{DownloadEvent, EventReceiver};
use crate::core::fetcher::{FetchProgress, FetchRequest, MediaFetcher, MediaMetadata};
use crate::core::models::{AppError, AppResult};
use crate::core::options::PostProcessor;

/// Behaviour of the fake for one URL
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub metadata: Option<MediaMetadata>,
    pub metadata_error: Option<String>,
    pub download_error: Option<String>,
    /// Block inside the download until `release` / `release_all`
    pub hold: bool,
}

impl Script {
    pub fn titled(title: &str) -> Self {
        Self {
            metadata: Some(MediaMetadata {
                title: title.to_string(),
                thumbnail_url: format!("https://i.ytimg.com/{}.jpg", title),
                entries: Vec::new(),
            }),
            ..Self::default()
        }
    }

    pub fn held(mut self) -> Self {
        self.hold = true;
        self
    }

    pub fn failing_download(mut self, message: &str) -> Self {
        self.download_error = Some(message.to_string());
        self
    }
}

#[derive(Default)]
struct ReleaseState {
    released: HashSet<String>,
    all: bool,
}

/// `MediaFetcher` that writes a small file instead of touching the network
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    release: Mutex<ReleaseState>,
    released: Condvar,
    downloads: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, url: &str, script: Script) {
        self.scripts.lock().insert(url.to_string(), script);
    }

    pub fn release(&self, url: &str) {
        self.release.lock().released.insert(url.to_string());
        self.released.notify_all();
    }

    pub fn release_all(&self) {
        self.release.lock().all = true;
        self.released.notify_all();
    }

    /// Requests passed to `download_with_progress`, in call order
    pub fn downloads(&self) -> Vec<FetchRequest> {
        self.downloads.lock().clone()
    }

    fn script_for(&self, url: &str) -> Script {
        self.scripts
            .lock()
            .get(url)
            .cloned()
            .unwrap_or_else(|| Script::titled(url.rsplit('/').next().unwrap_or("video")))
    }

    fn wait_for_release(&self, url: &str, abort: &AtomicBool) -> AppResult<()> {
        let mut state = self.release.lock();
        while !state.all && !state.released.contains(url) {
            if abort.load(Ordering::SeqCst) {
                return Err(AppError::Aborted);
            }
            self.released.wait_for(&mut state, Duration::from_millis(20));
        }
        Ok(())
    }
}

impl MediaFetcher for ScriptedFetcher {
    fn resolve_metadata(&self, url: &str) -> AppResult<MediaMetadata> {
        let script = self.script_for(url);
        if let Some(message) = script.metadata_error {
            return Err(AppError::Extraction(message));
        }
        Ok(script.metadata.unwrap_or_default())
    }

    fn download_with_progress(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(&FetchProgress),
        abort: &AtomicBool,
    ) -> AppResult<PathBuf> {
        self.downloads.lock().push(request.clone());
        let script = self.script_for(&request.url);

        on_progress(&FetchProgress::downloading(512, Some(1024)));
        if script.hold {
            self.wait_for_release(&request.url, abort)?;
        }
        if let Some(message) = script.download_error {
            return Err(AppError::Download(message));
        }

        let title = script
            .metadata
            .map(|m| m.title)
            .unwrap_or_else(|| "video".to_string());
        let ext = request
            .options
            .postprocessors
            .iter()
            .find_map(|pp| match pp {
                PostProcessor::ExtractAudio { codec, .. } => Some(codec.clone()),
                PostProcessor::VideoConvert { container } => Some(container.clone()),
                PostProcessor::Metadata => None,
            })
            .unwrap_or_else(|| "bin".to_string());
        let path = PathBuf::from(
            request
                .options
                .output_template
                .replace("%(title)s", &title)
                .replace("%(ext)s", &ext),
        );
        std::fs::write(&path, b"media")?;

        on_progress(&FetchProgress::finished(path.to_string_lossy()));
        Ok(path)
    }
}

/// Poll the receiver until an event arrives or `timeout` elapses.
pub fn next_event(rx: &mut EventReceiver, timeout: Duration) -> Option<DownloadEvent> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(event) = rx.try_recv() {
            return Some(event);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Collect events until `done` returns true for one of them (inclusive).
pub fn events_until(
    rx: &mut EventReceiver,
    timeout: Duration,
    mut done: impl FnMut(&DownloadEvent) -> bool,
) -> Vec<DownloadEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while let Some(event) = next_event(rx, deadline.saturating_duration_since(Instant::now())) {
        let finished = done(&event);
        events.push(event);
        if finished {
            break;
        }
    }
    events
}

/// Everything currently buffered, without waiting
pub fn drain_events(rx: &mut EventReceiver) -> Vec<DownloadEvent> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}
