//! YouTube Downloader Pro - Core Library
//!
//! This library provides the download orchestration core: a FIFO task queue
//! drained by a bounded pool of worker threads, a pause gate, duplicate
//! handling, persisted history and failure ledgers, and a yt-dlp backend.

pub mod core;
pub mod utils;

// Re-export commonly used types
pub use core::{
    config::AppConfig,
    duplicate::{DuplicateDecision, DuplicatePrompt},
    events::{event_channel, DownloadEvent, EventReceiver, EventSender},
    fetcher::{MediaFetcher, MediaMetadata},
    history::HistoryEntry,
    links::extract_youtube_urls,
    manager::{DownloadManager, ManagerSettings},
    models::{
        AppError, AppResult, DownloadMode, DownloadTask, DuplicatePolicy, TaskRequest, TaskStatus,
    },
    ytdlp::YtDlpFetcher,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Initialize the library with default settings
pub fn init() -> anyhow::Result<()> {
    utils::init_tracing(&crate::core::config::AdvancedConfig::default());
    tracing::info!("📚 {} v{} initialized", NAME, VERSION);
    Ok(())
}
