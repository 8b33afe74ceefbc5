//! Core business logic module
//!
//! This module contains the domain models, the task queue and worker pool,
//! the persisted ledgers and the yt-dlp backend.

pub mod config;
pub mod duplicate;
pub mod events;
pub mod failures;
pub mod fetcher;
pub mod history;
pub mod links;
pub mod manager;
pub mod models;
pub mod options;
pub mod pause_gate;
pub mod progress;
pub mod queue;
pub(crate) mod worker;
pub mod ytdlp;

#[cfg(test)]
mod test_support;



#[cfg(test)]
mod integration_tests;

// Re-export commonly used types
pub use config::AppConfig;
pub use manager::{DownloadManager, ManagerSettings};
