//! Application configuration management

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::manager::ManagerSettings;
use super::models::{DownloadMode, DuplicatePolicy, QUALITY_PRESETS};

/// Smallest and largest worker pool the manager accepts
pub const MIN_WORKERS: usize = 1;
pub const MAX_WORKERS: usize = 5;

const AUDIO_FORMATS: [&str; 4] = ["mp3", "aac", "wav", "flac"];
const VIDEO_FORMATS: [&str; 3] = ["mp4", "mkv", "webm"];
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Main application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub download: DownloadConfig,
    pub fetcher: FetcherConfig,
    pub advanced: AdvancedConfig,
}

/// Queue and worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub output_directory: String,
    /// Where history.json / failed.txt live; defaults to the output directory's parent
    pub state_directory: Option<String>,
    pub worker_count: usize,
    pub duplicate_policy: DuplicatePolicy,
    pub default_mode: DownloadMode,
    pub default_quality: String,
    pub default_audio_format: String,
    pub default_video_format: String,
    pub speed_limit_kbps: u64,
    pub dequeue_timeout_ms: u64,
    pub shutdown_timeout_secs: u64,
    /// Failed tasks are replayed at startup at most this many times
    pub max_replay_attempts: u32,
}

/// External fetch tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub yt_dlp_path: String,
    pub ffmpeg_location: Option<String>,
    pub socket_timeout_secs: u64,
    pub retries: u32,
    pub fragment_retries: u32,
    pub retry_sleep_secs: u64,
    pub force_ipv4: bool,
}

/// Advanced configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedConfig {
    pub enable_logging: bool,
    pub log_level: String, // "error", "warn", "info", "debug", "trace"
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_directory: "downloads".to_string(),
            state_directory: None,
            worker_count: 3,
            duplicate_policy: DuplicatePolicy::Ask,
            default_mode: DownloadMode::Audio,
            default_quality: "best".to_string(),
            default_audio_format: "mp3".to_string(),
            default_video_format: "mp4".to_string(),
            speed_limit_kbps: 0,
            dequeue_timeout_ms: 500,
            shutdown_timeout_secs: 5,
            max_replay_attempts: 3,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            ffmpeg_location: None,
            socket_timeout_secs: 30,
            retries: 10,
            fragment_retries: 10,
            retry_sleep_secs: 5,
            force_ipv4: true,
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            log_level: "info".to_string(),
        }
    }
}

impl DownloadConfig {
    /// Format used when the caller does not pick one for `mode`
    pub fn default_format_for(&self, mode: DownloadMode) -> &str {
        match mode {
            DownloadMode::Audio => &self.default_audio_format,
            DownloadMode::Video => &self.default_video_format,
        }
    }

    pub fn manager_settings(&self, fetcher: &FetcherConfig) -> ManagerSettings {
        let output_dir = PathBuf::from(&self.output_directory);
        let state_dir = self
            .state_directory
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| ManagerSettings::default_state_dir(&output_dir));

        ManagerSettings {
            output_dir,
            state_dir,
            worker_count: self.worker_count.clamp(MIN_WORKERS, MAX_WORKERS),
            duplicate_policy: self.duplicate_policy,
            dequeue_timeout: Duration::from_millis(self.dequeue_timeout_ms.max(1)),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            max_replay_attempts: self.max_replay_attempts,
            fetcher: fetcher.clone(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, creating default if not exists
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Self::default();
            config.save()?;
            tracing::info!("Created default configuration at: {:?}", config_path);
            Ok(config)
        }
    }

    /// Load and validate, falling back to (and persisting) defaults on any problem
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(cfg) => match cfg.validate() {
                Ok(()) => cfg,
                Err(err) => {
                    tracing::warn!(
                        "Invalid configuration detected ({}), falling back to defaults",
                        err
                    );
                    Self::persist_defaults()
                }
            },
            Err(err) => {
                tracing::warn!(
                    "Failed to load configuration from disk: {}. Using defaults",
                    err
                );
                Self::persist_defaults()
            }
        }
    }

    fn persist_defaults() -> Self {
        let default_cfg = Self::default();
        if let Err(save_err) = default_cfg.save() {
            tracing::warn!("Failed to persist default configuration: {}", save_err);
        }
        default_cfg
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: AppConfig =
            serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;

        tracing::info!("Loaded configuration from: {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = self.export()?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        tracing::info!("Saved configuration to: {:?}", path);
        Ok(())
    }

    /// Get the path to the configuration file
    pub fn get_config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "youtubedownloader", "pro")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.config_dir().join("config.json"))
    }

    /// Get the application data directory
    pub fn get_data_dir() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("com", "youtubedownloader", "pro")
            .with_context(|| "Failed to get project directories")?;

        Ok(project_dirs.data_dir().to_path_buf())
    }

    /// Get the logs directory
    pub fn get_logs_dir() -> Result<PathBuf> {
        let data_dir = Self::get_data_dir()?;
        Ok(data_dir.join("logs"))
    }

    /// Reset configuration to defaults
    pub fn reset() -> Result<Self> {
        let config = Self::default();
        config.save()?;
        tracing::info!("Reset configuration to defaults");
        Ok(config)
    }

    /// Export configuration as JSON string
    pub fn export(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "Failed to export configuration")
    }

    /// Parse configuration from a JSON string and validate it
    pub fn import(json: &str) -> Result<Self> {
        let config: AppConfig =
            serde_json::from_str(json).with_context(|| "Failed to parse imported configuration")?;

        config
            .validate()
            .with_context(|| "Imported configuration is invalid")?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let download = &self.download;

        if download.output_directory.trim().is_empty() {
            anyhow::bail!("Output directory must not be empty");
        }

        if !(MIN_WORKERS..=MAX_WORKERS).contains(&download.worker_count) {
            anyhow::bail!(
                "Worker count should be between {} and {}",
                MIN_WORKERS,
                MAX_WORKERS
            );
        }

        if !QUALITY_PRESETS.contains(&download.default_quality.as_str()) {
            anyhow::bail!("Invalid default quality: {}", download.default_quality);
        }

        if !AUDIO_FORMATS.contains(&download.default_audio_format.as_str()) {
            anyhow::bail!("Invalid audio format: {}", download.default_audio_format);
        }

        if !VIDEO_FORMATS.contains(&download.default_video_format.as_str()) {
            anyhow::bail!("Invalid video format: {}", download.default_video_format);
        }

        if download.dequeue_timeout_ms == 0 || download.dequeue_timeout_ms > 5_000 {
            anyhow::bail!("Dequeue timeout should be between 1 and 5000 ms");
        }

        if download.shutdown_timeout_secs == 0 || download.shutdown_timeout_secs > 120 {
            anyhow::bail!("Shutdown timeout should be between 1 and 120 seconds");
        }

        if self.fetcher.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("yt-dlp path must not be empty");
        }

        if self.fetcher.socket_timeout_secs == 0 || self.fetcher.socket_timeout_secs > 300 {
            anyhow::bail!("Socket timeout should be between 1 and 300 seconds");
        }

        if !LOG_LEVELS.contains(&self.advanced.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level: must be 'error', 'warn', 'info', 'debug', or 'trace'"
            );
        }

        Ok(())
    }
}
