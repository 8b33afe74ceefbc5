//! Fetch option building
//!
//! Translates a task's mode/quality/format/speed-limit into the option set the
//! fetch tool understands: a format selector, an output template and a chain
//! of post-processors.

use std::path::Path;

use crate::core::config::FetcherConfig;
use crate::core::models::{DownloadMode, DownloadTask};

const AUDIO_CODECS: [&str; 4] = ["mp3", "aac", "wav", "flac"];
const VIDEO_CONTAINERS: [&str; 3] = ["mp4", "mkv", "webm"];
const BEST_VIDEO_SELECTOR: &str = "bestvideo+bestaudio/best";

#[derive(Debug, Clone, PartialEq)]
pub enum PostProcessor {
    /// Extract the audio track and transcode it
    ExtractAudio { codec: String, quality: String },
    /// Convert the merged video into the requested container
    VideoConvert { container: String },
    /// Embed title/uploader metadata into the output file
    Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub format: String,
    pub output_template: String,
    pub merge_output_format: Option<String>,
    pub postprocessors: Vec<PostProcessor>,
    /// Bytes per second, `None` = unlimited
    pub rate_limit: Option<u64>,
    pub socket_timeout_secs: u64,
    pub retries: u32,
    pub fragment_retries: u32,
    /// Linear back-off step between HTTP retries
    pub retry_sleep_secs: u64,
    pub continue_partial: bool,
    pub force_ipv4: bool,
    pub ffmpeg_location: Option<String>,
}

/// Format selector for a video quality preset.
///
/// `"720p"` yields `bestvideo[height<=720]+bestaudio/best[height<=720]/best`;
/// unknown presets fall back to the best available streams.
pub fn format_selector(quality: &str) -> String {
    let quality = quality.trim().to_ascii_lowercase();
    match quality.strip_suffix('p').and_then(|h| h.parse::<u32>().ok()) {
        Some(height) if matches!(height, 1080 | 720 | 480 | 360) => format!(
            "bestvideo[height<={h}]+bestaudio/best[height<={h}]/best",
            h = height
        ),
        _ => BEST_VIDEO_SELECTOR.to_string(),
    }
}

pub fn audio_codec(format: &str) -> &'static str {
    let format = format.trim().to_ascii_lowercase();
    AUDIO_CODECS
        .iter()
        .copied()
        .find(|codec| *codec == format)
        .unwrap_or("mp3")
}

pub fn video_container(format: &str) -> &'static str {
    let format = format.trim().to_ascii_lowercase();
    VIDEO_CONTAINERS
        .iter()
        .copied()
        .find(|container| *container == format)
        .unwrap_or("mp4")
}

pub fn output_template(output_dir: &Path) -> String {
    output_dir
        .join("%(title)s.%(ext)s")
        .to_string_lossy()
        .to_string()
}

pub fn build_fetch_options(task: &DownloadTask, fetcher: &FetcherConfig) -> FetchOptions {
    let (format, merge_output_format, postprocessors) = match task.mode {
        DownloadMode::Audio => {
            let codec = audio_codec(&task.output_format);
            // mp3 gets a fixed 320k bitrate; other codecs use the best VBR setting.
            let quality = if codec == "mp3" { "320" } else { "0" };
            (
                "bestaudio/best".to_string(),
                None,
                vec![
                    PostProcessor::ExtractAudio {
                        codec: codec.to_string(),
                        quality: quality.to_string(),
                    },
                    PostProcessor::Metadata,
                ],
            )
        }
        DownloadMode::Video => {
            let container = video_container(&task.output_format);
            (
                format_selector(&task.quality),
                Some(container.to_string()),
                vec![
                    PostProcessor::VideoConvert {
                        container: container.to_string(),
                    },
                    PostProcessor::Metadata,
                ],
            )
        }
    };

    FetchOptions {
        format,
        output_template: output_template(&task.output_dir),
        merge_output_format,
        postprocessors,
        rate_limit: (task.speed_limit_kbps > 0).then(|| task.speed_limit_kbps * 1024),
        socket_timeout_secs: fetcher.socket_timeout_secs,
        retries: fetcher.retries,
        fragment_retries: fetcher.fragment_retries,
        retry_sleep_secs: fetcher.retry_sleep_secs,
        continue_partial: true,
        force_ipv4: fetcher.force_ipv4,
        ffmpeg_location: fetcher.ffmpeg_location.clone(),
    }
}

impl FetchOptions {
    /// Render as yt-dlp command line arguments (URL not included).
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            self.format.clone(),
            "-o".to_string(),
            self.output_template.clone(),
            "--no-color".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            self.retries.to_string(),
            "--fragment-retries".to_string(),
            self.fragment_retries.to_string(),
        ];

        if self.retry_sleep_secs > 0 {
            args.push("--retry-sleep".to_string());
            args.push(format!(
                "http:linear={s}::{s}",
                s = self.retry_sleep_secs
            ));
        }
        if self.continue_partial {
            args.push("--continue".to_string());
        }
        if self.force_ipv4 {
            args.push("--force-ipv4".to_string());
        }
        if let Some(rate) = self.rate_limit {
            args.push("--limit-rate".to_string());
            args.push(rate.to_string());
        }
        if let Some(container) = &self.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(container.clone());
        }
        if let Some(location) = &self.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(location.clone());
        }

        for pp in &self.postprocessors {
            match pp {
                PostProcessor::ExtractAudio { codec, quality } => {
                    args.push("--extract-audio".to_string());
                    args.push("--audio-format".to_string());
                    args.push(codec.clone());
                    args.push("--audio-quality".to_string());
                    if quality == "0" {
                        args.push(quality.clone());
                    } else {
                        args.push(format!("{}K", quality));
                    }
                }
                PostProcessor::VideoConvert { container } => {
                    args.push("--recode-video".to_string());
                    args.push(container.clone());
                }
                PostProcessor::Metadata => args.push("--embed-metadata".to_string()),
            }
        }

        args
    }
}
