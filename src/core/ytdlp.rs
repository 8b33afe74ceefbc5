//! yt-dlp backend - `MediaFetcher` implemented by driving the yt-dlp executable
//!
//! Metadata comes from `--dump-single-json --flat-playlist`. Downloads print
//! one machine-readable progress line per update through `--progress-template`
//! and report the final path with `--print after_move:`.

use regex::Regex;
use serde_json::Value;
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use crate::core::config::FetcherConfig;
use crate::core::fetcher::{
    FetchProgress, FetchRequest, FetchStatus, MediaFetcher, MediaMetadata, PlaylistEntry,
};
use crate::core::models::{AppError, AppResult};

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress.filename)s";
const OUTPUT_PRINT: &str = "after_move:[output] %(filepath)s";
const OUTPUT_PREFIX: &str = "[output] ";
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const STDERR_TAIL_LINES: usize = 20;

static PROGRESS_LINE: OnceLock<Option<Regex>> = OnceLock::new();

fn progress_line_regex() -> Option<&'static Regex> {
    PROGRESS_LINE
        .get_or_init(|| {
            Regex::new(r"^\[progress\] (\w+)\|([^|]*)\|([^|]*)\|([^|]*)\|([^|]*)\|([^|]*)\|(.*)$")
                .ok()
        })
        .as_ref()
}

/// yt-dlp prints `NA` for fields it does not know.
fn parse_number(raw: &str) -> Option<f64> {
    match raw.trim() {
        "" | "NA" | "None" => None,
        value => value.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0),
    }
}

/// Parse one `--progress-template` line into a progress report.
pub fn parse_progress_line(line: &str) -> Option<FetchProgress> {
    let caps = progress_line_regex()?.captures(line.trim_end())?;
    let status = match caps.get(1)?.as_str() {
        "downloading" => FetchStatus::Downloading,
        "finished" => FetchStatus::Finished,
        _ => return None,
    };
    let field = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or_default();
    let filename = match field(7).trim() {
        "" | "NA" => None,
        name => Some(name.to_string()),
    };

    Some(FetchProgress {
        status,
        downloaded_bytes: parse_number(field(2)).map(|v| v as u64).unwrap_or(0),
        total_bytes: parse_number(field(3)).map(|v| v as u64),
        total_bytes_estimate: parse_number(field(4)).map(|v| v as u64),
        speed: parse_number(field(5)),
        eta: parse_number(field(6)).map(|v| v as u64),
        filename,
    })
}

/// Extract title, thumbnail and flat playlist entries from `--dump-single-json` output.
pub fn parse_metadata(json: &Value) -> MediaMetadata {
    let text = |value: &Value, key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let thumbnail_url = match json.get("thumbnail").and_then(Value::as_str) {
        Some(url) => url.to_string(),
        None => json
            .get("thumbnails")
            .and_then(Value::as_array)
            .and_then(|thumbs| thumbs.last())
            .map(|thumb| text(thumb, "url"))
            .unwrap_or_default(),
    };

    let entries = json
        .get("entries")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let url = entry
                        .get("webpage_url")
                        .or_else(|| entry.get("url"))
                        .and_then(Value::as_str)?;
                    Some(PlaylistEntry {
                        url: url.to_string(),
                        title: entry
                            .get("title")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    MediaMetadata {
        title: text(json, "title"),
        thumbnail_url,
        entries,
    }
}

/// Last `ERROR:` line, or the last non-empty line, of yt-dlp's stderr
fn summarize_stderr(lines: &VecDeque<String>) -> Option<String> {
    lines
        .iter()
        .rev()
        .find(|line| line.contains("ERROR"))
        .or_else(|| lines.iter().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim().to_string())
}

pub struct YtDlpFetcher {
    executable: String,
}

impl YtDlpFetcher {
    pub fn new(config: &FetcherConfig) -> Self {
        Self {
            executable: config.yt_dlp_path.clone(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.stdin(Stdio::null());

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> AppError {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::ToolMissing {
                tool: self.executable.clone(),
            }
        } else {
            AppError::System(format!("Failed to start {}: {}", self.executable, e))
        }
    }

    /// `yt-dlp --version`, `None` when the tool cannot be run.
    pub fn version(&self) -> Option<String> {
        let output = self.command().arg("--version").output().ok()?;
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl MediaFetcher for YtDlpFetcher {
    fn resolve_metadata(&self, url: &str) -> AppResult<MediaMetadata> {
        debug!("Resolving metadata for {}", url);
        let output = self
            .command()
            .args(["--dump-single-json", "--flat-playlist", "--no-warnings"])
            .arg(url)
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr: VecDeque<String> = String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::to_string)
                .collect();
            return Err(AppError::Extraction(
                summarize_stderr(&stderr)
                    .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status)),
            ));
        }

        let json: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::Extraction(format!("Unreadable metadata for {}: {}", url, e)))?;
        Ok(parse_metadata(&json))
    }

    fn download_with_progress(
        &self,
        request: &FetchRequest,
        on_progress: &mut dyn FnMut(&FetchProgress),
        abort: &AtomicBool,
    ) -> AppResult<PathBuf> {
        let mut args = request.options.to_args();
        args.extend(
            [
                "--newline",
                "--progress",
                "--no-simulate",
                "--progress-template",
                PROGRESS_TEMPLATE,
                "--print",
                OUTPUT_PRINT,
            ]
            .map(str::to_string),
        );
        args.push(request.url.clone());

        info!("Starting yt-dlp for {}", request.url);
        debug!("yt-dlp args: {:?}", args);

        let mut child = self
            .command()
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::System("Failed to capture yt-dlp stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::System("Failed to capture yt-dlp stderr".to_string()))?;

        let (line_tx, line_rx) = mpsc::channel::<String>();
        thread::spawn(move || {
            for line in BufReader::new(stdout).lines().map_while(Result::ok) {
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        });
        let stderr_reader = thread::spawn(move || collect_tail(stderr));

        let mut output_path: Option<PathBuf> = None;
        let mut last_filename: Option<String> = None;

        loop {
            if abort.load(Ordering::SeqCst) {
                kill(&mut child);
                return Err(AppError::Aborted);
            }

            match line_rx.recv_timeout(ABORT_POLL_INTERVAL) {
                Ok(line) => {
                    if let Some(path) = line.strip_prefix(OUTPUT_PREFIX) {
                        output_path = Some(PathBuf::from(path.trim()));
                    } else if let Some(progress) = parse_progress_line(&line) {
                        if progress.filename.is_some() {
                            last_filename = progress.filename.clone();
                        }
                        on_progress(&progress);
                    } else {
                        debug!("yt-dlp: {}", line);
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let status = child.wait()?;
        let stderr_tail = stderr_reader.join().unwrap_or_default();

        if !status.success() {
            return Err(AppError::Download(
                summarize_stderr(&stderr_tail)
                    .unwrap_or_else(|| format!("yt-dlp exited with {}", status)),
            ));
        }

        output_path
            .or_else(|| last_filename.map(PathBuf::from))
            .ok_or_else(|| AppError::Download("yt-dlp did not report an output file".to_string()))
    }
}

fn collect_tail(stderr: impl Read) -> VecDeque<String> {
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    for line in BufReader::new(stderr).lines().map_while(Result::ok) {
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to kill yt-dlp: {}", e);
    }
    let _ = child.wait();
}
