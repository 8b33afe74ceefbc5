//! Headless driver: queue the YouTube links found in the arguments (or stdin),
//! run the worker pool and print every event as a JSON line until the queue
//! drains or Ctrl-C is pressed.

use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use youtube_downloader_pro::core::config::{MAX_WORKERS, MIN_WORKERS};
use youtube_downloader_pro::core::history::HistoryLedger;
use youtube_downloader_pro::utils::{absolutize, ensure_dir_exists, local_logging_enabled};
use youtube_downloader_pro::{
    event_channel, AppConfig, DownloadEvent, DownloadManager, DownloadMode, DuplicatePolicy,
    HistoryEntry, ManagerSettings, TaskRequest, YtDlpFetcher,
};

const USAGE: &str = "\
Usage: app [options] [URL or text ...]

Links are read from stdin when none are given.

Options:
  --video               download video instead of audio
  --quality <q>         best | 1080p | 720p | 480p | 360p
  --format <f>          mp3 | aac | wav | flac | mp4 | mkv | webm
  --limit <kbps>        speed limit, 0 = unlimited
  --workers <n>         parallel downloads (1-5)
  --output <dir>        output directory
  --policy <p>          ask | skip | replace when the file already exists
  --history             print the download history and exit
  --reset-config        restore the default configuration and exit";

#[derive(Debug, Default)]
struct CliArgs {
    mode: Option<DownloadMode>,
    quality: Option<String>,
    format: Option<String>,
    limit_kbps: Option<u64>,
    workers: Option<usize>,
    output: Option<PathBuf>,
    policy: Option<DuplicatePolicy>,
    show_history: bool,
    reset_config: bool,
    inputs: Vec<String>,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs, String> {
    let mut cli = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("Missing value for {}", name))
        };
        match arg.as_str() {
            "--video" => cli.mode = Some(DownloadMode::Video),
            "--audio" => cli.mode = Some(DownloadMode::Audio),
            "--quality" => cli.quality = Some(value("--quality")?),
            "--format" => cli.format = Some(value("--format")?),
            "--limit" => {
                let raw = value("--limit")?;
                cli.limit_kbps = Some(
                    raw.parse()
                        .map_err(|_| format!("Invalid speed limit: {}", raw))?,
                );
            }
            "--workers" => {
                let raw = value("--workers")?;
                cli.workers = Some(
                    raw.parse()
                        .map_err(|_| format!("Invalid worker count: {}", raw))?,
                );
            }
            "--output" => cli.output = Some(PathBuf::from(value("--output")?)),
            "--policy" => {
                let raw = value("--policy")?;
                cli.policy = Some(raw.parse().map_err(|e| format!("{}", e))?);
            }
            "--history" => cli.show_history = true,
            "--reset-config" => cli.reset_config = true,
            "-h" | "--help" => return Err(USAGE.to_string()),
            flag if flag.starts_with("--") => {
                return Err(format!("Unknown option {}\n\n{}", flag, USAGE));
            }
            _ => cli.inputs.push(arg),
        }
    }

    Ok(cli)
}

#[tokio::main]
async fn main() {
    let cli = match parse_args(env::args().skip(1)) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    let config = AppConfig::load_or_default();
    youtube_downloader_pro::utils::init_tracing(&config.advanced);
    info!(
        "🚀 Starting {} v{} (log level: {}, file logging: {})",
        youtube_downloader_pro::NAME,
        youtube_downloader_pro::VERSION,
        config.advanced.log_level,
        local_logging_enabled()
    );

    if let Err(e) = run(cli, config).await {
        error!("❌ {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

/// Read-only view of the history ledger. Building a manager here would
/// consume the failure ledger without ever running the replayed tasks.
fn load_history(state_dir: &Path) -> Vec<HistoryEntry> {
    HistoryLedger::new(state_dir).load()
}

async fn run(cli: CliArgs, config: AppConfig) -> anyhow::Result<()> {
    if cli.reset_config {
        AppConfig::reset()?;
        println!("Configuration reset: {}", AppConfig::get_config_path()?.display());
        return Ok(());
    }

    let mut settings = config.download.manager_settings(&config.fetcher);
    if let Some(output) = &cli.output {
        settings.output_dir = absolutize(output);
        if config.download.state_directory.is_none() {
            settings.state_dir = ManagerSettings::default_state_dir(&settings.output_dir);
        }
    }
    if let Some(workers) = cli.workers {
        settings.worker_count = workers.clamp(MIN_WORKERS, MAX_WORKERS);
    }
    if let Some(policy) = cli.policy {
        settings.duplicate_policy = policy;
    }

    if cli.show_history {
        for entry in load_history(&settings.state_dir) {
            println!("{}", serde_json::to_string(&entry)?);
        }
        return Ok(());
    }

    ensure_dir_exists(&settings.output_dir)?;

    let fetcher = YtDlpFetcher::new(&config.fetcher);
    match fetcher.version() {
        Some(version) => info!("Using yt-dlp {}", version),
        None => warn!(
            "yt-dlp not found at '{}', downloads will fail",
            config.fetcher.yt_dlp_path
        ),
    }

    let (tx, mut rx) = event_channel();
    let mut manager = DownloadManager::new(settings, Arc::new(fetcher), tx)?;

    let mode = cli.mode.unwrap_or(config.download.default_mode);
    let template = TaskRequest::new("", mode)
        .quality(
            cli.quality
                .unwrap_or_else(|| config.download.default_quality.clone()),
        )
        .format(
            cli.format
                .unwrap_or_else(|| config.download.default_format_for(mode).to_string()),
        )
        .speed_limit(cli.limit_kbps.unwrap_or(config.download.speed_limit_kbps));

    let text = if cli.inputs.is_empty() {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        cli.inputs.join("\n")
    };
    let queued = manager.enqueue_text(&text, &template);
    info!("Queued {} new downloads", queued.len());

    if manager.queue_size() == 0 {
        println!("Nothing to download");
        return Ok(());
    }

    manager.start();

    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                println!("{}", serde_json::to_string(&event)?);
                if matches!(event, DownloadEvent::QueueDrained) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping downloads");
                break;
            }
        }
    }

    tokio::task::block_in_place(|| manager.stop());
    while let Ok(event) = rx.try_recv() {
        println!("{}", serde_json::to_string(&event)?);
    }
    Ok(())
}
