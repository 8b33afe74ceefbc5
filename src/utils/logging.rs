use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::core::config::{AdvancedConfig, AppConfig};

/// Targets that follow the configured level: the library and the `app` binary
const LOG_TARGETS: [&str; 2] = ["youtube_downloader_pro", "app"];

pub fn local_logging_enabled() -> bool {
    cfg!(feature = "local-logging")
}

/// Log files live under the application data directory.
pub fn resolve_log_dir() -> Result<PathBuf, String> {
    AppConfig::get_logs_dir().map_err(|e| format!("Failed to resolve log directory: {e:#}"))
}

/// Filter directive for the `advanced` config section. Disabled logging
/// silences everything.
pub fn filter_directive(advanced: &AdvancedConfig) -> String {
    if !advanced.enable_logging {
        return "off".to_string();
    }
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, advanced.log_level))
        .collect::<Vec<_>>()
        .join(",")
}

fn build_filter(advanced: &AdvancedConfig) -> EnvFilter {
    if !advanced.enable_logging {
        return EnvFilter::new("off");
    }
    // RUST_LOG still wins so a single run can be debugged without editing config
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directive(advanced)))
}

/// Install the global tracing subscriber. Safe to call more than once; only
/// the first call takes effect.
pub fn init_tracing(advanced: &AdvancedConfig) {
    let filter = build_filter(advanced);

    #[cfg(feature = "local-logging")]
    {
        use std::sync::OnceLock;
        use tracing_appender::non_blocking::WorkerGuard;

        static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

        let log_dir = resolve_log_dir().and_then(|dir| {
            std::fs::create_dir_all(&dir)
                .map(|_| dir)
                .map_err(|e| format!("Failed to create log directory: {e}"))
        });

        match log_dir {
            Ok(dir) if advanced.enable_logging => {
                let file_appender = tracing_appender::rolling::daily(&dir, "downloader.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                let _ = LOG_GUARD.set(guard);

                let _ = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .try_init();
                return;
            }
            Ok(_) => {}
            Err(err) => eprintln!("{err}"),
        }
    }

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
