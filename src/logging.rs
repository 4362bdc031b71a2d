//! Logging configuration with journald support on Linux.
//!
//! Sets up tracing-based logging that goes to systemd's journal on Linux,
//! with a rolling log file as the fallback.
//!
//! Per-signal scoring failures are logged at `debug` under the
//! `mediasift::scoring` target. They are off at the default level; turn them
//! on alone with `--trace-signals` or `MEDIASIFT_LOG_SIGNALS=1` instead of
//! raising the whole crate to `debug`.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_DIRECTIVES: &str = "info";
const SIGNALS_DIRECTIVE: &str = "mediasift::scoring=debug";

/// Filter directives for the given `MEDIASIFT_LOG` value. Signal tracing is
/// appended last so it wins over a coarser level for the scoring target.
pub fn filter_directives(env_value: Option<&str>, trace_signals: bool) -> String {
    let base = env_value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVES);

    if trace_signals {
        format!("{},{}", base, SIGNALS_DIRECTIVE)
    } else {
        base.to_string()
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn build_filter(trace_signals: bool) -> EnvFilter {
    let env_value = std::env::var("MEDIASIFT_LOG").ok();
    let trace_signals = trace_signals || env_flag("MEDIASIFT_LOG_SIGNALS");
    let directives = filter_directives(env_value.as_deref(), trace_signals);

    EnvFilter::try_new(&directives).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid MEDIASIFT_LOG ({}): {}", directives, e);
        EnvFilter::new(filter_directives(None, trace_signals))
    })
}

/// Initialize the logging system.
///
/// Log level is controlled via the `MEDIASIFT_LOG` environment variable
/// (`debug`, `info` (default), `warn`, `error`, or full directives).
pub fn init(log_dir: Option<PathBuf>, trace_signals: bool) -> Result<()> {
    let env_filter = build_filter(trace_signals);

    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer.with_syslog_identifier("mediasift".to_string()))
                .try_init()?;

            tracing::info!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mediasift")
            .join("logs")
    });

    std::fs::create_dir_all(&log_dir)?;

    // One file per day; runs are short and usually read back by date.
    let file_appender = tracing_appender::rolling::daily(&log_dir, "mediasift.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The guard flushes on drop, so it has to outlive the process.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true),
        )
        .try_init()?;

    tracing::info!(dir = ?log_dir, "Logging initialized with file backend");
    Ok(())
}
