//! Logging setup for treemirror
//!
//! Events go to two places: the configured log file (appended, no colors)
//! and the console. `RUST_LOG` overrides the default filter.

use std::path::Path;

use color_eyre::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::Layer as _;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Keeps the non-blocking file writer alive; drop it last to flush the log
pub struct LogGuard {
    _guard: Option<WorkerGuard>,
}

/// Initialize console logging, plus file logging when `log_file` is given.
///
/// # Errors
/// Returns an error if the log file cannot be opened
pub fn init(log_file: Option<&Path>, verbose: bool) -> Result<LogGuard> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| color_eyre::eyre::eyre!("Invalid log file {}", path.display()))?;

            let appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(file_name.to_string_lossy())
                .build(directory)?;
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);

            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(console_level);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(if verbose {
            "warn,treemirror=debug,treemirror_core=debug"
        } else {
            "warn,treemirror=info,treemirror_core=info"
        })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()?;

    Ok(LogGuard { _guard: guard })
}
