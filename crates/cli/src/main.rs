//! treemirror: periodic one-way directory mirroring
//!
//! Keeps a replica folder identical to a source folder:
//! - Copies new files and folders, updates changed files
//! - Deletes whatever the source no longer has
//! - BLAKE3 content comparison, size checked first
//! - Bounded concurrent filesystem work

mod logging;
mod sink;
mod summary;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use clap::builder::styling::{AnsiColor, Effects};
use clap::{Args, Parser, Subcommand, builder::Styles};
use color_eyre::Result;
use tracing::{debug, error, info};

use treemirror_core::{EventSink, MirrorConfig, Settings, SyncEngine, SyncError, SyncReport};

use crate::sink::TracingSink;
use crate::summary::PassSummary;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default())
    .valid(AnsiColor::Green.on_default())
    .invalid(AnsiColor::Red.on_default());

#[derive(Parser)]
#[command(name = "treemirror")]
#[command(version)]
#[command(styles = STYLES)]
#[command(about = "One-way periodic folder mirroring")]
#[command(long_about = r#"
treemirror keeps a replica folder identical to a source folder.

Each pass lists both trees, copies what is new, updates what changed,
and deletes what the source no longer has. The source is never modified.

Examples:
  treemirror sync --source ./data --replica /backup/data          One pass
  treemirror watch --source ./data --replica /backup/data -i 30   Every 30s
  treemirror --config treemirror.toml watch                       From a file
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// TOML configuration file; flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log file path
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Maximum concurrent filesystem operations
    #[arg(short, long, global = true)]
    jobs: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Folders {
    /// Source folder path
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Replica folder path
    #[arg(short, long)]
    replica: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single synchronization pass
    Sync {
        #[command(flatten)]
        folders: Folders,
    },

    /// Synchronize repeatedly until interrupted
    Watch {
        #[command(flatten)]
        folders: Folders,

        /// Seconds between the start of two passes
        #[arg(short, long, allow_negative_numbers = true)]
        interval: Option<i64>,
    },

    /// Show version and build info
    Version,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            eprintln!("treemirror {}", env!("CARGO_PKG_VERSION"));
            eprintln!("Built with Rust {}", env!("CARGO_PKG_RUST_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sync { folders } => {
            let config = resolve_config(&cli, folders, None)?;
            let (settings, _guard) = start(&config, cli.verbose)?;
            sync_command(&settings).await
        }
        Commands::Watch { folders, interval } => {
            let config = resolve_config(&cli, folders, *interval)?;
            let (settings, _guard) = start(&config, cli.verbose)?;
            watch_command(&settings).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Merge the config file (if any) with command-line overrides
fn resolve_config(cli: &Cli, folders: &Folders, interval: Option<i64>) -> Result<MirrorConfig> {
    let mut config = match &cli.config {
        Some(path) => MirrorConfig::load(path)?,
        None => MirrorConfig::default(),
    };

    if let Some(source) = &folders.source {
        config.source.clone_from(source);
    }
    if let Some(replica) = &folders.replica {
        config.replica.clone_from(replica);
    }
    if let Some(log_file) = &cli.log_file {
        config.log_file.clone_from(log_file);
    }
    if let Some(jobs) = cli.jobs {
        config.jobs = jobs;
    }
    if let Some(interval) = interval {
        config.interval = interval;
    }

    Ok(config)
}

/// Validate the configuration and set up logging.
///
/// Validation errors are logged one per line, to the log file too when its
/// folder is there.
fn start(config: &MirrorConfig, verbose: bool) -> Result<(Settings, logging::LogGuard)> {
    match config.validate() {
        Ok(settings) => {
            let guard = logging::init(Some(&settings.log_file), verbose)?;
            Ok((settings, guard))
        }
        Err(errors) => {
            let _guard = logging::init(usable_log_file(&config.log_file), verbose)
                .or_else(|_| logging::init(None, verbose))?;
            for message in &errors {
                TracingSink.error(message);
            }
            color_eyre::eyre::bail!("invalid configuration ({} errors)", errors.len())
        }
    }
}

/// `log_file` if its folder exists, so it can be opened without creating
/// anything
fn usable_log_file(log_file: &Path) -> Option<&Path> {
    let folder = log_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    (log_file.file_name().is_some() && folder.is_dir()).then_some(log_file)
}

async fn sync_command(settings: &Settings) -> Result<ExitCode> {
    let sink = Arc::new(TracingSink);
    let engine = SyncEngine::with_concurrency(sink.clone(), settings.jobs);

    let summary = PassSummary::new();
    let (report, failures) = run_pass(&engine, sink.as_ref(), settings).await?;
    summary.finish(&report, failures);

    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn watch_command(settings: &Settings) -> Result<()> {
    let sink = Arc::new(TracingSink);
    let engine = SyncEngine::with_concurrency(sink.clone(), settings.jobs);
    sink.sync_started(settings);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let started = Instant::now();

        // A pass in flight always runs to completion
        let pass = run_pass(&engine, sink.as_ref(), settings);
        tokio::pin!(pass);
        let mut interrupted = false;
        let (report, failures) = loop {
            tokio::select! {
                outcome = &mut pass => break outcome?,
                _ = &mut shutdown, if !interrupted => {
                    info!("Interrupt received, finishing the current pass...");
                    interrupted = true;
                }
            }
        };
        debug!(
            "Pass done in {:?}: {} mutations, {} up to date, {failures} failed",
            started.elapsed(),
            report.mutations(),
            report.up_to_date
        );

        if interrupted {
            sink.terminated_manually();
            return Ok(());
        }

        let wait = settings.interval.saturating_sub(started.elapsed());
        tokio::select! {
            () = tokio::time::sleep(wait) => {}
            _ = &mut shutdown => {
                sink.terminated_manually();
                return Ok(());
            }
        }
    }
}

/// Run one pass, logging every failed entry. Returns the report and the
/// number of failures.
async fn run_pass(
    engine: &SyncEngine,
    sink: &TracingSink,
    settings: &Settings,
) -> Result<(SyncReport, usize)> {
    ensure_replica_root(&settings.replica, sink);

    match engine.synchronize(&settings.source, &settings.replica).await {
        Ok(report) => Ok((report, 0)),
        Err(SyncError::Incomplete { report, errors }) => {
            let failures: Vec<&SyncError> = errors.iter().flat_map(SyncError::failures).collect();
            for failure in &failures {
                sink.error(&failure.to_string());
            }
            Ok((report, failures.len()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Recreate the replica root if it disappeared between passes
fn ensure_replica_root(replica: &Path, sink: &TracingSink) {
    if replica.is_dir() {
        return;
    }
    match std::fs::create_dir_all(replica) {
        Ok(()) => sink.folder_created(replica),
        Err(e) => error!("Could not create replica folder {}: {e}", replica.display()),
    }
}
