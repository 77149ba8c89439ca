//! Command-line interface module for dumpsort.
//!
//! This module handles:
//! - Argument parsing
//! - Logging setup
//! - The long-running `watch` command and its startup checks
//! - The one-shot `organize` command, with an optional dry run

use crate::config::{Config, ConfigError};
use crate::organizer::{self, FileOutcome, OrganizeError, SkipReason};
use crate::output::OutputFormatter;
use crate::watcher::{self, WatchError, WatchLoop};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Watch a dump directory and sort new files into destinations by name.
#[derive(Debug, Parser)]
#[command(name = "dumpsort", version, about)]
pub struct Cli {
    /// Configuration file (defaults to ~/.prefix.yaml).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr.
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Represents a CLI command to execute.
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Command {
    /// Watch the dump directory and organize files after activity settles (default).
    Watch,
    /// Run a single organize pass and exit.
    Organize {
        /// Show where files would go without moving anything.
        #[arg(long)]
        dry_run: bool,
    },
}

/// Fatal errors, each naming the step that failed.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("could not open log file {}: {source}", .path.display())]
    LogFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("loading configuration failed: {0}")]
    Config(#[from] ConfigError),

    #[error("startup check failed: {0}")]
    Watch(#[from] WatchError),

    #[error("organize pass failed: {0}")]
    Organize(#[from] OrganizeError),

    #[error("could not start async runtime: {0}")]
    Runtime(std::io::Error),
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `verbose`.
pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| AppError::LogFile {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

/// Runs the parsed command line to completion.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use dumpsort::cli::{run, Cli};
///
/// if let Err(e) = run(Cli::parse()) {
///     eprintln!("Error: {}", e);
/// }
/// ```
pub fn run(cli: Cli) -> Result<(), AppError> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    let config = Config::load(cli.config.as_deref())?;
    info!(
        dump_dir = %config.dump_directory.display(),
        rules = config.destinations.len(),
        "configuration loaded"
    );

    match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => {
            let runtime = tokio::runtime::Runtime::new().map_err(AppError::Runtime)?;
            runtime.block_on(watch(config))
        }
        Command::Organize { dry_run: true } => organize_dry_run(&config),
        Command::Organize { dry_run: false } => organize_once(&config),
    }
}

/// Watches the configured dump directory until Ctrl-C or SIGTERM.
pub async fn watch(config: Config) -> Result<(), AppError> {
    // The watcher has to outlive the loop, dropping it closes the event channel
    let (_watcher, events) = watcher::subscribe(&config.dump_directory)?;

    info!(
        delay_secs = config.debounce_seconds,
        "file organizer started, press Ctrl+C to stop"
    );
    WatchLoop::from_config(&config)
        .run(events, shutdown_signal())
        .await;

    info!("file organizer stopped");
    Ok(())
}

/// Completes on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Runs one organize pass with a progress bar and a summary table.
pub fn organize_once(config: &Config) -> Result<(), AppError> {
    OutputFormatter::info(&format!(
        "Organizing contents of: {}",
        config.dump_directory.display()
    ));

    let entries = organizer::scan_dump_dir(&config.dump_directory)?;
    if entries.is_empty() {
        OutputFormatter::info("No files found to organize.");
        return Ok(());
    }

    let pb = OutputFormatter::create_progress_bar(entries.len() as u64);
    let mut messages = Vec::new();
    let outcome = organizer::organize_entries(&entries, &config.destinations, |file| {
        pb.inc(1);
        match file {
            FileOutcome::Moved(relocation) => {
                let mut line = format!(
                    "{} -> {}",
                    relocation.source.display(),
                    relocation.destination.display()
                );
                if let Some(ref warning) = relocation.permission_warning {
                    line.push_str(&format!(" ({})", warning));
                }
                messages.push((true, line));
            }
            FileOutcome::Skipped(path, reason) => {
                messages.push((false, format!("{}: {}", path.display(), reason)));
            }
        }
    });
    pb.finish_and_clear();

    for (moved, line) in &messages {
        if *moved {
            OutputFormatter::success(line);
        } else {
            OutputFormatter::warning(line);
        }
    }

    let failures = outcome
        .skipped
        .iter()
        .filter(|(_, reason)| matches!(reason, SkipReason::Failed(_)))
        .count();

    OutputFormatter::summary_table(&outcome.moved_by_destination(), outcome.skipped_count());
    if failures > 0 {
        OutputFormatter::error(&format!(
            "{} file(s) matched a rule but could not be moved. Please review the errors above.",
            failures
        ));
    }
    Ok(())
}

/// Prints where each file would go without touching anything.
pub fn organize_dry_run(config: &Config) -> Result<(), AppError> {
    OutputFormatter::dry_run_notice(&format!(
        "Analyzing contents of: {}",
        config.dump_directory.display()
    ));

    let planned = organizer::plan(&config.dump_directory, &config.destinations)?;
    if planned.is_empty() {
        OutputFormatter::info("No files found to organize.");
        return Ok(());
    }

    OutputFormatter::header("Files would be organized as follows:");
    let mut would_move = 0;
    for planned_move in &planned {
        let name = planned_move.source.display();
        match (&planned_move.destination, planned_move.rule_index) {
            (Some(destination), Some(index)) => {
                let rule = &config.destinations[index];
                if planned_move.blocked {
                    OutputFormatter::warning(&format!(
                        "{} -> {} already exists, would be skipped",
                        name,
                        destination.display()
                    ));
                } else {
                    would_move += 1;
                    OutputFormatter::success(&format!(
                        "{} -> {} (rule #{}: {})",
                        name,
                        destination.display(),
                        index + 1,
                        rule.describe()
                    ));
                }
            }
            _ => OutputFormatter::warning(&format!("{}: no rule matched", name)),
        }
    }

    OutputFormatter::dry_run_notice(&format!(
        "{} of {} file(s) would be moved. No files were modified.",
        would_move,
        planned.len()
    ));
    Ok(())
}
