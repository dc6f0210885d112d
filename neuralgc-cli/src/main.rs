//! neuralgc CLI: run one experiment, generate job grids, inspect results.
//!
//! Every `run` invocation is an independent process; batch files written by
//! `grid` hold one such invocation per line.

mod args;
mod commands;

use args::RunFamily;
use clap::Parser;
use neuralgc_core::{Settings, SettingsOverrides, load_settings};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Neural Granger-causality experiments on synthetic series
#[derive(Parser, Debug)]
#[command(name = "neuralgc", version, about, long_about = None)]
pub(crate) struct Cli {
    /// Workspace directory (holds neuralgc.toml)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Root directory for result bundles
    #[arg(long)]
    results_dir: Option<PathBuf>,

    /// Directory receiving batch files
    #[arg(long)]
    batches_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Run one experiment (skipped if its result already exists)
    Run {
        #[command(subcommand)]
        family: RunFamily,
    },
    /// Generate and track batch files
    Grid {
        #[command(subcommand)]
        action: GridAction,
    },
    /// Score a result bundle against its true GC matrix
    Inspect {
        /// Path to a result file
        path: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum GridAction {
    /// Write a batch file from a built-in preset
    Preset {
        /// Preset name (see `grid list`)
        name: String,
    },
    /// Write a batch file from a TOML grid description
    File {
        /// Path to the grid file
        path: PathBuf,
    },
    /// List the built-in presets
    List,
    /// Count done and pending lines of a batch file
    Status {
        /// Path to the batch file
        batch: PathBuf,
        /// Print the lines still pending
        #[arg(long)]
        pending: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Show the effective settings
    Show,
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| cli.workspace.clone());
    let overrides = SettingsOverrides {
        results_dir: cli.results_dir.clone(),
        batches_dir: cli.batches_dir.clone(),
    };
    let settings = load_settings(Some(&workspace), Some(&overrides))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    // Reject a bad run before logging touches the filesystem.
    let task = commands::prepare(cli.command)?;

    let _guard = init_logging(cli.verbose, cli.quiet, &settings);

    commands::handle_task(task, &settings)
}

/// Human-readable stderr output plus, when `log.json_dir` is set, a daily
/// rolling JSON log. The returned guard flushes the JSON writer on drop.
fn init_logging(
    verbose: u8,
    quiet: bool,
    settings: &Settings,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = match verbose {
        0 if quiet => EnvFilter::new("error"),
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&settings.log.level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    let (json_layer, guard) = match settings.log.json_dir.as_deref().and_then(json_appender) {
        Some(file_appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

/// Daily rolling appender under `dir`, or `None` (with a warning on stderr)
/// when the directory cannot be prepared.
fn json_appender(dir: &Path) -> Option<RollingFileAppender> {
    let built = std::fs::create_dir_all(dir)
        .map_err(|e| e.to_string())
        .and_then(|()| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("neuralgc.log")
                .build(dir)
                .map_err(|e| e.to_string())
        });
    match built {
        Ok(appender) => Some(appender),
        Err(e) => {
            eprintln!(
                "warning: JSON log disabled, cannot use {}: {}",
                dir.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_appender_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("logs").join("json");
        assert!(json_appender(&dir).is_some());
        assert!(dir.is_dir());
    }

    #[test]
    fn test_json_appender_reports_unusable_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        assert!(json_appender(&file.join("logs")).is_none());
    }
}
