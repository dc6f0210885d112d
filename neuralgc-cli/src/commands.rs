//! Subcommand handlers.

use crate::{Cli, Commands, ConfigAction, GridAction};
use clap::Parser;
use neuralgc_core::presets::{self, GridFile, PRESETS};
use neuralgc_core::{ExperimentConfig, JobGrid, Settings};
use neuralgc_ml::{ExperimentRunner, GcEvaluation, RunOutcome, SyntheticPipeline};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A subcommand whose arguments have been checked.
#[derive(Debug)]
pub enum Task {
    Run(ExperimentConfig),
    Grid(GridAction),
    Inspect { path: PathBuf, json: bool },
    Config(ConfigAction),
}

/// Validate what can be validated before any side effect.
pub fn prepare(command: Commands) -> anyhow::Result<Task> {
    Ok(match command {
        Commands::Run { family } => {
            let name = family.family();
            let config = family
                .into_config()
                .map_err(|e| anyhow::anyhow!("Invalid {} configuration: {}", name, e))?;
            Task::Run(config)
        }
        Commands::Grid { action } => Task::Grid(action),
        Commands::Inspect { path, json } => Task::Inspect { path, json },
        Commands::Config { action } => Task::Config(action),
    })
}

/// Handle a prepared subcommand.
pub fn handle_task(task: Task, settings: &Settings) -> anyhow::Result<()> {
    match task {
        Task::Run(config) => handle_run(&config, settings),
        Task::Grid(action) => handle_grid(action, settings),
        Task::Inspect { path, json } => handle_inspect(&path, json),
        Task::Config(action) => handle_config(action, settings),
    }
}

fn handle_run(config: &ExperimentConfig, settings: &Settings) -> anyhow::Result<()> {
    let runner = ExperimentRunner::new(&settings.results_dir);
    match runner.run(config, &mut SyntheticPipeline)? {
        RunOutcome::Completed { path } => println!("Saved results to {}", path.display()),
        RunOutcome::Skipped { path } => {
            println!("Skipping experiment: {} already exists", path.display())
        }
    }
    Ok(())
}

fn handle_grid(action: GridAction, settings: &Settings) -> anyhow::Result<()> {
    match action {
        GridAction::Preset { name } => {
            let grid = presets::preset(&name, &settings.program)?;
            write_grid(&grid, &settings.batches_dir)
        }
        GridAction::File { path } => {
            let grid = GridFile::load(&path)?.into_grid(&settings.program)?;
            write_grid(&grid, &settings.batches_dir)
        }
        GridAction::List => {
            println!("Built-in presets:");
            for name in PRESETS {
                let grid = presets::preset(name, &settings.program)?;
                println!("  {:<40} {} jobs", name, grid.len());
            }
            Ok(())
        }
        GridAction::Status { batch, pending } => {
            let text = std::fs::read_to_string(&batch)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", batch.display(), e))?;
            let status = batch_status(&text, &settings.results_dir);
            println!("Batch: {}", batch.display());
            println!("  Done:    {}", status.done);
            println!("  Pending: {}", status.pending.len());
            if !status.invalid.is_empty() {
                println!("  Invalid: {}", status.invalid.len());
                for (line_no, reason) in &status.invalid {
                    println!("    line {line_no}: {reason}");
                }
            }
            if pending {
                for line in &status.pending {
                    println!("{line}");
                }
            }
            Ok(())
        }
    }
}

fn write_grid(grid: &JobGrid, batches_dir: &Path) -> anyhow::Result<()> {
    let path = grid.write_batch(batches_dir, &chrono::Local::now())?;
    println!("Wrote {} jobs to {}", grid.len(), path.display());
    Ok(())
}

/// Completion state of a batch file's lines.
#[derive(Debug, Default)]
pub(crate) struct BatchStatus {
    pub done: usize,
    pub pending: Vec<String>,
    /// 1-based line number and parse error.
    pub invalid: Vec<(usize, String)>,
}

/// Parse every line back through the CLI grammar and check whether its
/// result file exists under `results_root`.
pub(crate) fn batch_status(text: &str, results_root: &Path) -> BatchStatus {
    let mut status = BatchStatus::default();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line_result_path(line, results_root) {
            Ok(path) if path.exists() => status.done += 1,
            Ok(_) => status.pending.push(line.to_string()),
            Err(reason) => status.invalid.push((i + 1, reason)),
        }
    }
    tracing::debug!(
        done = status.done,
        pending = status.pending.len(),
        invalid = status.invalid.len(),
        "Checked batch"
    );
    status
}

fn line_result_path(line: &str, results_root: &Path) -> Result<PathBuf, String> {
    let cli = Cli::try_parse_from(line.split_whitespace()).map_err(|e| {
        e.to_string()
            .lines()
            .next()
            .unwrap_or("unparseable line")
            .to_string()
    })?;
    match cli.command {
        Commands::Run { family } => family
            .into_config()
            .map(|config| config.result_path(results_root).path())
            .map_err(|e| e.to_string()),
        _ => Err("not a `run` invocation".to_string()),
    }
}

#[derive(Debug, Serialize)]
struct InspectReport {
    identity: String,
    family: String,
    finished_at: String,
    best_nepoch: Vec<usize>,
    #[serde(flatten)]
    evaluation: GcEvaluation,
}

fn handle_inspect(path: &Path, json: bool) -> anyhow::Result<()> {
    let bundle = neuralgc_ml::load_bundle(path)?;
    let evaluation = neuralgc_ml::evaluate_bundle(&bundle)?;
    let report = InspectReport {
        identity: bundle.provenance.identity.clone(),
        family: bundle.provenance.family.clone(),
        finished_at: bundle.provenance.finished_at.to_rfc3339(),
        best_nepoch: bundle.best_results.best_nepoch.clone(),
        evaluation,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Result: {}", path.display());
    println!("  Family:        {}", report.family);
    println!("  Identity:      {}", report.identity);
    println!("  Finished:      {}", report.finished_at);
    println!("  Series:        {}", report.evaluation.p);
    println!("  True edges:    {}", report.evaluation.true_edges);
    println!("  AUROC:         {}", fmt_auroc(report.evaluation.auroc));
    println!(
        "  AUROC (off-diagonal): {}",
        fmt_auroc(report.evaluation.auroc_off_diagonal)
    );
    println!("  Best epochs:   {:?}", report.best_nepoch);
    Ok(())
}

fn fmt_auroc(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}"))
}

fn handle_config(action: ConfigAction, settings: &Settings) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(settings)
                .map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))?;
            println!("{}", toml_str);
        }
    }
    Ok(())
}
