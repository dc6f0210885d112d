//! Built-in sweeps and TOML grid files.

use crate::error::{ConfigError, CoreError, GridError};
use crate::experiment::ExperimentFamily;
use crate::grid::{Axis, AxisValue, JobGrid};
use serde::Deserialize;
use std::path::Path;

/// Names of the built-in presets.
pub const PRESETS: [&str; 2] = ["standardized_var_penalty_comparison", "lorentz_mlp_encoding"];

/// `<program> run <family>`.
pub fn run_command(program: &str, family: ExperimentFamily) -> String {
    format!("{program} run {}", family.cli_name())
}

/// Build a built-in preset by name.
pub fn preset(name: &str, program: &str) -> Result<JobGrid, CoreError> {
    match name {
        "standardized_var_penalty_comparison" => Ok(penalty_comparison(program)?),
        "lorentz_mlp_encoding" => Ok(lorenz_encoding(program)?),
        _ => Err(ConfigError::UnknownPreset {
            name: name.to_string(),
        }
        .into()),
    }
}

/// Penalty comparison on a standardized VAR: 3 × 51 × 3 × 5 runs.
fn penalty_comparison(program: &str) -> Result<JobGrid, GridError> {
    let lam = Axis::geomspace("lam", 10.0, 0.001, 50)?.with_appended([AxisValue::Float(0.0)]);
    Ok(JobGrid::new(
        "standardized_var_penalty_comparison",
        &run_command(program, ExperimentFamily::StandardizedVarMlp),
    )
    .axis(Axis::texts("penalty", &["group_lasso", "hierarchical", "stacked"]))
    .axis(lam)
    .axis(Axis::ints("seed", &[0]))
    .axis(Axis::ints("hidden", &[10]))
    .axis(Axis::ints("network_lag", &[5, 10, 20]))
    .axis(Axis::ints("nepoch", &[30000]))
    .axis(Axis::floats("lr", &[0.01]))
    .axis(Axis::floats("weight_decay", &[0.01]))
    .axis(Axis::floats("sparsity", &[0.3]))
    .axis(Axis::ints("p", &[20]))
    .axis(Axis::ints("T", &[750]))
    .axis(Axis::ints("lag", &[2]))
    .axis(Axis::ints("data_seed", &[0, 1, 2, 3, 4]))
    .with_flag_order(&[
        "lam",
        "seed",
        "hidden",
        "network_lag",
        "nepoch",
        "lr",
        "weight_decay",
        "penalty",
        "sparsity",
        "p",
        "T",
        "lag",
        "data_seed",
    ]))
}

/// MLP encoding of Lorenz-96 trajectories: 51 × 2 × 3 × 3 × 5 runs.
fn lorenz_encoding(program: &str) -> Result<JobGrid, GridError> {
    let lam = Axis::geomspace("lam", 1.0, 0.01, 50)?.with_appended([AxisValue::Float(0.0)]);
    Ok(JobGrid::new(
        "lorentz_mlp_encoding",
        &run_command(program, ExperimentFamily::LorenzMlp),
    )
    .axis(lam)
    .axis(Axis::ints("seed", &[0]))
    .axis(Axis::ints("hidden", &[10]))
    .axis(Axis::ints("network_lag", &[5]))
    .axis(Axis::ints("nepoch", &[30000]))
    .axis(Axis::floats("lr", &[0.01]))
    .axis(Axis::floats("weight_decay", &[0.01]))
    .axis(Axis::floats("FC", &[10.0, 40.0]))
    .axis(Axis::floats("sd", &[2.0]))
    .axis(Axis::floats("dt", &[0.05]))
    .axis(Axis::ints("p", &[10, 20, 30]))
    .axis(Axis::ints("T", &[500, 750, 1000]))
    .axis(Axis::ints("data_seed", &[0, 1, 2, 3, 4])))
}

/// A sweep described in TOML.
///
/// ```toml
/// label = "my_sweep"
/// family = "standardized-var-mlp"
/// [[axes]]
/// name = "lam"
/// geomspace = { start = 10.0, stop = 0.001, num = 50 }
/// append = [0.0]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GridFile {
    pub label: String,
    /// Family whose runner each line invokes.
    #[serde(default)]
    pub family: Option<String>,
    /// Full base command; overrides `family`.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub flag_order: Option<Vec<String>>,
    pub axes: Vec<AxisSpec>,
}

/// One axis of a [`GridFile`].
#[derive(Debug, Clone, Deserialize)]
pub struct AxisSpec {
    pub name: String,
    #[serde(flatten)]
    pub source: AxisSource,
    #[serde(default)]
    pub append: Vec<AxisValue>,
}

/// How an axis' values are produced.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisSource {
    Values(Vec<AxisValue>),
    Geomspace { start: f64, stop: f64, num: usize },
    Linspace { start: f64, stop: f64, num: usize },
}

impl GridFile {
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(text)?)
    }

    /// Resolve into a validated [`JobGrid`].
    pub fn into_grid(self, program: &str) -> Result<JobGrid, CoreError> {
        let base_command = match (self.command, self.family) {
            (Some(command), _) => command,
            (None, Some(family)) => run_command(program, family.parse::<ExperimentFamily>()?),
            (None, None) => {
                return Err(ConfigError::invalid(
                    "family",
                    "a grid file needs either `family` or `command`",
                )
                .into());
            }
        };

        let mut grid = JobGrid::new(&self.label, &base_command);
        for spec in self.axes {
            let axis = match spec.source {
                AxisSource::Values(values) => Axis::new(&spec.name, values),
                AxisSource::Geomspace { start, stop, num } => {
                    Axis::geomspace(&spec.name, start, stop, num)?
                }
                AxisSource::Linspace { start, stop, num } => {
                    Axis::linspace(&spec.name, start, stop, num)?
                }
            };
            grid = grid.axis(axis.with_appended(spec.append));
        }
        grid.flag_order = self.flag_order;
        grid.validate()?;
        Ok(grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_penalty_comparison_size_and_first_line() {
        let grid = preset("standardized_var_penalty_comparison", "neuralgc").unwrap();
        assert_eq!(grid.len(), 3 * 51 * 3 * 5);
        let lines = grid.render_lines().unwrap();
        assert_eq!(lines.len(), 2295);
        assert_eq!(
            lines[0],
            "neuralgc run standardized-var-mlp --lam=1.000000e+01 --seed=0 --hidden=10 \
             --network_lag=5 --nepoch=30000 --lr=1.000000e-02 --weight_decay=1.000000e-02 \
             --penalty=group_lasso --sparsity=3.000000e-01 --p=20 --T=750 --lag=2 --data_seed=0"
        );
        // Penalty is the outermost axis.
        assert!(lines[2294].contains("--penalty=stacked"));
        assert!(lines[2294].contains("--lam=0.000000e+00"));
    }

    #[test]
    fn test_lorenz_preset_size() {
        let grid = preset("lorentz_mlp_encoding", "neuralgc").unwrap();
        assert_eq!(grid.len(), 51 * 2 * 3 * 3 * 5);
        let lines = grid.render_lines().unwrap();
        assert!(lines[0].starts_with("neuralgc run lorenz-mlp --lam=1.000000e+00"));
        assert!(lines[0].contains("--FC=1.000000e+01"));
    }

    #[test]
    fn test_unknown_preset() {
        assert!(preset("nope", "neuralgc").is_err());
    }

    #[test]
    fn test_grid_file_parse() {
        let file = GridFile::parse(
            r#"
label = "quick"
family = "long-var-mlp"

[[axes]]
name = "lam"
geomspace = { start = 1.0, stop = 0.01, num = 3 }
append = [0.0]

[[axes]]
name = "seed"
values = [1, 2]
"#,
        )
        .unwrap();
        let grid = file.into_grid("ngc").unwrap();
        assert_eq!(grid.len(), 8);
        let lines = grid.render_lines().unwrap();
        assert_eq!(lines[0], "ngc run long-var-mlp --lam=1.000000e+00 --seed=1");
        assert_eq!(lines[7], "ngc run long-var-mlp --lam=0.000000e+00 --seed=2");
    }

    #[test]
    fn test_grid_file_requires_base_command() {
        let file = GridFile::parse(
            r#"
label = "x"
[[axes]]
name = "seed"
values = [1]
"#,
        )
        .unwrap();
        assert!(file.into_grid("ngc").is_err());
    }

    #[test]
    fn test_grid_file_unknown_family() {
        let file = GridFile::parse(
            r#"
label = "x"
family = "transformer"
[[axes]]
name = "seed"
values = [1]
"#,
        )
        .unwrap();
        assert!(matches!(
            file.into_grid("ngc"),
            Err(CoreError::Config(ConfigError::UnknownFamily { .. }))
        ));
    }
}
