//! Per-family flags of `neuralgc run`.
//!
//! Flag names keep the spelling used in batch files (`--network_lag`,
//! `--weight_decay`, `--data_seed`, `--T`, `--FC`), so every line a grid
//! writes parses back here unchanged.

use clap::{Args, Subcommand};
use neuralgc_core::experiment::{DERIVED_DATA_SEED, FIXED_NOISE_SD};
use neuralgc_core::{
    ConfigError, Cooldown, ExperimentConfig, ExperimentFamily, ExperimentKind, LorenzData,
    LstmTraining, MlpTraining, Penalty, VarData,
};
use std::fmt;
use std::str::FromStr;

/// Sampling interval of the loss curve for families without a `--loss_check` flag.
const FIXED_LOSS_CHECK: usize = 10;

#[derive(Subcommand, Debug, Clone)]
pub enum RunFamily {
    /// MLP encoding of a VAR whose influence arrives at a long lag
    LongVarMlp(LongVarMlpArgs),
    /// MLP encoding of a standardized VAR
    StandardizedVarMlp(StandardizedVarMlpArgs),
    /// LSTM encoding of a standardized long-lag VAR
    StandardizedVarLstm(StandardizedVarLstmArgs),
    /// MLP encoding of Lorenz-96 trajectories
    LorenzMlp(LorenzMlpArgs),
}

impl RunFamily {
    pub fn family(&self) -> ExperimentFamily {
        match self {
            RunFamily::LongVarMlp(_) => ExperimentFamily::LongVarMlp,
            RunFamily::StandardizedVarMlp(_) => ExperimentFamily::StandardizedVarMlp,
            RunFamily::StandardizedVarLstm(_) => ExperimentFamily::StandardizedVarLstm,
            RunFamily::LorenzMlp(_) => ExperimentFamily::LorenzMlp,
        }
    }

    /// Validate the flags into a configuration.
    pub fn into_config(self) -> Result<ExperimentConfig, ConfigError> {
        let kind = match self {
            RunFamily::LongVarMlp(a) => a.into_kind(),
            RunFamily::StandardizedVarMlp(a) => a.into_kind(),
            RunFamily::StandardizedVarLstm(a) => a.into_kind(),
            RunFamily::LorenzMlp(a) => a.into_kind(),
        };
        ExperimentConfig::new(kind)
    }
}

#[derive(Args, Debug, Clone)]
pub struct LongVarMlpArgs {
    /// Number of training epochs
    #[arg(long, default_value_t = 1000)]
    pub nepoch: usize,
    /// Learning rate
    #[arg(long, default_value_t = 0.001)]
    pub lr: f64,
    /// Penalty strength
    #[arg(long, default_value_t = 0.1)]
    pub lam: f64,
    /// Model seed (0 leaves it unfixed)
    #[arg(long, default_value_t = 12345)]
    pub seed: u64,
    /// Hidden units
    #[arg(long, default_value_t = 10)]
    pub hidden: usize,
    /// Lag considered by the MLP
    #[arg(long = "network_lag", default_value_t = 5)]
    pub network_lag: usize,
    /// Fraction of inputs driving each series
    #[arg(long, default_value_t = 0.2)]
    pub sparsity: f64,
    /// Dimensionality of the series
    #[arg(long, default_value_t = 10)]
    pub p: usize,
    /// Length of the series
    #[arg(long = "T", default_value_t = 1000)]
    pub t: usize,
    /// Lag of the VAR model
    #[arg(long, default_value_t = 2)]
    pub lag: usize,
}

impl LongVarMlpArgs {
    fn into_kind(self) -> ExperimentKind {
        ExperimentKind::LongVarMlp {
            training: MlpTraining {
                nepoch: self.nepoch,
                lr: self.lr,
                lam: self.lam,
                seed: self.seed,
                hidden: self.hidden,
                network_lag: self.network_lag,
                penalty: Penalty::GroupLasso,
                weight_decay: 0.0,
                loss_check: FIXED_LOSS_CHECK,
            },
            data: VarData {
                sparsity: self.sparsity,
                p: self.p,
                t: self.t,
                lag: self.lag,
                sd: FIXED_NOISE_SD,
                data_seed: DERIVED_DATA_SEED,
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StandardizedVarMlpArgs {
    /// Penalty strength
    #[arg(long, default_value_t = 0.1)]
    pub lam: f64,
    /// Model seed (0 leaves it unfixed)
    #[arg(long, default_value_t = 12345)]
    pub seed: u64,
    /// Hidden units
    #[arg(long, default_value_t = 10)]
    pub hidden: usize,
    /// Lag considered by the MLP
    #[arg(long = "network_lag", default_value_t = 5)]
    pub network_lag: usize,
    /// Penalty type: group_lasso, hierarchical or stacked
    #[arg(long, default_value_t = Penalty::Hierarchical)]
    pub penalty: Penalty,
    /// Number of training epochs
    #[arg(long, default_value_t = 1000)]
    pub nepoch: usize,
    /// Learning rate
    #[arg(long, default_value_t = 0.001)]
    pub lr: f64,
    /// Ridge penalty on the outgoing weights
    #[arg(long = "weight_decay", default_value_t = 0.01)]
    pub weight_decay: f64,
    /// Seed for data generation (-1 derives it from the model seed)
    #[arg(long = "data_seed", default_value_t = -1, allow_negative_numbers = true)]
    pub data_seed: i64,
    /// Fraction of inputs driving each series
    #[arg(long, default_value_t = 0.3)]
    pub sparsity: f64,
    /// Dimensionality of the series
    #[arg(long, default_value_t = 10)]
    pub p: usize,
    /// Length of the series
    #[arg(long = "T", default_value_t = 500)]
    pub t: usize,
    /// Lag of the VAR model
    #[arg(long, default_value_t = 1)]
    pub lag: usize,
    /// Standard deviation of the noise
    #[arg(long, default_value_t = 2.0)]
    pub sd: f64,
    /// Interval between loss checks
    #[arg(long = "loss_check", default_value_t = 10)]
    pub loss_check: usize,
}

impl StandardizedVarMlpArgs {
    fn into_kind(self) -> ExperimentKind {
        ExperimentKind::StandardizedVarMlp {
            training: MlpTraining {
                nepoch: self.nepoch,
                lr: self.lr,
                lam: self.lam,
                seed: self.seed,
                hidden: self.hidden,
                network_lag: self.network_lag,
                penalty: self.penalty,
                weight_decay: self.weight_decay,
                loss_check: self.loss_check,
            },
            data: VarData {
                sparsity: self.sparsity,
                p: self.p,
                t: self.t,
                lag: self.lag,
                sd: self.sd,
                data_seed: self.data_seed,
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct StandardizedVarLstmArgs {
    /// Penalty strength
    #[arg(long, default_value_t = 0.1)]
    pub lam: f64,
    /// Model seed (0 leaves it unfixed)
    #[arg(long, default_value_t = 12345)]
    pub seed: u64,
    /// Hidden units
    #[arg(long, default_value_t = 10)]
    pub hidden: usize,
    /// Number of training epochs
    #[arg(long, default_value_t = 1000)]
    pub nepoch: usize,
    /// Learning rate
    #[arg(long, default_value_t = 0.001)]
    pub lr: f64,
    /// Halve the learning rate when a check does not improve (Y/N)
    #[arg(long, default_value_t = Cooldown::Off)]
    pub cooldown: Cooldown,
    /// Fraction of inputs driving each series
    #[arg(long, default_value_t = 0.2)]
    pub sparsity: f64,
    /// Dimensionality of the series
    #[arg(long, default_value_t = 10)]
    pub p: usize,
    /// Length of the series
    #[arg(long = "T", default_value_t = 1000)]
    pub t: usize,
    /// Lag of the VAR model
    #[arg(long, default_value_t = 1)]
    pub lag: usize,
    /// Length of the training windows
    #[arg(long, default_value_t = 20)]
    pub window: usize,
    /// Offset between consecutive windows
    #[arg(long, default_value_t = 10)]
    pub stride: usize,
    /// Length of gradient truncation, or `none`
    #[arg(long, default_value_t = Truncation(None))]
    pub truncation: Truncation,
    /// Interval between loss checks
    #[arg(long = "loss_check", default_value_t = 10)]
    pub loss_check: usize,
}

impl StandardizedVarLstmArgs {
    fn into_kind(self) -> ExperimentKind {
        ExperimentKind::StandardizedVarLstm {
            training: LstmTraining {
                nepoch: self.nepoch,
                lr: self.lr,
                lam: self.lam,
                seed: self.seed,
                hidden: self.hidden,
                cooldown: self.cooldown,
                window: self.window,
                stride: self.stride,
                truncation: self.truncation.0,
                loss_check: self.loss_check,
            },
            data: VarData {
                sparsity: self.sparsity,
                p: self.p,
                t: self.t,
                lag: self.lag,
                sd: FIXED_NOISE_SD,
                data_seed: DERIVED_DATA_SEED,
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct LorenzMlpArgs {
    /// Penalty strength
    #[arg(long, default_value_t = 0.1)]
    pub lam: f64,
    /// Model seed (0 leaves it unfixed)
    #[arg(long, default_value_t = 12345)]
    pub seed: u64,
    /// Hidden units
    #[arg(long, default_value_t = 10)]
    pub hidden: usize,
    /// Lag considered by the MLP
    #[arg(long = "network_lag", default_value_t = 5)]
    pub network_lag: usize,
    /// Penalty type: group_lasso, hierarchical or stacked
    #[arg(long, default_value_t = Penalty::Hierarchical)]
    pub penalty: Penalty,
    /// Number of training epochs
    #[arg(long, default_value_t = 1000)]
    pub nepoch: usize,
    /// Learning rate
    #[arg(long, default_value_t = 0.001)]
    pub lr: f64,
    /// Ridge penalty on the outgoing weights
    #[arg(long = "weight_decay", default_value_t = 0.01)]
    pub weight_decay: f64,
    /// Forcing constant
    #[arg(long = "FC", default_value_t = 10.0)]
    pub forcing: f64,
    /// Standard deviation of the observation noise
    #[arg(long, default_value_t = 0.1)]
    pub sd: f64,
    /// Sampling interval
    #[arg(long, default_value_t = 0.05)]
    pub dt: f64,
    /// Dimensionality of the series
    #[arg(long, default_value_t = 10)]
    pub p: usize,
    /// Length of the series
    #[arg(long = "T", default_value_t = 1000)]
    pub t: usize,
    /// Seed for data generation (-1 derives it from the model seed)
    #[arg(long = "data_seed", default_value_t = -1, allow_negative_numbers = true)]
    pub data_seed: i64,
    /// Interval between loss checks
    #[arg(long = "loss_check", default_value_t = 10)]
    pub loss_check: usize,
}

impl LorenzMlpArgs {
    fn into_kind(self) -> ExperimentKind {
        ExperimentKind::LorenzMlp {
            training: MlpTraining {
                nepoch: self.nepoch,
                lr: self.lr,
                lam: self.lam,
                seed: self.seed,
                hidden: self.hidden,
                network_lag: self.network_lag,
                penalty: self.penalty,
                weight_decay: self.weight_decay,
                loss_check: self.loss_check,
            },
            data: LorenzData {
                forcing: self.forcing,
                sd: self.sd,
                dt: self.dt,
                p: self.p,
                t: self.t,
                data_seed: self.data_seed,
            },
        }
    }
}

/// `--truncation=<n>` or `--truncation=none`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Truncation(pub Option<usize>);

impl fmt::Display for Truncation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(k) => write!(f, "{k}"),
            None => write!(f, "none"),
        }
    }
}

impl FromStr for Truncation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("none") {
            return Ok(Truncation(None));
        }
        s.parse::<usize>()
            .map(|k| Truncation(Some(k)))
            .map_err(|_| format!("expected a positive integer or `none`, got `{s}`"))
    }
}
