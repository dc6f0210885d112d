//! Typed experiment configurations.
//!
//! Each experiment family has its own record of training and data-generation
//! parameters. A configuration is validated once, when [`ExperimentConfig::new`]
//! builds it, and is read-only afterwards.

use crate::error::ConfigError;
use crate::identity::{IdentityKey, ResultPath};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Noise level of the VAR families that do not expose `--sd`.
pub const FIXED_NOISE_SD: f64 = 1.0;
/// `data_seed` value meaning "derive the data seed from the model seed".
pub const DERIVED_DATA_SEED: i64 = -1;

/// Named category of experiments sharing a result directory and filename schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperimentFamily {
    /// MLP encoding on a VAR whose influence arrives at a long lag.
    LongVarMlp,
    /// MLP encoding on a standardized VAR, penalty comparison.
    StandardizedVarMlp,
    /// LSTM encoding on a standardized long-lag VAR.
    StandardizedVarLstm,
    /// MLP encoding on Lorenz-96 trajectories.
    LorenzMlp,
}

impl ExperimentFamily {
    pub const ALL: [ExperimentFamily; 4] = [
        ExperimentFamily::LongVarMlp,
        ExperimentFamily::StandardizedVarMlp,
        ExperimentFamily::StandardizedVarLstm,
        ExperimentFamily::LorenzMlp,
    ];

    /// Subcommand name used on the command line and in batch files.
    pub fn cli_name(&self) -> &'static str {
        match self {
            ExperimentFamily::LongVarMlp => "long-var-mlp",
            ExperimentFamily::StandardizedVarMlp => "standardized-var-mlp",
            ExperimentFamily::StandardizedVarLstm => "standardized-var-lstm",
            ExperimentFamily::LorenzMlp => "lorenz-mlp",
        }
    }

    /// Human-readable result directory name.
    pub fn directory_name(&self) -> &'static str {
        match self {
            ExperimentFamily::LongVarMlp => "Long VAR MLP Encoding",
            ExperimentFamily::StandardizedVarMlp => "Standardized VAR MLP Encoding",
            ExperimentFamily::StandardizedVarLstm => "Standardized Long VAR LSTM Encoding",
            ExperimentFamily::LorenzMlp => "Lorenz MLP Encoding",
        }
    }

    pub fn optimizer(&self) -> OptimizerMode {
        match self {
            ExperimentFamily::LongVarMlp | ExperimentFamily::StandardizedVarLstm => {
                OptimizerMode::Prox
            }
            ExperimentFamily::StandardizedVarMlp | ExperimentFamily::LorenzMlp => {
                OptimizerMode::Line
            }
        }
    }

    pub fn nonlinearity(&self) -> Nonlinearity {
        match self {
            ExperimentFamily::LongVarMlp => Nonlinearity::Relu,
            ExperimentFamily::StandardizedVarMlp
            | ExperimentFamily::LorenzMlp
            | ExperimentFamily::StandardizedVarLstm => Nonlinearity::Sigmoid,
        }
    }

    /// Fraction of the series held out (from the end) for validation.
    pub fn validation_fraction(&self) -> f64 {
        match self {
            ExperimentFamily::LongVarMlp | ExperimentFamily::StandardizedVarLstm => 0.1,
            ExperimentFamily::StandardizedVarMlp | ExperimentFamily::LorenzMlp => 0.0,
        }
    }
}

impl fmt::Display for ExperimentFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl FromStr for ExperimentFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExperimentFamily::ALL
            .into_iter()
            .find(|f| f.cli_name() == s)
            .ok_or_else(|| ConfigError::UnknownFamily { name: s.to_string() })
    }
}

/// Sparsity-inducing penalty on each input's first-layer weight group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Penalty {
    /// One group per input series.
    GroupLasso,
    /// Nested lag groups; distant lags are shrunk hardest.
    #[default]
    Hierarchical,
    /// Per-lag groups followed by the whole input group.
    Stacked,
}

impl fmt::Display for Penalty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Penalty::GroupLasso => write!(f, "group_lasso"),
            Penalty::Hierarchical => write!(f, "hierarchical"),
            Penalty::Stacked => write!(f, "stacked"),
        }
    }
}

impl FromStr for Penalty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "group_lasso" => Ok(Penalty::GroupLasso),
            "hierarchical" => Ok(Penalty::Hierarchical),
            "stacked" => Ok(Penalty::Stacked),
            _ => Err(ConfigError::UnknownPenalty { name: s.to_string() }),
        }
    }
}

/// Learning-rate cooldown switch, spelled `Y`/`N` on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cooldown {
    #[default]
    #[serde(rename = "N")]
    Off,
    #[serde(rename = "Y")]
    On,
}

impl Cooldown {
    pub fn is_on(&self) -> bool {
        matches!(self, Cooldown::On)
    }
}

impl fmt::Display for Cooldown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cooldown::Off => write!(f, "N"),
            Cooldown::On => write!(f, "Y"),
        }
    }
}

impl FromStr for Cooldown {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(Cooldown::On),
            "n" | "no" => Ok(Cooldown::Off),
            _ => Err(ConfigError::InvalidCooldown {
                value: s.to_string(),
            }),
        }
    }
}

/// How the optimizer applies the penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerMode {
    /// Gradient step followed by the proximal operator.
    Prox,
    /// Proximal step with backtracking line search.
    Line,
}

/// Hidden-layer activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Nonlinearity {
    Relu,
    Sigmoid,
    Tanh,
}

/// Training parameters of a feed-forward (MLP) encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlpTraining {
    pub nepoch: usize,
    pub lr: f64,
    pub lam: f64,
    pub seed: u64,
    pub hidden: usize,
    pub network_lag: usize,
    pub penalty: Penalty,
    pub weight_decay: f64,
    pub loss_check: usize,
}

/// Training parameters of a recurrent (LSTM) encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmTraining {
    pub nepoch: usize,
    pub lr: f64,
    pub lam: f64,
    pub seed: u64,
    pub hidden: usize,
    pub cooldown: Cooldown,
    pub window: usize,
    pub stride: usize,
    pub truncation: Option<usize>,
    pub loss_check: usize,
}

/// Parameters of a synthetic VAR series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarData {
    pub sparsity: f64,
    pub p: usize,
    #[serde(rename = "T")]
    pub t: usize,
    pub lag: usize,
    pub sd: f64,
    /// `-1` means "draw fresh data".
    pub data_seed: i64,
}

/// Parameters of a Lorenz-96 trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LorenzData {
    #[serde(rename = "FC")]
    pub forcing: f64,
    pub sd: f64,
    pub dt: f64,
    pub p: usize,
    #[serde(rename = "T")]
    pub t: usize,
    pub data_seed: i64,
}

/// Snapshot of the model/training parameter group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TrainingParams {
    Mlp(MlpTraining),
    Lstm(LstmTraining),
}

/// Snapshot of the data-generation parameter group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataParams {
    Var(VarData),
    Lorenz(LorenzData),
}

/// Unvalidated configuration, tagged by family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "kebab-case")]
pub enum ExperimentKind {
    LongVarMlp { training: MlpTraining, data: VarData },
    StandardizedVarMlp { training: MlpTraining, data: VarData },
    StandardizedVarLstm { training: LstmTraining, data: VarData },
    LorenzMlp { training: MlpTraining, data: LorenzData },
}

/// A validated, immutable experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExperimentConfig {
    kind: ExperimentKind,
}

impl ExperimentConfig {
    /// Validate `kind` and wrap it. This is the only way to build a config.
    pub fn new(kind: ExperimentKind) -> Result<Self, ConfigError> {
        validate(&kind)?;
        Ok(Self { kind })
    }

    pub fn kind(&self) -> &ExperimentKind {
        &self.kind
    }

    pub fn family(&self) -> ExperimentFamily {
        match &self.kind {
            ExperimentKind::LongVarMlp { .. } => ExperimentFamily::LongVarMlp,
            ExperimentKind::StandardizedVarMlp { .. } => ExperimentFamily::StandardizedVarMlp,
            ExperimentKind::StandardizedVarLstm { .. } => ExperimentFamily::StandardizedVarLstm,
            ExperimentKind::LorenzMlp { .. } => ExperimentFamily::LorenzMlp,
        }
    }

    pub fn nepoch(&self) -> usize {
        match &self.kind {
            ExperimentKind::LongVarMlp { training, .. }
            | ExperimentKind::StandardizedVarMlp { training, .. }
            | ExperimentKind::LorenzMlp { training, .. } => training.nepoch,
            ExperimentKind::StandardizedVarLstm { training, .. } => training.nepoch,
        }
    }

    /// Seed for the model's random state; `seed = 0` deliberately leaves it unfixed.
    pub fn model_seed(&self) -> Option<u64> {
        let seed = match &self.kind {
            ExperimentKind::LongVarMlp { training, .. }
            | ExperimentKind::StandardizedVarMlp { training, .. }
            | ExperimentKind::LorenzMlp { training, .. } => training.seed,
            ExperimentKind::StandardizedVarLstm { training, .. } => training.seed,
        };
        (seed != 0).then_some(seed)
    }

    /// Explicit data seed; `-1` (and families without the flag) yield `None`.
    pub fn data_seed(&self) -> Option<u64> {
        let seed = match &self.kind {
            ExperimentKind::StandardizedVarMlp { data, .. } => data.data_seed,
            ExperimentKind::LorenzMlp { data, .. } => data.data_seed,
            ExperimentKind::LongVarMlp { .. } | ExperimentKind::StandardizedVarLstm { .. } => -1,
        };
        u64::try_from(seed).ok()
    }

    pub fn training_params(&self) -> TrainingParams {
        match &self.kind {
            ExperimentKind::LongVarMlp { training, .. }
            | ExperimentKind::StandardizedVarMlp { training, .. }
            | ExperimentKind::LorenzMlp { training, .. } => TrainingParams::Mlp(training.clone()),
            ExperimentKind::StandardizedVarLstm { training, .. } => {
                TrainingParams::Lstm(training.clone())
            }
        }
    }

    pub fn data_params(&self) -> DataParams {
        match &self.kind {
            ExperimentKind::LongVarMlp { data, .. }
            | ExperimentKind::StandardizedVarMlp { data, .. }
            | ExperimentKind::StandardizedVarLstm { data, .. } => DataParams::Var(data.clone()),
            ExperimentKind::LorenzMlp { data, .. } => DataParams::Lorenz(data.clone()),
        }
    }

    /// The run's identity key. Field order is fixed per family.
    pub fn identity(&self) -> IdentityKey {
        let b = IdentityKey::builder();
        match &self.kind {
            ExperimentKind::LongVarMlp { training: m, data: d } => b
                .uint("nepoch", m.nepoch as u64)
                .float("lr", m.lr)
                .float("lam", m.lam)
                .uint("seed", m.seed)
                .uint("hidden", m.hidden as u64)
                .uint("networklag", m.network_lag as u64)
                .float("spars", d.sparsity)
                .uint("p", d.p as u64)
                .uint("T", d.t as u64)
                .uint("lag", d.lag as u64)
                .build(),
            ExperimentKind::StandardizedVarMlp { training: m, data: d } => b
                .uint("nepoch", m.nepoch as u64)
                .float("lr", m.lr)
                .float("wd", m.weight_decay)
                .float("lam", m.lam)
                .uint("seed", m.seed)
                .uint("hidden", m.hidden as u64)
                .uint("networklag", m.network_lag as u64)
                .text("penalty", m.penalty)
                .float("spars", d.sparsity)
                .uint("p", d.p as u64)
                .uint("T", d.t as u64)
                .uint("lag", d.lag as u64)
                .int("dseed", d.data_seed)
                .float("sd", d.sd)
                .build(),
            ExperimentKind::StandardizedVarLstm { training: m, data: d } => b
                .uint("nepoch", m.nepoch as u64)
                .float("lr", m.lr)
                .text("cooldown", m.cooldown)
                .float("lam", m.lam)
                .uint("seed", m.seed)
                .uint("hidden", m.hidden as u64)
                .uint("window", m.window as u64)
                .uint("stride", m.stride as u64)
                .text(
                    "trunc",
                    m.truncation
                        .map_or_else(|| "none".to_string(), |t| t.to_string()),
                )
                .float("spars", d.sparsity)
                .uint("p", d.p as u64)
                .uint("T", d.t as u64)
                .uint("lag", d.lag as u64)
                .build(),
            ExperimentKind::LorenzMlp { training: m, data: d } => b
                .uint("nepoch", m.nepoch as u64)
                .float("lr", m.lr)
                .float("wd", m.weight_decay)
                .float("lam", m.lam)
                .uint("seed", m.seed)
                .uint("hidden", m.hidden as u64)
                .uint("networklag", m.network_lag as u64)
                .text("penalty", m.penalty)
                .float("FC", d.forcing)
                .float("sd", d.sd)
                .float("dt", d.dt)
                .uint("p", d.p as u64)
                .uint("T", d.t as u64)
                .int("dseed", d.data_seed)
                .build(),
        }
    }

    /// Where this run's result bundle lives under `results_root`.
    pub fn result_path(&self, results_root: &Path) -> ResultPath {
        ResultPath::new(
            results_root,
            self.family().directory_name(),
            self.identity(),
        )
    }
}

fn validate(kind: &ExperimentKind) -> Result<(), ConfigError> {
    match kind {
        ExperimentKind::LongVarMlp { training, data } => {
            validate_mlp(training)?;
            validate_var(data)?;
            // Not part of this family's identity, so they must not vary.
            fixed("penalty", training.penalty == Penalty::GroupLasso, "group_lasso")?;
            fixed("weight_decay", training.weight_decay == 0.0, "0")?;
            fixed_var_noise(data)?;
            require_samples(data.t, training.network_lag, 0.1)
        }
        ExperimentKind::StandardizedVarMlp { training, data } => {
            validate_mlp(training)?;
            validate_var(data)?;
            require_samples(data.t, training.network_lag, 0.0)
        }
        ExperimentKind::StandardizedVarLstm { training, data } => {
            validate_lstm(training)?;
            validate_var(data)?;
            fixed_var_noise(data)?;
            // One-step-ahead pairs need at least two training rows.
            require_samples(data.t, 1, 0.1)
        }
        ExperimentKind::LorenzMlp { training, data } => {
            validate_mlp(training)?;
            validate_lorenz(data)?;
            require_samples(data.t, training.network_lag, 0.0)
        }
    }
}

fn validate_mlp(m: &MlpTraining) -> Result<(), ConfigError> {
    at_least("nepoch", m.nepoch, 1)?;
    positive("lr", m.lr)?;
    non_negative("lam", m.lam)?;
    seed_in_range(m.seed)?;
    at_least("hidden", m.hidden, 1)?;
    at_least("network_lag", m.network_lag, 1)?;
    non_negative("weight_decay", m.weight_decay)?;
    at_least("loss_check", m.loss_check, 1)
}

fn validate_lstm(m: &LstmTraining) -> Result<(), ConfigError> {
    at_least("nepoch", m.nepoch, 1)?;
    positive("lr", m.lr)?;
    non_negative("lam", m.lam)?;
    seed_in_range(m.seed)?;
    at_least("hidden", m.hidden, 1)?;
    at_least("window", m.window, 2)?;
    at_least("stride", m.stride, 1)?;
    if let Some(truncation) = m.truncation {
        at_least("truncation", truncation, 1)?;
    }
    at_least("loss_check", m.loss_check, 1)
}

fn validate_var(d: &VarData) -> Result<(), ConfigError> {
    finite("sparsity", d.sparsity)?;
    if d.sparsity <= 0.0 || d.sparsity > 1.0 {
        return Err(ConfigError::invalid("sparsity", "must lie in (0, 1]"));
    }
    at_least("p", d.p, 2)?;
    if ((d.p as f64) * d.sparsity).floor() < 1.0 {
        return Err(ConfigError::invalid(
            "sparsity",
            format!("p * sparsity must be at least 1 (p = {})", d.p),
        ));
    }
    at_least("lag", d.lag, 1)?;
    positive("sd", d.sd)?;
    data_seed_in_range(d.data_seed)
}

fn validate_lorenz(d: &LorenzData) -> Result<(), ConfigError> {
    finite("FC", d.forcing)?;
    positive("sd", d.sd)?;
    positive("dt", d.dt)?;
    // Lorenz-96 couples i-2, i-1, i and i+1, which must be distinct series.
    at_least("p", d.p, 4)?;
    data_seed_in_range(d.data_seed)
}

fn fixed_var_noise(d: &VarData) -> Result<(), ConfigError> {
    fixed("sd", d.sd == FIXED_NOISE_SD, "1")?;
    fixed("data_seed", d.data_seed == DERIVED_DATA_SEED, "-1")
}

fn fixed(field: &str, holds: bool, value: &str) -> Result<(), ConfigError> {
    if holds {
        Ok(())
    } else {
        Err(ConfigError::invalid(
            field,
            format!("is fixed at {value} for this experiment family"),
        ))
    }
}

/// Require at least two training rows once `lag` rows are consumed by lag
/// windows and `validation` of the rest is held out.
fn require_samples(t: usize, lag: usize, validation: f64) -> Result<(), ConfigError> {
    let rows = t.saturating_sub(lag);
    let held_out = ((rows as f64) * validation).floor() as usize;
    if rows.saturating_sub(held_out) < 2 {
        return Err(ConfigError::invalid(
            "T",
            format!("series of length {t} leaves fewer than two training samples"),
        ));
    }
    Ok(())
}

fn finite(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be a finite number"))
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must be positive"))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    finite(field, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, "must not be negative"))
    }
}

fn at_least(field: &str, value: usize, min: usize) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("must be at least {min}")))
    }
}

fn seed_in_range(seed: u64) -> Result<(), ConfigError> {
    if i64::try_from(seed).is_ok() {
        Ok(())
    } else {
        Err(ConfigError::invalid("seed", "must fit in a signed 64-bit integer"))
    }
}

fn data_seed_in_range(seed: i64) -> Result<(), ConfigError> {
    if seed >= -1 {
        Ok(())
    } else {
        Err(ConfigError::invalid("data_seed", "must be -1 or a non-negative seed"))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn mlp_training() -> MlpTraining {
        MlpTraining {
            nepoch: 1000,
            lr: 0.001,
            lam: 0.1,
            seed: 12345,
            hidden: 10,
            network_lag: 5,
            penalty: Penalty::Hierarchical,
            weight_decay: 0.01,
            loss_check: 10,
        }
    }

    pub(crate) fn var_data() -> VarData {
        VarData {
            sparsity: 0.3,
            p: 10,
            t: 500,
            lag: 1,
            sd: 2.0,
            data_seed: -1,
        }
    }

    fn standardized() -> ExperimentConfig {
        ExperimentConfig::new(ExperimentKind::StandardizedVarMlp {
            training: mlp_training(),
            data: var_data(),
        })
        .unwrap()
    }

    #[test]
    fn test_standardized_identity_layout() {
        assert_eq!(
            standardized().identity().to_string(),
            "expt_nepoch=1000_lr=1.000000e-03_wd=1.000000e-02_lam=1.000000e-01_seed=12345\
             _hidden=10_networklag=5_penalty=hierarchical_spars=3.000000e-01_p=10_T=500_lag=1\
             _dseed=-1_sd=2.000000e+00"
        );
    }

    fn long_var_training() -> MlpTraining {
        MlpTraining {
            penalty: Penalty::GroupLasso,
            weight_decay: 0.0,
            ..mlp_training()
        }
    }

    fn fixed_noise_data() -> VarData {
        VarData {
            sd: FIXED_NOISE_SD,
            data_seed: DERIVED_DATA_SEED,
            lag: 2,
            ..var_data()
        }
    }

    fn lstm_training() -> LstmTraining {
        LstmTraining {
            nepoch: 10,
            lr: 0.001,
            lam: 0.1,
            seed: 1,
            hidden: 4,
            cooldown: Cooldown::On,
            window: 20,
            stride: 10,
            truncation: None,
            loss_check: 5,
        }
    }

    fn lorenz_data() -> LorenzData {
        LorenzData {
            forcing: 10.0,
            sd: 0.1,
            dt: 0.05,
            p: 10,
            t: 100,
            data_seed: -1,
        }
    }

    fn mlp_variants(m: &MlpTraining) -> Vec<(&'static str, MlpTraining)> {
        let other_penalty = if m.penalty == Penalty::Stacked {
            Penalty::GroupLasso
        } else {
            Penalty::Stacked
        };
        vec![
            ("nepoch", MlpTraining { nepoch: m.nepoch + 1, ..m.clone() }),
            ("lr", MlpTraining { lr: m.lr * 2.0, ..m.clone() }),
            ("lam", MlpTraining { lam: m.lam * 2.0, ..m.clone() }),
            ("seed", MlpTraining { seed: m.seed + 1, ..m.clone() }),
            ("hidden", MlpTraining { hidden: m.hidden + 1, ..m.clone() }),
            ("network_lag", MlpTraining { network_lag: m.network_lag + 1, ..m.clone() }),
            ("penalty", MlpTraining { penalty: other_penalty, ..m.clone() }),
            ("weight_decay", MlpTraining { weight_decay: m.weight_decay + 0.5, ..m.clone() }),
        ]
    }

    fn var_variants(d: &VarData) -> Vec<(&'static str, VarData)> {
        vec![
            ("sparsity", VarData { sparsity: 0.5, ..d.clone() }),
            ("p", VarData { p: d.p + 2, ..d.clone() }),
            ("T", VarData { t: d.t + 10, ..d.clone() }),
            ("lag", VarData { lag: d.lag + 1, ..d.clone() }),
            ("sd", VarData { sd: d.sd + 1.0, ..d.clone() }),
            ("data_seed", VarData { data_seed: d.data_seed + 2, ..d.clone() }),
        ]
    }

    fn lorenz_variants(d: &LorenzData) -> Vec<(&'static str, LorenzData)> {
        vec![
            ("FC", LorenzData { forcing: d.forcing + 1.0, ..d.clone() }),
            ("sd", LorenzData { sd: d.sd * 2.0, ..d.clone() }),
            ("dt", LorenzData { dt: d.dt * 2.0, ..d.clone() }),
            ("p", LorenzData { p: d.p + 1, ..d.clone() }),
            ("T", LorenzData { t: d.t + 10, ..d.clone() }),
            ("data_seed", LorenzData { data_seed: d.data_seed + 2, ..d.clone() }),
        ]
    }

    fn lstm_variants(m: &LstmTraining) -> Vec<(&'static str, LstmTraining)> {
        let other_cooldown = if m.cooldown.is_on() { Cooldown::Off } else { Cooldown::On };
        let other_truncation = if m.truncation.is_some() { None } else { Some(3) };
        vec![
            ("nepoch", LstmTraining { nepoch: m.nepoch + 1, ..m.clone() }),
            ("lr", LstmTraining { lr: m.lr * 2.0, ..m.clone() }),
            ("lam", LstmTraining { lam: m.lam * 2.0, ..m.clone() }),
            ("seed", LstmTraining { seed: m.seed + 1, ..m.clone() }),
            ("hidden", LstmTraining { hidden: m.hidden + 1, ..m.clone() }),
            ("cooldown", LstmTraining { cooldown: other_cooldown, ..m.clone() }),
            ("window", LstmTraining { window: m.window + 1, ..m.clone() }),
            ("stride", LstmTraining { stride: m.stride + 1, ..m.clone() }),
            ("truncation", LstmTraining { truncation: other_truncation, ..m.clone() }),
        ]
    }

    /// Each variant must either fail validation or move to a new identity.
    fn assert_each_field_separates(base: ExperimentKind, variants: Vec<(&str, ExperimentKind)>) {
        let base = ExperimentConfig::new(base).unwrap().identity();
        for (field, kind) in variants {
            if let Ok(config) = ExperimentConfig::new(kind) {
                assert_ne!(config.identity(), base, "changing {field} kept the identity");
            }
        }
    }

    #[test]
    fn test_long_var_fields_separate_identities() {
        let (m, d) = (long_var_training(), fixed_noise_data());
        let mut variants = Vec::new();
        for (field, training) in mlp_variants(&m) {
            variants.push((field, ExperimentKind::LongVarMlp { training, data: d.clone() }));
        }
        for (field, data) in var_variants(&d) {
            variants.push((field, ExperimentKind::LongVarMlp { training: m.clone(), data }));
        }
        assert_each_field_separates(ExperimentKind::LongVarMlp { training: m, data: d }, variants);
    }

    #[test]
    fn test_standardized_var_fields_separate_identities() {
        let (m, d) = (mlp_training(), var_data());
        let mut variants = Vec::new();
        for (field, training) in mlp_variants(&m) {
            variants.push((field, ExperimentKind::StandardizedVarMlp { training, data: d.clone() }));
        }
        for (field, data) in var_variants(&d) {
            variants.push((field, ExperimentKind::StandardizedVarMlp { training: m.clone(), data }));
        }
        assert_each_field_separates(
            ExperimentKind::StandardizedVarMlp { training: m, data: d },
            variants,
        );
    }

    #[test]
    fn test_lstm_fields_separate_identities() {
        let (m, d) = (lstm_training(), VarData { t: 100, ..fixed_noise_data() });
        let mut variants = Vec::new();
        for (field, training) in lstm_variants(&m) {
            variants.push((field, ExperimentKind::StandardizedVarLstm { training, data: d.clone() }));
        }
        for (field, data) in var_variants(&d) {
            variants.push((field, ExperimentKind::StandardizedVarLstm { training: m.clone(), data }));
        }
        assert_each_field_separates(
            ExperimentKind::StandardizedVarLstm { training: m, data: d },
            variants,
        );
    }

    #[test]
    fn test_lorenz_fields_separate_identities() {
        let (m, d) = (mlp_training(), lorenz_data());
        let mut variants = Vec::new();
        for (field, training) in mlp_variants(&m) {
            variants.push((field, ExperimentKind::LorenzMlp { training, data: d.clone() }));
        }
        for (field, data) in lorenz_variants(&d) {
            variants.push((field, ExperimentKind::LorenzMlp { training: m.clone(), data }));
        }
        assert_each_field_separates(ExperimentKind::LorenzMlp { training: m, data: d }, variants);
    }

    #[test]
    fn test_long_var_rejects_untracked_settings() {
        let stacked = MlpTraining {
            penalty: Penalty::Stacked,
            ..long_var_training()
        };
        let decayed = MlpTraining {
            weight_decay: 0.01,
            ..long_var_training()
        };
        for training in [stacked, decayed] {
            let err = ExperimentConfig::new(ExperimentKind::LongVarMlp {
                training,
                data: fixed_noise_data(),
            })
            .unwrap_err();
            assert!(err.to_string().contains("is fixed at"));
        }

        let noisy = VarData {
            sd: 5.0,
            ..fixed_noise_data()
        };
        let seeded = VarData {
            data_seed: 3,
            ..fixed_noise_data()
        };
        for data in [noisy, seeded] {
            assert!(
                ExperimentConfig::new(ExperimentKind::LongVarMlp {
                    training: long_var_training(),
                    data: data.clone(),
                })
                .is_err()
            );
            assert!(
                ExperimentConfig::new(ExperimentKind::StandardizedVarLstm {
                    training: lstm_training(),
                    data: VarData { t: 100, ..data },
                })
                .is_err()
            );
        }
    }

    #[test]
    fn test_loss_check_is_incidental() {
        let a = standardized();
        let b = ExperimentConfig::new(ExperimentKind::StandardizedVarMlp {
            training: MlpTraining {
                loss_check: 50,
                ..mlp_training()
            },
            data: var_data(),
        })
        .unwrap();
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn test_long_var_identity_excludes_fixed_fields() {
        let cfg = ExperimentConfig::new(ExperimentKind::LongVarMlp {
            training: long_var_training(),
            data: fixed_noise_data(),
        })
        .unwrap();
        let id = cfg.identity();
        assert!(id.get("penalty").is_none());
        assert!(id.get("dseed").is_none());
        assert_eq!(id.get("networklag"), Some("5"));
    }

    #[test]
    fn test_lstm_identity_truncation_token() {
        let training = lstm_training();
        let data = VarData {
            t: 100,
            ..fixed_noise_data()
        };
        let cfg = ExperimentConfig::new(ExperimentKind::StandardizedVarLstm {
            training: training.clone(),
            data: data.clone(),
        })
        .unwrap();
        assert_eq!(cfg.identity().get("trunc"), Some("none"));
        assert_eq!(cfg.identity().get("cooldown"), Some("Y"));

        let truncated = ExperimentConfig::new(ExperimentKind::StandardizedVarLstm {
            training: LstmTraining {
                truncation: Some(5),
                ..training
            },
            data,
        })
        .unwrap();
        assert_eq!(truncated.identity().get("trunc"), Some("5"));
    }

    #[test]
    fn test_equal_configs_share_identity() {
        assert_eq!(standardized().identity(), standardized().identity());
    }

    #[test]
    fn test_differing_fields_change_identity() {
        let base = standardized().identity();
        let mut training = mlp_training();
        training.penalty = Penalty::Stacked;
        let other = ExperimentConfig::new(ExperimentKind::StandardizedVarMlp {
            training,
            data: var_data(),
        })
        .unwrap();
        assert_ne!(base, other.identity());
    }

    #[test]
    fn test_seed_sentinels() {
        assert_eq!(standardized().model_seed(), Some(12345));
        assert_eq!(standardized().data_seed(), None);

        let mut training = mlp_training();
        training.seed = 0;
        let mut data = var_data();
        data.data_seed = 3;
        let cfg = ExperimentConfig::new(ExperimentKind::StandardizedVarMlp { training, data })
            .unwrap();
        assert_eq!(cfg.model_seed(), None);
        assert_eq!(cfg.data_seed(), Some(3));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut training = mlp_training();
        training.lr = 0.0;
        let err = ExperimentConfig::new(ExperimentKind::StandardizedVarMlp {
            training,
            data: var_data(),
        })
        .unwrap_err();
        assert!(err.to_string().contains("'lr'"));

        let mut data = var_data();
        data.sparsity = 0.05;
        assert!(
            ExperimentConfig::new(ExperimentKind::StandardizedVarMlp {
                training: mlp_training(),
                data,
            })
            .is_err()
        );

        let mut data = var_data();
        data.data_seed = -2;
        assert!(
            ExperimentConfig::new(ExperimentKind::StandardizedVarMlp {
                training: mlp_training(),
                data,
            })
            .is_err()
        );

        let mut data = var_data();
        data.t = 6;
        assert!(
            ExperimentConfig::new(ExperimentKind::StandardizedVarMlp {
                training: mlp_training(),
                data,
            })
            .is_err()
        );
    }

    #[test]
    fn test_lorenz_requires_four_series() {
        let data = LorenzData {
            forcing: 10.0,
            sd: 0.1,
            dt: 0.05,
            p: 3,
            t: 100,
            data_seed: 0,
        };
        assert!(
            ExperimentConfig::new(ExperimentKind::LorenzMlp {
                training: mlp_training(),
                data,
            })
            .is_err()
        );
    }

    #[test]
    fn test_family_names_roundtrip() {
        for family in ExperimentFamily::ALL {
            assert_eq!(family.cli_name().parse::<ExperimentFamily>().unwrap(), family);
        }
        assert!("nope".parse::<ExperimentFamily>().is_err());
    }

    #[test]
    fn test_penalty_and_cooldown_parsing() {
        assert_eq!("stacked".parse::<Penalty>().unwrap(), Penalty::Stacked);
        assert!("lasso".parse::<Penalty>().is_err());
        assert_eq!("y".parse::<Cooldown>().unwrap(), Cooldown::On);
        assert_eq!("N".parse::<Cooldown>().unwrap(), Cooldown::Off);
        assert!("maybe".parse::<Cooldown>().is_err());
    }

    #[test]
    fn test_snapshot_serializes_flag_names() {
        let json = serde_json::to_value(standardized().data_params()).unwrap();
        assert_eq!(json["T"], 500);
        assert_eq!(json["data_seed"], -1);
        let json = serde_json::to_value(standardized()).unwrap();
        assert_eq!(json["family"], "standardized-var-mlp");
    }
}
