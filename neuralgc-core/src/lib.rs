//! # neuralgc-core: experiment configuration, identities and job grids
//!
//! This crate holds everything about an experiment that can be decided
//! without touching data or models:
//!
//! - typed, validated configurations per experiment family ([`experiment`])
//! - the deterministic identity that names a run's result file ([`identity`])
//! - fixed `%e`/`%d` number rendering shared by identities and batch lines ([`format`])
//! - full-factorial job grids and batch files ([`grid`], [`presets`])
//! - layered runtime settings ([`config`]) and atomic persistence ([`persistence`])

pub mod config;
pub mod error;
pub mod experiment;
pub mod format;
pub mod grid;
pub mod identity;
pub mod persistence;
pub mod presets;

// Re-exports
pub use config::{Settings, SettingsOverrides, load_settings};
pub use error::{ConfigError, CoreError, GridError};
pub use experiment::{
    Cooldown, DataParams, ExperimentConfig, ExperimentFamily, ExperimentKind, LorenzData,
    LstmTraining, MlpTraining, Nonlinearity, OptimizerMode, Penalty, TrainingParams, VarData,
};
pub use grid::{Axis, AxisValue, JobGrid};
pub use identity::{IdentityKey, ResultPath};
