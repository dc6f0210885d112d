//! Error types for the neuralgc core library.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering experiment configuration, job grids, and persistence.

use std::path::PathBuf;

/// Top-level error type for the core library.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Grid error: {0}")]
    Grid(#[from] GridError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Grid file parse error: {0}")]
    GridFile(#[from] toml::de::Error),
}

/// Errors raised while building or validating an experiment configuration.
///
/// These are surfaced at startup, before anything touches the filesystem.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown experiment family: {name}")]
    UnknownFamily { name: String },

    #[error("Unknown penalty type: {name} (expected group_lasso, hierarchical or stacked)")]
    UnknownPenalty { name: String },

    #[error("Invalid cooldown flag: {value} (expected Y or N)")]
    InvalidCooldown { value: String },

    #[error("Unknown grid preset: {name}")]
    UnknownPreset { name: String },
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from job-grid construction and batch-file output.
#[derive(Debug, thiserror::Error)]
pub enum GridError {
    #[error("Axis '{name}' has no values")]
    EmptyAxis { name: String },

    #[error("Axis '{name}' appears more than once")]
    DuplicateAxis { name: String },

    #[error("Invalid sequence for axis '{name}': {reason}")]
    InvalidSequence { name: String, reason: String },

    #[error("Flag order does not match the grid axes: {reason}")]
    FlagOrder { reason: String },

    #[error("Grid '{label}' has no axes")]
    NoAxes { label: String },

    #[error("Invalid job label '{label}': {reason}")]
    InvalidLabel { label: String, reason: String },

    #[error("Could not allocate a batch file name under {dir}")]
    BatchNameExhausted { dir: PathBuf },
}

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
