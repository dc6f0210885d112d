//! The persisted result bundle of one completed run.

use crate::training::TrainingOutcome;
use chrono::{DateTime, Utc};
use neuralgc_core::{DataParams, ExperimentConfig, TrainingParams};
use serde::{Deserialize, Serialize};

/// Data parameters plus the true GC matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    #[serde(flatten)]
    pub params: DataParams,
    #[serde(rename = "GC_true")]
    pub gc_true: Vec<Vec<u8>>,
}

/// Training curves and the selected checkpoint of every output.
///
/// Per-output vectors are indexed by output series; predictions are
/// `n × p` row-major (one row per sample).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResults {
    pub check_epochs: Vec<usize>,
    pub train_loss: Vec<Vec<f64>>,
    pub train_objective: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val_loss: Option<Vec<Vec<f64>>>,
    pub best_nepoch: Vec<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_val_loss: Option<Vec<f64>>,
    pub best_objective: Vec<f64>,
    pub predictions_train: Vec<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions_val: Option<Vec<Vec<f64>>>,
    /// Row = target series, column = input series.
    #[serde(rename = "GC_est")]
    pub gc_est: Vec<Vec<f64>>,
}

impl BestResults {
    pub fn from_outcome(outcome: &TrainingOutcome) -> Self {
        let best = &outcome.best;
        let val_loss = outcome
            .checks
            .iter()
            .map(|c| c.val_loss.clone())
            .collect::<Option<Vec<_>>>()
            .filter(|v| !v.is_empty());
        let best_val_loss = best.iter().map(|c| c.val_loss).collect::<Option<Vec<_>>>();
        let predictions_val = best
            .iter()
            .map(|c| c.predictions_val.as_deref())
            .collect::<Option<Vec<_>>>()
            .map(|columns| transpose(&columns));
        let train_columns: Vec<&[f64]> =
            best.iter().map(|c| c.predictions_train.as_slice()).collect();

        Self {
            check_epochs: outcome.checks.iter().map(|c| c.epoch).collect(),
            train_loss: outcome.checks.iter().map(|c| c.train_loss.clone()).collect(),
            train_objective: outcome
                .checks
                .iter()
                .map(|c| c.train_objective.clone())
                .collect(),
            val_loss,
            best_nepoch: best.iter().map(|c| c.epoch).collect(),
            best_val_loss,
            best_objective: best.iter().map(|c| c.train_objective).collect(),
            predictions_train: transpose(&train_columns),
            predictions_val,
            gc_est: best.iter().map(|c| c.gc_row.clone()).collect(),
        }
    }
}

/// Per-output columns to sample rows.
fn transpose(columns: &[&[f64]]) -> Vec<Vec<f64>> {
    let rows = columns.iter().map(|c| c.len()).min().unwrap_or(0);
    (0..rows)
        .map(|r| columns.iter().map(|c| c[r]).collect())
        .collect()
}

/// Where and when a bundle was produced. Not part of the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub identity: String,
    pub identity_sha256: String,
    pub family: String,
    pub version: String,
    pub platform: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl Provenance {
    pub fn new(config: &ExperimentConfig, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        let identity = config.identity();
        Self {
            identity: identity.to_string(),
            identity_sha256: identity.digest(),
            family: config.family().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            started_at,
            finished_at,
            duration_secs: (finished_at - started_at)
                .to_std()
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        }
    }
}

/// Everything a completed run leaves behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultBundle {
    pub experiment_params: TrainingParams,
    pub data_params: DataSnapshot,
    pub best_results: BestResults,
    pub provenance: Provenance,
}

impl ResultBundle {
    /// The bundle without its provenance, for comparing two runs.
    pub fn content(&self) -> (&TrainingParams, &DataSnapshot, &BestResults) {
        (&self.experiment_params, &self.data_params, &self.best_results)
    }
}
