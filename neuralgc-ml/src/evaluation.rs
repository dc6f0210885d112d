//! Scoring an estimated GC matrix against the truth.

use crate::error::MlError;
use crate::results::ResultBundle;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// AUROC of `GC_est` against `GC_true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcEvaluation {
    pub p: usize,
    /// Over all `p²` entries; `None` when the truth has a single class.
    pub auroc: Option<f64>,
    /// Over the `p² − p` cross-series entries.
    pub auroc_off_diagonal: Option<f64>,
    pub true_edges: usize,
}

/// Area under the ROC curve via the Mann-Whitney statistic, with tied
/// scores sharing their average rank.
pub fn auroc(scores: &[f64], labels: &[bool]) -> Option<f64> {
    if scores.len() != labels.len() {
        return None;
    }
    let positives = labels.iter().filter(|&&l| l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // Ranks start..end (1-based) share their mean.
        let rank = (start + end + 1) as f64 / 2.0;
        rank_sum += rank * order[start..end].iter().filter(|&&i| labels[i]).count() as f64;
        start = end;
    }

    let pos = positives as f64;
    Some((rank_sum - pos * (pos + 1.0) / 2.0) / (pos * negatives as f64))
}

/// Compare an estimated matrix against the 0/1 truth.
pub fn evaluate_gc(gc_true: &[Vec<u8>], gc_est: &[Vec<f64>]) -> Result<GcEvaluation, MlError> {
    let p = gc_true.len();
    if !is_square(gc_true, p) || !is_square(gc_est, p) {
        return Err(MlError::invalid_input(format!(
            "GC matrices must both be {p} x {p}"
        )));
    }

    let mut all = (Vec::new(), Vec::new());
    let mut off = (Vec::new(), Vec::new());
    for i in 0..p {
        for j in 0..p {
            let score = gc_est[i][j];
            let label = gc_true[i][j] != 0;
            all.0.push(score);
            all.1.push(label);
            if i != j {
                off.0.push(score);
                off.1.push(label);
            }
        }
    }

    Ok(GcEvaluation {
        p,
        auroc: auroc(&all.0, &all.1),
        auroc_off_diagonal: auroc(&off.0, &off.1),
        true_edges: all.1.iter().filter(|&&l| l).count(),
    })
}

fn is_square<T>(matrix: &[Vec<T>], p: usize) -> bool {
    matrix.len() == p && matrix.iter().all(|row| row.len() == p)
}

/// Score a persisted bundle.
pub fn evaluate_bundle(bundle: &ResultBundle) -> Result<GcEvaluation, MlError> {
    evaluate_gc(&bundle.data_params.gc_true, &bundle.best_results.gc_est)
}

/// Load a bundle written by the runner.
pub fn load_bundle(path: &Path) -> Result<ResultBundle, MlError> {
    neuralgc_core::persistence::load_json(path)?.ok_or_else(|| {
        MlError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no result file at {}", path.display()),
        ))
    })
}
