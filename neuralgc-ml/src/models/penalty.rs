//! Group penalties on an input-layer weight matrix and their proximal
//! operators.
//!
//! The first-layer weights are `hidden × (p·lag)`; input `i` owns columns
//! `i·lag .. (i+1)·lag`, with column `i·lag + k` carrying lag `k + 1`.

use ndarray::{Array2, ArrayViewMut2, s};
use neuralgc_core::Penalty;

/// Penalty value summed over all inputs (not yet scaled by `lam`).
pub fn penalty_value(penalty: Penalty, w: &Array2<f64>, lag: usize) -> f64 {
    let inputs = w.ncols() / lag;
    let norm = |from: usize, to: usize| frobenius(w.slice(s![.., from..to]).iter());
    (0..inputs)
        .map(|i| {
            let start = i * lag;
            let end = start + lag;
            match penalty {
                Penalty::GroupLasso => norm(start, end),
                Penalty::Hierarchical => (0..lag).map(|k| norm(start + k, end)).sum(),
                Penalty::Stacked => {
                    (0..lag).map(|k| norm(start + k, start + k + 1)).sum::<f64>()
                        + norm(start, end)
                }
            }
        })
        .sum()
}

/// Apply the proximal operator with threshold `threshold = lr·lam` in place.
pub fn apply_prox(penalty: Penalty, w: &mut Array2<f64>, lag: usize, threshold: f64) {
    let inputs = w.ncols() / lag;
    for i in 0..inputs {
        let start = i * lag;
        let end = start + lag;
        match penalty {
            Penalty::GroupLasso => shrink(w.slice_mut(s![.., start..end]), threshold),
            Penalty::Hierarchical => {
                // Innermost (farthest-lag) group first.
                for k in (0..lag).rev() {
                    shrink(w.slice_mut(s![.., start + k..end]), threshold);
                }
            }
            Penalty::Stacked => {
                for k in 0..lag {
                    shrink(w.slice_mut(s![.., start + k..start + k + 1]), threshold);
                }
                shrink(w.slice_mut(s![.., start..end]), threshold);
            }
        }
    }
}

/// Group soft-thresholding: `v ← v · max(0, 1 − t/‖v‖)`.
pub fn shrink(mut group: ArrayViewMut2<'_, f64>, threshold: f64) {
    let norm = frobenius(group.iter());
    let scale = if norm > threshold {
        1.0 - threshold / norm
    } else {
        0.0
    };
    group.mapv_inplace(|v| v * scale);
}

/// Frobenius norm of each input group, one entry per input series.
pub fn group_norms(w: &Array2<f64>, lag: usize) -> Vec<f64> {
    (0..w.ncols() / lag)
        .map(|i| frobenius(w.slice(s![.., i * lag..(i + 1) * lag]).iter()))
        .collect()
}

fn frobenius<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    values.map(|v| v * v).sum::<f64>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn weights() -> Array2<f64> {
        // Two inputs, lag 2: columns [in0 lag1, in0 lag2, in1 lag1, in1 lag2].
        array![[3.0, 0.0, 0.1, 0.0], [4.0, 0.0, 0.0, 0.1]]
    }

    #[test]
    fn test_group_norms() {
        let norms = group_norms(&weights(), 2);
        assert!((norms[0] - 5.0).abs() < 1e-12);
        assert!((norms[1] - 0.02_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_group_lasso_zeroes_small_groups() {
        let mut w = weights();
        apply_prox(Penalty::GroupLasso, &mut w, 2, 1.0);
        let norms = group_norms(&w, 2);
        assert!((norms[0] - 4.0).abs() < 1e-12);
        assert_eq!(norms[1], 0.0);
    }

    #[test]
    fn test_hierarchical_shrinks_far_lag_harder() {
        let mut w = array![[1.0, 1.0]];
        apply_prox(Penalty::Hierarchical, &mut w, 2, 0.5);
        // Far lag is in both groups, near lag only in the outer one.
        assert!(w[[0, 1]] < w[[0, 0]]);
        assert!(w[[0, 0]] > 0.0);
    }

    #[test]
    fn test_stacked_zeroes_each_lag_independently() {
        let mut w = array![[2.0, 0.2]];
        apply_prox(Penalty::Stacked, &mut w, 2, 0.5);
        assert_eq!(w[[0, 1]], 0.0);
        assert!(w[[0, 0]] > 0.0);
    }

    #[test]
    fn test_penalty_values() {
        let w = array![[3.0, 4.0]];
        assert!((penalty_value(Penalty::GroupLasso, &w, 2) - 5.0).abs() < 1e-12);
        assert!((penalty_value(Penalty::Hierarchical, &w, 2) - 9.0).abs() < 1e-12);
        assert!((penalty_value(Penalty::Stacked, &w, 2) - 12.0).abs() < 1e-12);
    }
}
