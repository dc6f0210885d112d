//! Synthetic series with known Granger-causal structure, and their
//! formatting into model inputs.

pub mod format;
pub mod lorenz;
pub mod var;

use ndarray::Array2;

pub use format::{LaggedData, LaggedSet, format_ts_data, normalize, shift_pairs, split_data};
pub use lorenz::{LorenzSpec, simulate_lorenz_96};
pub use var::{LagStructure, Scaling, VarSpec, simulate_var};

/// A simulated series together with its ground truth.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSeries {
    /// Observations, `T × p`.
    pub series: Array2<f64>,
    /// VAR coefficients or the noiseless Lorenz trajectory.
    pub auxiliary: Array2<f64>,
    /// `GC[i][j] = 1` when series `j` drives series `i`.
    pub gc: Array2<u8>,
}

impl SyntheticSeries {
    pub fn p(&self) -> usize {
        self.series.ncols()
    }

    pub fn gc_rows(&self) -> Vec<Vec<u8>> {
        self.gc.outer_iter().map(|row| row.to_vec()).collect()
    }
}
