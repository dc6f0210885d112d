//! Turning a raw series into model inputs.

use crate::error::MlError;
use ndarray::{Array2, Axis, s};

/// Feature/target pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct LaggedSet {
    /// `n × features`.
    pub x: Array2<f64>,
    /// `n × p`.
    pub y: Array2<f64>,
}

impl LaggedSet {
    pub fn len(&self) -> usize {
        self.y.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.y.nrows() == 0
    }
}

/// Lagged training pairs and the optional held-out tail.
#[derive(Debug, Clone, PartialEq)]
pub struct LaggedData {
    pub lag: usize,
    pub train: LaggedSet,
    pub val: Option<LaggedSet>,
}

/// Zero mean, unit variance per column. Constant columns are only centered.
pub fn normalize(series: &Array2<f64>) -> Array2<f64> {
    let mut out = series.clone();
    if series.nrows() == 0 {
        return out;
    }
    for mut column in out.axis_iter_mut(Axis(1)) {
        let n = column.len() as f64;
        let mean = column.sum() / n;
        let sd = (column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
        if sd > 0.0 {
            column.mapv_inplace(|v| (v - mean) / sd);
        } else {
            column.mapv_inplace(|v| v - mean);
        }
    }
    out
}

/// Contiguous split; the last `⌊T·validation⌋` rows are held out.
pub fn split_data(series: &Array2<f64>, validation: f64) -> (Array2<f64>, Array2<f64>) {
    let held_out = held_out(series.nrows(), validation);
    let cut = series.nrows() - held_out;
    (
        series.slice(s![..cut, ..]).to_owned(),
        series.slice(s![cut.., ..]).to_owned(),
    )
}

fn held_out(rows: usize, validation: f64) -> usize {
    (((rows as f64) * validation.clamp(0.0, 1.0)).floor() as usize).min(rows)
}

/// Lag-window a series: row `t` of `x` holds `x[t-1], …, x[t-lag]` grouped by
/// input (column `i·lag + k` is series `i` at lag `k + 1`) and `y` holds `x[t]`.
///
/// The windowed rows are then split like [`split_data`]; an empty tail
/// yields `val = None`.
pub fn format_ts_data(
    series: &Array2<f64>,
    lag: usize,
    validation: f64,
) -> Result<LaggedData, MlError> {
    let (t, p) = series.dim();
    if lag == 0 || t <= lag {
        return Err(MlError::invalid_input(format!(
            "series of length {t} is too short for lag {lag}"
        )));
    }
    let rows = t - lag;
    let x = Array2::from_shape_fn((rows, p * lag), |(r, col)| {
        let (i, k) = (col / lag, col % lag);
        series[[r + lag - 1 - k, i]]
    });
    let y = series.slice(s![lag.., ..]).to_owned();

    let cut = rows - held_out(rows, validation);
    if cut == 0 {
        return Err(MlError::invalid_input("validation split leaves no training rows"));
    }
    let train = LaggedSet {
        x: x.slice(s![..cut, ..]).to_owned(),
        y: y.slice(s![..cut, ..]).to_owned(),
    };
    let val = (cut < rows).then(|| LaggedSet {
        x: x.slice(s![cut.., ..]).to_owned(),
        y: y.slice(s![cut.., ..]).to_owned(),
    });
    Ok(LaggedData { lag, train, val })
}

/// One-step-ahead pairs `(x[..T-1], x[1..])`; `None` if fewer than two rows.
pub fn shift_pairs(series: &Array2<f64>) -> Option<(Array2<f64>, Array2<f64>)> {
    let t = series.nrows();
    if t < 2 {
        return None;
    }
    Some((
        series.slice(s![..t - 1, ..]).to_owned(),
        series.slice(s![1.., ..]).to_owned(),
    ))
}
