//! Sparse vector-autoregressive series with known Granger structure.

use crate::error::MlError;
use crate::data::SyntheticSeries;
use ndarray::{Array1, Array2, s};
use rand::Rng;
use rand::seq::index;
use rand_distr::{Distribution, Normal};

/// Samples simulated and discarded before the returned series starts.
pub const BURN_IN: usize = 100;

/// Radius the shrinking loop must get below.
const STABLE_RADIUS: f64 = 0.97;
const SHRINK_FACTOR: f64 = 0.95;
/// Radius a standardized model is rescaled to.
const TARGET_RADIUS: f64 = 0.95;
const MAX_RESCALES: usize = 1000;
const RADIUS_TOLERANCE: f64 = 1e-9;
const SQUARINGS: usize = 12;

/// Which lags carry a nonzero coefficient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagStructure {
    /// Every lag `1..=lag`.
    Full,
    /// Only lag `lag`; nearer lags are zero.
    LongLag,
}

/// How the coefficients are brought to a stable regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scaling {
    /// Multiply by 0.95 until the spectral radius is below 0.97.
    Shrink,
    /// Rescale so the spectral radius is 0.95.
    Standardized,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarSpec {
    pub p: usize,
    pub t: usize,
    pub lag: usize,
    pub sparsity: f64,
    pub beta_value: f64,
    pub sd: f64,
    pub structure: LagStructure,
    pub scaling: Scaling,
}

/// Simulate a VAR(`lag`) series.
///
/// Returns the series (`T × p`), the coefficients (`p × p·lag`, column
/// `k·p + j` is input `j` at lag `k + 1`) and the `p × p` GC matrix.
pub fn simulate_var<R: Rng>(spec: &VarSpec, rng: &mut R) -> Result<SyntheticSeries, MlError> {
    let VarSpec { p, t, lag, .. } = *spec;
    if p < 2 || lag == 0 || t == 0 {
        return Err(MlError::data(format!(
            "VAR needs p >= 2, lag >= 1 and T >= 1 (got p = {p}, lag = {lag}, T = {t})"
        )));
    }
    let per_row = ((p as f64) * spec.sparsity).floor() as usize;
    if per_row == 0 || per_row > p {
        return Err(MlError::data(format!(
            "sparsity {} selects {per_row} inputs per series",
            spec.sparsity
        )));
    }

    let mut gc = Array2::<u8>::zeros((p, p));
    for i in 0..p {
        gc[[i, i]] = 1;
        for other in index::sample(rng, p - 1, per_row - 1) {
            let j = if other >= i { other + 1 } else { other };
            gc[[i, j]] = 1;
        }
    }

    let mut coef = Array2::<f64>::zeros((p, p * lag));
    let lags: Vec<usize> = match spec.structure {
        LagStructure::Full => (0..lag).collect(),
        LagStructure::LongLag => vec![lag - 1],
    };
    for ((i, j), &edge) in gc.indexed_iter() {
        if edge == 1 {
            for &k in &lags {
                coef[[i, k * p + j]] = spec.beta_value;
            }
        }
    }

    rescale(&mut coef, p, lag, spec.structure, spec.scaling)?;

    let noise = Normal::new(0.0, spec.sd)
        .map_err(|e| MlError::data(format!("invalid noise sd {}: {e}", spec.sd)))?;
    let total = t + BURN_IN;
    let mut x = Array2::<f64>::zeros((total, p));
    for row in 0..total {
        let mut next = Array1::from_shape_fn(p, |_| noise.sample(rng));
        if row >= lag {
            for k in 0..lag {
                let block = coef.slice(s![.., k * p..(k + 1) * p]);
                next += &block.dot(&x.row(row - 1 - k));
            }
        }
        x.row_mut(row).assign(&next);
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(MlError::data("VAR simulation diverged"));
    }

    Ok(SyntheticSeries {
        series: x.slice(s![BURN_IN.., ..]).to_owned(),
        auxiliary: coef,
        gc,
    })
}

fn rescale(
    coef: &mut Array2<f64>,
    p: usize,
    lag: usize,
    structure: LagStructure,
    scaling: Scaling,
) -> Result<(), MlError> {
    match scaling {
        Scaling::Shrink => shrink(coef, p, lag),
        Scaling::Standardized => standardize(coef, p, lag, structure),
    }
}

fn shrink(coef: &mut Array2<f64>, p: usize, lag: usize) -> Result<(), MlError> {
    for _ in 0..MAX_RESCALES {
        let radius = spectral_radius(&companion(coef, p, lag));
        if radius < STABLE_RADIUS {
            return Ok(());
        }
        coef.mapv_inplace(|c| c * SHRINK_FACTOR);
    }
    Err(MlError::data("could not bring VAR coefficients to a stable radius"))
}

/// Scale `coef` so the companion radius equals [`TARGET_RADIUS`].
///
/// Newton steps in log space: scaling the coefficients by `s` moves the
/// radius by roughly `s^slope`. With only lag `lag` populated the slope is
/// exactly `1/lag`, so one step suffices; otherwise the slope is
/// re-estimated from the last step (secant).
fn standardize(
    coef: &mut Array2<f64>,
    p: usize,
    lag: usize,
    structure: LagStructure,
) -> Result<(), MlError> {
    let min_slope = 1.0 / lag as f64;
    let mut slope = match structure {
        LagStructure::LongLag => min_slope,
        LagStructure::Full => 1.0,
    };
    let mut radius = spectral_radius(&companion(coef, p, lag));
    for _ in 0..MAX_RESCALES {
        if radius == 0.0 || (radius - TARGET_RADIUS).abs() < RADIUS_TOLERANCE {
            return Ok(());
        }
        let log_step = (TARGET_RADIUS / radius).ln() / slope;
        let factor = log_step.exp();
        coef.mapv_inplace(|c| c * factor);

        let next = spectral_radius(&companion(coef, p, lag));
        if log_step.abs() > f64::EPSILON && next > 0.0 {
            slope = ((next / radius).ln() / log_step).clamp(min_slope, 1.0);
        }
        radius = next;
    }
    Err(MlError::data(format!(
        "could not standardize VAR coefficients (radius {radius})"
    )))
}

/// Companion matrix of a VAR(`lag`) with `p` series.
fn companion(coef: &Array2<f64>, p: usize, lag: usize) -> Array2<f64> {
    let n = p * lag;
    let mut m = Array2::<f64>::zeros((n, n));
    m.slice_mut(s![..p, ..]).assign(coef);
    for i in p..n {
        m[[i, i - p]] = 1.0;
    }
    m
}

/// Spectral radius via Gelfand's formula, `ρ(A) = lim ‖A^(2^k)‖^(1/2^k)`.
///
/// Each squaring is renormalized and the scale is tracked in log space.
pub fn spectral_radius(matrix: &Array2<f64>) -> f64 {
    let norm = frobenius(matrix);
    if norm == 0.0 {
        return 0.0;
    }
    let mut m = matrix / norm;
    let mut log_scale = norm.ln();
    let mut power = 1.0_f64;
    for _ in 0..SQUARINGS {
        let squared = m.dot(&m);
        let n = frobenius(&squared);
        if n == 0.0 {
            // Nilpotent.
            return 0.0;
        }
        m = squared / n;
        log_scale = 2.0 * log_scale + n.ln();
        power *= 2.0;
    }
    (log_scale / power).exp()
}

fn frobenius(matrix: &Array2<f64>) -> f64 {
    matrix.iter().map(|v| v * v).sum::<f64>().sqrt()
}
