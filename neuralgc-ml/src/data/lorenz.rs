//! Lorenz-96 trajectories.

use crate::data::SyntheticSeries;
use crate::error::MlError;
use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Samples integrated and discarded before the returned series starts.
pub const BURN_IN: usize = 1000;
/// RK4 substeps per sampling interval `dt`.
const SUBSTEPS: usize = 10;
const INITIAL_SD: f64 = 0.01;

#[derive(Debug, Clone, PartialEq)]
pub struct LorenzSpec {
    pub p: usize,
    pub t: usize,
    pub forcing: f64,
    pub dt: f64,
    pub sd: f64,
}

/// Integrate Lorenz-96 and observe it with additive Gaussian noise.
///
/// `series` holds the noisy observations, `auxiliary` the clean trajectory.
/// Series `i` is driven by `i-2`, `i-1`, `i` and `i+1` (indices mod `p`).
pub fn simulate_lorenz_96<R: Rng>(
    spec: &LorenzSpec,
    rng: &mut R,
) -> Result<SyntheticSeries, MlError> {
    let LorenzSpec { p, t, .. } = *spec;
    if p < 4 {
        return Err(MlError::data(format!("Lorenz-96 needs p >= 4 (got {p})")));
    }
    if !(spec.dt > 0.0 && spec.dt.is_finite()) {
        return Err(MlError::data(format!("invalid step dt = {}", spec.dt)));
    }

    let initial = Normal::new(0.0, INITIAL_SD)
        .map_err(|e| MlError::data(format!("invalid initial sd: {e}")))?;
    let noise = Normal::new(0.0, spec.sd)
        .map_err(|e| MlError::data(format!("invalid noise sd {}: {e}", spec.sd)))?;

    let h = spec.dt / SUBSTEPS as f64;
    let mut state = Array1::from_shape_fn(p, |_| initial.sample(rng));
    let mut clean = Array2::<f64>::zeros((t, p));
    for sample in 0..(BURN_IN + t) {
        for _ in 0..SUBSTEPS {
            state = rk4_step(&state, h, spec.forcing);
        }
        if state.iter().any(|v| !v.is_finite()) {
            return Err(MlError::data(format!(
                "Lorenz-96 integration diverged at sample {sample} (dt = {})",
                spec.dt
            )));
        }
        if sample >= BURN_IN {
            clean.row_mut(sample - BURN_IN).assign(&state);
        }
    }

    let series = &clean + &Array2::from_shape_fn((t, p), |_| noise.sample(rng));

    let mut gc = Array2::<u8>::zeros((p, p));
    for i in 0..p {
        gc[[i, i]] = 1;
        gc[[i, (i + 1) % p]] = 1;
        gc[[i, (i + p - 1) % p]] = 1;
        gc[[i, (i + p - 2) % p]] = 1;
    }

    Ok(SyntheticSeries {
        series,
        auxiliary: clean,
        gc,
    })
}

fn derivative(x: &Array1<f64>, forcing: f64) -> Array1<f64> {
    let p = x.len();
    Array1::from_shape_fn(p, |i| {
        (x[(i + 1) % p] - x[(i + p - 2) % p]) * x[(i + p - 1) % p] - x[i] + forcing
    })
}

fn rk4_step(x: &Array1<f64>, h: f64, forcing: f64) -> Array1<f64> {
    let k1 = derivative(x, forcing);
    let k2 = derivative(&(x + &(&k1 * (h / 2.0))), forcing);
    let k3 = derivative(&(x + &(&k2 * (h / 2.0))), forcing);
    let k4 = derivative(&(x + &(&k3 * h)), forcing);
    x + &((k1 + &(k2 * 2.0) + &(k3 * 2.0) + &k4) * (h / 6.0))
}
