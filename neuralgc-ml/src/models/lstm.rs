//! Recurrent encoding: one single-layer LSTM per output series.
//!
//! Every cell reads all `p` series. Gate pre-activations are stacked in the
//! order input, forget, cell, output, so `w_ih` is `4H × p` and column `i`
//! of `w_ih` is everything input `i` can contribute. Sparsity is a group
//! lasso over those columns.

use super::penalty::{apply_prox, group_norms, penalty_value};
use super::{Encoding, sigmoid};
use crate::error::MlError;
use ndarray::{Array1, Array2, ArrayView1, Axis, s};
use neuralgc_core::Penalty;
use rand::Rng;

/// An input sequence and its one-step-ahead targets, both `len × p`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub x: Array2<f64>,
    pub y: Array2<f64>,
}

/// Training windows cut from a sequence, plus the sequence itself for
/// predictions.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmData {
    windows: Vec<Sequence>,
    full: Sequence,
}

impl LstmData {
    /// Sliding windows of `window` steps every `stride` steps. A series
    /// shorter than one window becomes a single window.
    pub fn windowed(
        x: Array2<f64>,
        y: Array2<f64>,
        window: usize,
        stride: usize,
    ) -> Result<Self, MlError> {
        check_pair(&x, &y)?;
        if window == 0 || stride == 0 {
            return Err(MlError::invalid_input("window and stride must be positive"));
        }
        let len = x.nrows();
        let windows = if len <= window {
            vec![Sequence {
                x: x.clone(),
                y: y.clone(),
            }]
        } else {
            (0..=len - window)
                .step_by(stride)
                .map(|start| Sequence {
                    x: x.slice(s![start..start + window, ..]).to_owned(),
                    y: y.slice(s![start..start + window, ..]).to_owned(),
                })
                .collect()
        };
        Ok(Self {
            windows,
            full: Sequence { x, y },
        })
    }

    /// The whole sequence as its only window.
    pub fn sequence(x: Array2<f64>, y: Array2<f64>) -> Result<Self, MlError> {
        let len = x.nrows();
        Self::windowed(x, y, len.max(1), 1)
    }

    pub fn windows(&self) -> &[Sequence] {
        &self.windows
    }

    /// Steps in the full sequence.
    pub fn len(&self) -> usize {
        self.full.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.full.x.nrows() == 0
    }

    fn steps(&self) -> usize {
        self.windows.iter().map(|w| w.x.nrows()).sum()
    }
}

fn check_pair(x: &Array2<f64>, y: &Array2<f64>) -> Result<(), MlError> {
    if x.nrows() != y.nrows() || x.nrows() == 0 {
        return Err(MlError::invalid_input(format!(
            "sequence inputs ({}) and targets ({}) must be non-empty and aligned",
            x.nrows(),
            y.nrows()
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct LstmSpec {
    pub inputs: usize,
    pub outputs: usize,
    pub hidden: usize,
    pub lam: f64,
    /// Back-propagate through at most this many steps.
    pub truncation: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
struct Cell {
    w_ih: Array2<f64>,
    w_hh: Array2<f64>,
    b: Array1<f64>,
    w_out: Array1<f64>,
    b_out: f64,
}

struct StepCache {
    /// Activated gates `[i, f, g, o]`.
    gates: Array1<f64>,
    c_prev: Array1<f64>,
    tanh_c: Array1<f64>,
    h_prev: Array1<f64>,
    h: Array1<f64>,
}

impl Cell {
    fn new<R: Rng>(inputs: usize, hidden: usize, rng: &mut R) -> Self {
        let bound = 1.0 / (hidden as f64).sqrt();
        let mut uniform = || rng.gen_range(-bound..bound);
        Self {
            w_ih: Array2::from_shape_simple_fn((4 * hidden, inputs), &mut uniform),
            w_hh: Array2::from_shape_simple_fn((4 * hidden, hidden), &mut uniform),
            b: Array1::from_shape_simple_fn(4 * hidden, &mut uniform),
            w_out: Array1::from_shape_simple_fn(hidden, &mut uniform),
            b_out: uniform(),
        }
    }

    fn zeros_like(&self) -> Self {
        Self {
            w_ih: Array2::zeros(self.w_ih.raw_dim()),
            w_hh: Array2::zeros(self.w_hh.raw_dim()),
            b: Array1::zeros(self.b.len()),
            w_out: Array1::zeros(self.w_out.len()),
            b_out: 0.0,
        }
    }

    fn hidden(&self) -> usize {
        self.w_out.len()
    }

    fn forward(&self, x: &Array2<f64>) -> (Vec<StepCache>, Array1<f64>) {
        let hsz = self.hidden();
        let mut h = Array1::<f64>::zeros(hsz);
        let mut c = Array1::<f64>::zeros(hsz);
        let mut caches = Vec::with_capacity(x.nrows());
        let mut preds = Array1::<f64>::zeros(x.nrows());
        for (t, xt) in x.outer_iter().enumerate() {
            let mut gates = self.w_ih.dot(&xt) + self.w_hh.dot(&h) + &self.b;
            for (k, a) in gates.iter_mut().enumerate() {
                *a = if (2 * hsz..3 * hsz).contains(&k) {
                    a.tanh()
                } else {
                    sigmoid(*a)
                };
            }
            let c_new = &gates.slice(s![hsz..2 * hsz]) * &c
                + &gates.slice(s![..hsz]) * &gates.slice(s![2 * hsz..3 * hsz]);
            let tanh_c = c_new.mapv(f64::tanh);
            let h_new = &gates.slice(s![3 * hsz..]) * &tanh_c;
            preds[t] = self.w_out.dot(&h_new) + self.b_out;

            let c_prev = std::mem::replace(&mut c, c_new);
            let h_prev = std::mem::replace(&mut h, h_new.clone());
            caches.push(StepCache {
                gates,
                c_prev,
                tanh_c,
                h_prev,
                h: h_new,
            });
        }
        (caches, preds)
    }

    /// Accumulate `scale · ∂Σ(ŷ − y)²/∂θ` into `grads`. Gradients do not flow
    /// back past a step whose index is a multiple of `truncation`.
    fn backward(
        &self,
        x: &Array2<f64>,
        y: ArrayView1<'_, f64>,
        scale: f64,
        truncation: Option<usize>,
        grads: &mut Cell,
    ) -> f64 {
        let hsz = self.hidden();
        let (caches, preds) = self.forward(x);
        let mut sq_error = 0.0;
        let mut dh_next = Array1::<f64>::zeros(hsz);
        let mut dc_next = Array1::<f64>::zeros(hsz);

        for t in (0..caches.len()).rev() {
            let cache = &caches[t];
            let err = preds[t] - y[t];
            sq_error += err * err;
            let dy = scale * err;

            grads.w_out.scaled_add(dy, &cache.h);
            grads.b_out += dy;

            let i = cache.gates.slice(s![..hsz]);
            let f = cache.gates.slice(s![hsz..2 * hsz]);
            let g = cache.gates.slice(s![2 * hsz..3 * hsz]);
            let o = cache.gates.slice(s![3 * hsz..]);

            let dh = &self.w_out * dy + &dh_next;
            let d_o = &dh * &cache.tanh_c;
            let dc = &dh * &o * &cache.tanh_c.mapv(|v| 1.0 - v * v) + &dc_next;

            let mut da = Array1::<f64>::zeros(4 * hsz);
            da.slice_mut(s![..hsz])
                .assign(&(&dc * &g * &i.mapv(|v| v * (1.0 - v))));
            da.slice_mut(s![hsz..2 * hsz])
                .assign(&(&dc * &cache.c_prev * &f.mapv(|v| v * (1.0 - v))));
            da.slice_mut(s![2 * hsz..3 * hsz])
                .assign(&(&dc * &i * &g.mapv(|v| 1.0 - v * v)));
            da.slice_mut(s![3 * hsz..])
                .assign(&(&d_o * &o.mapv(|v| v * (1.0 - v))));

            let da_col = da.view().insert_axis(Axis(1));
            grads.w_ih += &da_col.dot(&x.row(t).insert_axis(Axis(0)));
            grads.w_hh += &da_col.dot(&cache.h_prev.view().insert_axis(Axis(0)));
            grads.b += &da;

            if truncation.is_some_and(|k| t % k == 0) {
                dh_next.fill(0.0);
                dc_next.fill(0.0);
            } else {
                dh_next = self.w_hh.t().dot(&da);
                dc_next = &dc * &f;
            }
        }
        sq_error
    }

    fn descend(&mut self, grads: &Cell, step: f64) {
        self.w_ih.scaled_add(-step, &grads.w_ih);
        self.w_hh.scaled_add(-step, &grads.w_hh);
        self.b.scaled_add(-step, &grads.b);
        self.w_out.scaled_add(-step, &grads.w_out);
        self.b_out -= step * grads.b_out;
    }
}

/// Parallel LSTM encoding trained by proximal gradient descent with
/// truncated back-propagation through time.
#[derive(Debug, Clone, PartialEq)]
pub struct LstmEncoding {
    spec: LstmSpec,
    cells: Vec<Cell>,
}

impl LstmEncoding {
    /// Build with PyTorch-style uniform initialization, `U(±1/√hidden)`.
    pub fn new<R: Rng>(spec: LstmSpec, rng: &mut R) -> Result<Self, MlError> {
        if spec.inputs == 0 || spec.outputs == 0 || spec.hidden == 0 {
            return Err(MlError::model(format!(
                "LSTM needs inputs, outputs and hidden >= 1 (got {}, {}, {})",
                spec.inputs, spec.outputs, spec.hidden
            )));
        }
        if spec.truncation == Some(0) {
            return Err(MlError::model("truncation must be at least 1"));
        }
        if !(spec.lam >= 0.0) {
            return Err(MlError::model("lam must be non-negative"));
        }
        let cells = (0..spec.outputs)
            .map(|_| Cell::new(spec.inputs, spec.hidden, rng))
            .collect();
        Ok(Self { spec, cells })
    }

    pub fn spec(&self) -> &LstmSpec {
        &self.spec
    }

    /// Input-to-hidden weights of the cell for `output`, `4H × p`.
    pub fn input_weights(&self, output: usize) -> Option<&Array2<f64>> {
        self.cells.get(output).map(|cell| &cell.w_ih)
    }

    fn check_shape(&self, data: &LstmData) -> Result<(), MlError> {
        if data.full.x.ncols() != self.spec.inputs || data.full.y.ncols() != self.spec.outputs {
            return Err(MlError::model(format!(
                "data has {} inputs and {} targets, model expects {} and {}",
                data.full.x.ncols(),
                data.full.y.ncols(),
                self.spec.inputs,
                self.spec.outputs
            )));
        }
        Ok(())
    }

    fn cell_gradients(&self, cell: &Cell, data: &LstmData, output: usize) -> (f64, Cell) {
        let scale = 2.0 / data.steps().max(1) as f64;
        let mut grads = cell.zeros_like();
        let mut sq_error = 0.0;
        for window in data.windows() {
            sq_error += cell.backward(
                &window.x,
                window.y.column(output),
                scale,
                self.spec.truncation,
                &mut grads,
            );
        }
        (sq_error / data.steps().max(1) as f64, grads)
    }
}

impl Encoding for LstmEncoding {
    type Data = LstmData;

    fn outputs(&self) -> usize {
        self.spec.outputs
    }

    fn losses(&self, data: &LstmData) -> Vec<f64> {
        let steps = data.steps().max(1) as f64;
        self.cells
            .iter()
            .enumerate()
            .map(|(j, cell)| {
                data.windows()
                    .iter()
                    .map(|w| {
                        let (_, preds) = cell.forward(&w.x);
                        preds
                            .iter()
                            .zip(w.y.column(j))
                            .map(|(p, y)| (p - y) * (p - y))
                            .sum::<f64>()
                    })
                    .sum::<f64>()
                    / steps
            })
            .collect()
    }

    fn regularization(&self) -> Vec<f64> {
        self.cells
            .iter()
            .map(|cell| self.spec.lam * penalty_value(Penalty::GroupLasso, &cell.w_ih, 1))
            .collect()
    }

    fn predict(&self, data: &LstmData) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((data.len(), self.spec.outputs));
        for (j, cell) in self.cells.iter().enumerate() {
            let (_, preds) = cell.forward(&data.full.x);
            out.column_mut(j).assign(&preds);
        }
        out
    }

    fn step(&mut self, data: &LstmData, lr: f64) -> Result<(), MlError> {
        self.check_shape(data)?;
        let mut cells = std::mem::take(&mut self.cells);
        for (j, cell) in cells.iter_mut().enumerate() {
            let (_, grads) = self.cell_gradients(cell, data, j);
            cell.descend(&grads, lr);
            apply_prox(Penalty::GroupLasso, &mut cell.w_ih, 1, lr * self.spec.lam);
        }
        self.cells = cells;
        Ok(())
    }

    fn gc_row(&self, output: usize) -> Vec<f64> {
        self.cells
            .get(output)
            .map(|cell| group_norms(&cell.w_ih, 1))
            .unwrap_or_default()
    }
}
