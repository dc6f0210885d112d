//! Feed-forward encoding: one MLP per output over lag windows of all inputs.

use super::penalty::{apply_prox, group_norms, penalty_value};
use super::{Encoding, activate, activation_grad};
use crate::data::LaggedSet;
use crate::error::MlError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use neuralgc_core::{Nonlinearity, OptimizerMode, Penalty};
use rand::Rng;

/// Step-size halvings tried before a line-search step is abandoned.
const MAX_BACKTRACKS: usize = 30;

/// Shape and optimization settings of an [`MlpEncoding`].
#[derive(Debug, Clone, PartialEq)]
pub struct MlpSpec {
    /// Number of input series `p`.
    pub inputs: usize,
    pub outputs: usize,
    /// Lag window seen by every network.
    pub lag: usize,
    pub hidden: Vec<usize>,
    pub nonlinearity: Nonlinearity,
    pub optimizer: OptimizerMode,
    pub penalty: Penalty,
    pub lam: f64,
    pub weight_decay: f64,
}

#[derive(Debug, Clone, PartialEq)]
struct Layer {
    /// `out × in`.
    w: Array2<f64>,
    b: Array1<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct Network {
    layers: Vec<Layer>,
}

impl Network {
    fn new<R: Rng>(sizes: &[usize], rng: &mut R) -> Self {
        let layers = sizes
            .windows(2)
            .map(|pair| {
                let (fan_in, fan_out) = (pair[0], pair[1]);
                let bound = 1.0 / (fan_in as f64).sqrt();
                Layer {
                    w: Array2::from_shape_simple_fn((fan_out, fan_in), || {
                        rng.gen_range(-bound..bound)
                    }),
                    b: Array1::from_shape_simple_fn(fan_out, || rng.gen_range(-bound..bound)),
                }
            })
            .collect();
        Self { layers }
    }

    /// Activations of every layer; the last entry is the `n × 1` output.
    fn forward(&self, x: &Array2<f64>, nonlinearity: Nonlinearity) -> Vec<Array2<f64>> {
        let last = self.layers.len() - 1;
        let mut acts: Vec<Array2<f64>> = Vec::with_capacity(self.layers.len());
        for (l, layer) in self.layers.iter().enumerate() {
            let input = if l == 0 { x } else { &acts[l - 1] };
            let mut z = input.dot(&layer.w.t()) + &layer.b;
            if l < last {
                z.mapv_inplace(|v| activate(nonlinearity, v));
            }
            acts.push(z);
        }
        acts
    }

    fn output(&self, x: &Array2<f64>, nonlinearity: Nonlinearity) -> Array1<f64> {
        let mut acts = self.forward(x, nonlinearity);
        acts.pop()
            .map(|out| out.column(0).to_owned())
            .unwrap_or_else(|| Array1::zeros(x.nrows()))
    }

    fn loss(&self, x: &Array2<f64>, y: ArrayView1<'_, f64>, nonlinearity: Nonlinearity) -> f64 {
        mse(&self.output(x, nonlinearity), y)
    }

    /// Squared norm of every weight matrix past the first.
    fn ridge(&self) -> f64 {
        self.layers
            .iter()
            .skip(1)
            .map(|layer| layer.w.iter().map(|v| v * v).sum::<f64>())
            .sum()
    }

    /// Loss of the smooth part (MSE + ridge) and its gradient.
    fn gradients(
        &self,
        x: &Array2<f64>,
        y: ArrayView1<'_, f64>,
        nonlinearity: Nonlinearity,
        weight_decay: f64,
    ) -> (f64, Vec<Layer>) {
        let acts = self.forward(x, nonlinearity);
        let n = x.nrows() as f64;
        let residual = &acts[acts.len() - 1].column(0) - &y;
        let loss = residual.iter().map(|r| r * r).sum::<f64>() / n;

        let mut delta = (residual * (2.0 / n)).insert_axis(Axis(1));
        let mut grads = Vec::with_capacity(self.layers.len());
        for l in (0..self.layers.len()).rev() {
            let input = if l == 0 { x } else { &acts[l - 1] };
            let mut gw = delta.t().dot(input);
            let gb = delta.sum_axis(Axis(0));
            if l > 0 {
                gw.scaled_add(2.0 * weight_decay, &self.layers[l].w);
                let mut back = delta.dot(&self.layers[l].w);
                back.zip_mut_with(&acts[l - 1], |d, &h| *d *= activation_grad(nonlinearity, h));
                delta = back;
            }
            grads.push(Layer { w: gw, b: gb });
        }
        grads.reverse();
        (loss + weight_decay * self.ridge(), grads)
    }

    fn descend(&mut self, grads: &[Layer], step: f64) {
        for (layer, grad) in self.layers.iter_mut().zip(grads) {
            layer.w.scaled_add(-step, &grad.w);
            layer.b.scaled_add(-step, &grad.b);
        }
    }

    /// `(⟨g, θ' − θ⟩, ‖θ' − θ‖²)` for the backtracking condition.
    fn displacement(&self, moved: &Network, grads: &[Layer]) -> (f64, f64) {
        let mut inner = 0.0;
        let mut dist = 0.0;
        for ((before, after), grad) in self.layers.iter().zip(&moved.layers).zip(grads) {
            for ((a, b), g) in before.w.iter().zip(&after.w).zip(&grad.w) {
                inner += g * (b - a);
                dist += (b - a) * (b - a);
            }
            for ((a, b), g) in before.b.iter().zip(&after.b).zip(&grad.b) {
                inner += g * (b - a);
                dist += (b - a) * (b - a);
            }
        }
        (inner, dist)
    }

    fn input_weights(&self) -> &Array2<f64> {
        &self.layers[0].w
    }
}

fn mse(prediction: &Array1<f64>, target: ArrayView1<'_, f64>) -> f64 {
    let n = prediction.len().max(1) as f64;
    prediction
        .iter()
        .zip(target.iter())
        .map(|(p, y)| (p - y) * (p - y))
        .sum::<f64>()
        / n
}

/// Parallel MLP encoding: network `j` predicts series `j` from the lag window
/// of every series. Sparsity is imposed on each input's first-layer group.
#[derive(Debug, Clone, PartialEq)]
pub struct MlpEncoding {
    spec: MlpSpec,
    networks: Vec<Network>,
}

impl MlpEncoding {
    /// Build with PyTorch-style uniform initialization, `U(±1/√fan_in)`.
    pub fn new<R: Rng>(spec: MlpSpec, rng: &mut R) -> Result<Self, MlError> {
        if spec.inputs == 0 || spec.outputs == 0 || spec.lag == 0 {
            return Err(MlError::model(format!(
                "MLP needs inputs, outputs and lag >= 1 (got {}, {}, {})",
                spec.inputs, spec.outputs, spec.lag
            )));
        }
        if spec.hidden.is_empty() || spec.hidden.contains(&0) {
            return Err(MlError::model(format!(
                "hidden layer sizes must be non-empty and positive: {:?}",
                spec.hidden
            )));
        }
        if !(spec.lam >= 0.0 && spec.weight_decay >= 0.0) {
            return Err(MlError::model("lam and weight_decay must be non-negative"));
        }

        let mut sizes = Vec::with_capacity(spec.hidden.len() + 2);
        sizes.push(spec.inputs * spec.lag);
        sizes.extend_from_slice(&spec.hidden);
        sizes.push(1);
        let networks = (0..spec.outputs).map(|_| Network::new(&sizes, rng)).collect();
        Ok(Self { spec, networks })
    }

    pub fn spec(&self) -> &MlpSpec {
        &self.spec
    }

    /// First-layer weights of the network for `output`, `hidden × p·lag`.
    pub fn input_weights(&self, output: usize) -> Option<&Array2<f64>> {
        self.networks.get(output).map(Network::input_weights)
    }

    fn check_shape(&self, data: &LaggedSet) -> Result<(), MlError> {
        let features = self.spec.inputs * self.spec.lag;
        if data.x.ncols() != features || data.y.ncols() != self.spec.outputs {
            return Err(MlError::model(format!(
                "data has {} features and {} targets, model expects {features} and {}",
                data.x.ncols(),
                data.y.ncols(),
                self.spec.outputs
            )));
        }
        if data.is_empty() {
            return Err(MlError::model("cannot train on an empty data set"));
        }
        Ok(())
    }

    fn prox_step(&self, network: &mut Network, grads: &[Layer], step: f64) {
        network.descend(grads, step);
        apply_prox(
            self.spec.penalty,
            &mut network.layers[0].w,
            self.spec.lag,
            step * self.spec.lam,
        );
    }

    fn line_search(&self, network: &Network, data: &LaggedSet, output: usize, lr: f64) -> Option<Network> {
        let y = data.y.column(output);
        let (smooth, grads) =
            network.gradients(&data.x, y, self.spec.nonlinearity, self.spec.weight_decay);
        let mut step = lr;
        for _ in 0..MAX_BACKTRACKS {
            let mut candidate = network.clone();
            self.prox_step(&mut candidate, &grads, step);
            let moved = candidate.loss(&data.x, y, self.spec.nonlinearity)
                + self.spec.weight_decay * candidate.ridge();
            let (inner, dist) = network.displacement(&candidate, &grads);
            if moved <= smooth + inner + dist / (2.0 * step) {
                return Some(candidate);
            }
            step *= 0.5;
        }
        None
    }
}

impl Encoding for MlpEncoding {
    type Data = LaggedSet;

    fn outputs(&self) -> usize {
        self.spec.outputs
    }

    fn losses(&self, data: &LaggedSet) -> Vec<f64> {
        self.networks
            .iter()
            .enumerate()
            .map(|(j, net)| net.loss(&data.x, data.y.column(j), self.spec.nonlinearity))
            .collect()
    }

    fn regularization(&self) -> Vec<f64> {
        self.networks
            .iter()
            .map(|net| {
                self.spec.weight_decay * net.ridge()
                    + self.spec.lam * penalty_value(self.spec.penalty, net.input_weights(), self.spec.lag)
            })
            .collect()
    }

    fn predict(&self, data: &LaggedSet) -> Array2<f64> {
        let mut out = Array2::<f64>::zeros((data.x.nrows(), self.spec.outputs));
        for (j, net) in self.networks.iter().enumerate() {
            out.column_mut(j).assign(&net.output(&data.x, self.spec.nonlinearity));
        }
        out
    }

    fn step(&mut self, data: &LaggedSet, lr: f64) -> Result<(), MlError> {
        self.check_shape(data)?;
        let mut networks = std::mem::take(&mut self.networks);
        for (j, network) in networks.iter_mut().enumerate() {
            match self.spec.optimizer {
                OptimizerMode::Prox => {
                    let (_, grads) = network.gradients(
                        &data.x,
                        data.y.column(j),
                        self.spec.nonlinearity,
                        self.spec.weight_decay,
                    );
                    self.prox_step(network, &grads, lr);
                }
                OptimizerMode::Line => {
                    if let Some(accepted) = self.line_search(network, data, j, lr) {
                        *network = accepted;
                    }
                }
            }
        }
        self.networks = networks;
        Ok(())
    }

    fn gc_row(&self, output: usize) -> Vec<f64> {
        self.networks
            .get(output)
            .map(|net| group_norms(net.input_weights(), self.spec.lag))
            .unwrap_or_default()
    }
}
