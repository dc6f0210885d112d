//! Component-wise encodings: one small network per output series.

pub mod lstm;
pub mod mlp;
pub mod penalty;

use crate::error::MlError;
use ndarray::Array2;
use neuralgc_core::Nonlinearity;

pub use lstm::{LstmData, LstmEncoding};
pub use mlp::MlpEncoding;

/// A model made of independent per-output networks trained jointly.
pub trait Encoding {
    /// Data the model consumes (lagged pairs or windowed sequences).
    type Data;

    /// Number of output series.
    fn outputs(&self) -> usize;

    /// Mean squared error per output.
    fn losses(&self, data: &Self::Data) -> Vec<f64>;

    /// Ridge plus sparsity penalty per output.
    fn regularization(&self) -> Vec<f64>;

    /// `losses + regularization`.
    fn objectives(&self, data: &Self::Data) -> Vec<f64> {
        self.losses(data)
            .into_iter()
            .zip(self.regularization())
            .map(|(loss, reg)| loss + reg)
            .collect()
    }

    /// Predictions, `n × outputs`.
    fn predict(&self, data: &Self::Data) -> Array2<f64>;

    /// One full-batch optimization step at learning rate `lr`.
    fn step(&mut self, data: &Self::Data, lr: f64) -> Result<(), MlError>;

    /// Estimated influence of every input on `output`.
    fn gc_row(&self, output: usize) -> Vec<f64>;
}

/// Hidden-layer activation, applied to pre-activations.
pub(crate) fn activate(nonlinearity: Nonlinearity, z: f64) -> f64 {
    match nonlinearity {
        Nonlinearity::Relu => z.max(0.0),
        Nonlinearity::Sigmoid => sigmoid(z),
        Nonlinearity::Tanh => z.tanh(),
    }
}

/// Derivative of the activation, expressed through its output `h`.
pub(crate) fn activation_grad(nonlinearity: Nonlinearity, h: f64) -> f64 {
    match nonlinearity {
        Nonlinearity::Relu => {
            if h > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        Nonlinearity::Sigmoid => h * (1.0 - h),
        Nonlinearity::Tanh => 1.0 - h * h,
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}
