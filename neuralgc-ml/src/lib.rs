//! # neuralgc-ml: data, models, training and the experiment runner
//!
//! Everything numerical lives here:
//!
//! - [`data`]: VAR and Lorenz-96 simulators with known GC structure, plus
//!   normalization, splitting and lag windowing
//! - [`models`]: component-wise MLP and LSTM encodings with group penalties
//! - [`training`]: the epoch loop and per-output checkpoint selection
//! - [`runner`]: skip-if-done execution of one configuration and atomic
//!   persistence of its [`results::ResultBundle`]
//! - [`evaluation`]: AUROC of an estimated GC matrix

pub mod data;
pub mod error;
pub mod evaluation;
pub mod models;
pub mod reproducibility;
pub mod results;
pub mod runner;
pub mod training;

pub use error::MlError;
pub use evaluation::{GcEvaluation, evaluate_bundle, load_bundle};
pub use models::Encoding;
pub use reproducibility::SeedManager;
pub use results::ResultBundle;
pub use runner::{ExperimentPipeline, ExperimentRunner, RunOutcome, RunState, SyntheticPipeline};
