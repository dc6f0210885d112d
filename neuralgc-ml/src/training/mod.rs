//! Training: the epoch loop, loss checks and checkpoint selection.

pub mod trainer;

pub use trainer::{Checkpoint, LossCheck, Selection, TrainerOptions, TrainingOutcome, train};
