//! Full-batch training loop with periodic loss checks and per-output
//! checkpoint selection.

use crate::error::MlError;
use crate::models::Encoding;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which check becomes an output's reported result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    /// Lowest validation loss; falls back to training objective without
    /// validation data.
    BestValidation,
    /// Lowest training objective.
    BestObjective,
    /// The last check.
    FinalEpoch,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::BestValidation => write!(f, "best_validation"),
            Selection::BestObjective => write!(f, "best_objective"),
            Selection::FinalEpoch => write!(f, "final_epoch"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainerOptions {
    pub nepoch: usize,
    pub lr: f64,
    pub loss_check: usize,
    pub selection: Selection,
    /// Halve the learning rate whenever a check does not improve the best
    /// total objective.
    pub cooldown: bool,
}

/// Losses recorded at one check, one entry per output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossCheck {
    pub epoch: usize,
    pub train_loss: Vec<f64>,
    pub train_objective: Vec<f64>,
    pub val_loss: Option<Vec<f64>>,
}

/// The selected state of one output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub train_loss: f64,
    pub train_objective: f64,
    pub val_loss: Option<f64>,
    pub predictions_train: Vec<f64>,
    pub predictions_val: Option<Vec<f64>>,
    pub gc_row: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOutcome {
    pub checks: Vec<LossCheck>,
    /// One checkpoint per output.
    pub best: Vec<Checkpoint>,
    pub final_lr: f64,
}

/// Train `model` for `options.nepoch` epochs.
///
/// A check runs every `loss_check` epochs and at the last epoch. Any
/// non-finite loss aborts with [`MlError::Training`].
pub fn train<E: Encoding>(
    model: &mut E,
    train: &E::Data,
    val: Option<&E::Data>,
    options: &TrainerOptions,
) -> Result<TrainingOutcome, MlError> {
    if options.nepoch == 0 || options.loss_check == 0 {
        return Err(MlError::training("nepoch and loss_check must be at least 1"));
    }
    if !(options.lr > 0.0 && options.lr.is_finite()) {
        return Err(MlError::training(format!("invalid learning rate {}", options.lr)));
    }

    let outputs = model.outputs();
    let mut lr = options.lr;
    let mut checks = Vec::new();
    let mut best: Vec<Option<Checkpoint>> = vec![None; outputs];
    let mut best_total = f64::INFINITY;

    for epoch in 1..=options.nepoch {
        model.step(train, lr)?;

        if epoch % options.loss_check != 0 && epoch != options.nepoch {
            continue;
        }

        let train_loss = model.losses(train);
        let train_objective = model.objectives(train);
        let val_loss = val.map(|v| model.losses(v));
        let all_finite = train_objective
            .iter()
            .chain(val_loss.iter().flatten())
            .all(|v| v.is_finite());
        if !all_finite {
            return Err(MlError::training(format!(
                "non-finite loss at epoch {epoch} (lr = {lr})"
            )));
        }

        let total: f64 = train_objective.iter().sum();
        tracing::debug!(
            epoch,
            train_loss = mean(&train_loss),
            train_objective = total,
            val_loss = val_loss.as_deref().map(mean),
            "Loss check"
        );

        let mut predictions: Option<(Array2<f64>, Option<Array2<f64>>)> = None;
        for j in 0..outputs {
            let score = match options.selection {
                Selection::BestValidation => val_loss
                    .as_ref()
                    .map_or(train_objective[j], |v| v[j]),
                Selection::BestObjective => train_objective[j],
                Selection::FinalEpoch => f64::NEG_INFINITY,
            };
            let improves = match (&best[j], options.selection) {
                (None, _) => true,
                (Some(_), Selection::FinalEpoch) => true,
                (Some(current), Selection::BestValidation) => {
                    score < current.val_loss.unwrap_or(current.train_objective)
                }
                (Some(current), Selection::BestObjective) => score < current.train_objective,
            };
            if !improves {
                continue;
            }
            let (pred_train, pred_val) = predictions
                .get_or_insert_with(|| (model.predict(train), val.map(|v| model.predict(v))));
            best[j] = Some(Checkpoint {
                epoch,
                train_loss: train_loss[j],
                train_objective: train_objective[j],
                val_loss: val_loss.as_ref().map(|v| v[j]),
                predictions_train: pred_train.column(j).to_vec(),
                predictions_val: pred_val.as_ref().map(|p| p.column(j).to_vec()),
                gc_row: model.gc_row(j),
            });
        }

        if options.cooldown && total >= best_total && epoch != options.nepoch {
            lr *= 0.5;
            tracing::warn!(epoch, lr, "Objective did not improve, cooling down learning rate");
        }
        best_total = best_total.min(total);

        checks.push(LossCheck {
            epoch,
            train_loss,
            train_objective,
            val_loss,
        });
    }

    let best = best
        .into_iter()
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| MlError::training("no checkpoint was recorded"))?;
    Ok(TrainingOutcome {
        checks,
        best,
        final_lr: lr,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use pretty_assertions::assert_eq;

    /// Scripted model: output `j`'s loss at step `s` is `schedule[s][j]`.
    struct Scripted {
        schedule: Vec<Vec<f64>>,
        steps: usize,
        lrs: Vec<f64>,
    }

    impl Scripted {
        fn new(schedule: Vec<Vec<f64>>) -> Self {
            Self {
                schedule,
                steps: 0,
                lrs: Vec::new(),
            }
        }

        fn current(&self) -> &[f64] {
            &self.schedule[self.steps.saturating_sub(1).min(self.schedule.len() - 1)]
        }
    }

    impl Encoding for Scripted {
        type Data = f64;

        fn outputs(&self) -> usize {
            self.schedule[0].len()
        }

        fn losses(&self, data: &f64) -> Vec<f64> {
            self.current().iter().map(|l| l * data).collect()
        }

        fn regularization(&self) -> Vec<f64> {
            vec![0.0; self.outputs()]
        }

        fn predict(&self, _data: &f64) -> Array2<f64> {
            Array2::from_elem((1, self.outputs()), self.steps as f64)
        }

        fn step(&mut self, _data: &f64, lr: f64) -> Result<(), MlError> {
            self.steps += 1;
            self.lrs.push(lr);
            Ok(())
        }

        fn gc_row(&self, _output: usize) -> Vec<f64> {
            vec![self.steps as f64]
        }
    }

    fn options(selection: Selection) -> TrainerOptions {
        TrainerOptions {
            nepoch: 4,
            lr: 1.0,
            loss_check: 1,
            selection,
            cooldown: false,
        }
    }

    fn schedule() -> Vec<Vec<f64>> {
        vec![vec![3.0, 1.0], vec![2.0, 4.0], vec![1.0, 5.0], vec![5.0, 6.0]]
    }

    #[test]
    fn test_best_objective_is_selected_per_output() {
        let mut model = Scripted::new(schedule());
        let outcome = train(&mut model, &1.0, None, &options(Selection::BestObjective)).unwrap();
        assert_eq!(outcome.best[0].epoch, 3);
        assert_eq!(outcome.best[1].epoch, 1);
        assert_eq!(outcome.best[0].predictions_train, vec![3.0]);
        assert_eq!(outcome.best[1].gc_row, vec![1.0]);
        assert_eq!(outcome.checks.len(), 4);
    }

    #[test]
    fn test_final_epoch_selection() {
        let mut model = Scripted::new(schedule());
        let outcome = train(&mut model, &1.0, None, &options(Selection::FinalEpoch)).unwrap();
        assert!(outcome.best.iter().all(|c| c.epoch == 4));
    }

    #[test]
    fn test_best_validation_uses_validation_losses() {
        let mut model = Scripted::new(schedule());
        let outcome = train(
            &mut model,
            &1.0,
            Some(&2.0),
            &options(Selection::BestValidation),
        )
        .unwrap();
        assert_eq!(outcome.best[0].epoch, 3);
        assert_eq!(outcome.best[0].val_loss, Some(2.0));
        assert_eq!(outcome.best[0].predictions_val, Some(vec![3.0]));
    }

    #[test]
    fn test_checks_every_interval_and_at_the_end() {
        let mut model = Scripted::new(vec![vec![1.0]; 7]);
        let opts = TrainerOptions {
            nepoch: 7,
            loss_check: 3,
            ..options(Selection::FinalEpoch)
        };
        let outcome = train(&mut model, &1.0, None, &opts).unwrap();
        let epochs: Vec<usize> = outcome.checks.iter().map(|c| c.epoch).collect();
        assert_eq!(epochs, vec![3, 6, 7]);
    }

    #[test]
    fn test_cooldown_halves_learning_rate() {
        let mut model = Scripted::new(schedule());
        let opts = TrainerOptions {
            cooldown: true,
            ..options(Selection::BestObjective)
        };
        let outcome = train(&mut model, &1.0, None, &opts).unwrap();
        // Totals: 4, 6, 6, 11. Checks 2 and 3 fail to improve.
        assert_eq!(model.lrs, vec![1.0, 1.0, 0.5, 0.25]);
        assert_eq!(outcome.final_lr, 0.25);
    }

    #[test]
    fn test_non_finite_loss_aborts() {
        let mut model = Scripted::new(vec![vec![1.0], vec![f64::NAN]]);
        let err = train(&mut model, &1.0, None, &options(Selection::FinalEpoch)).unwrap_err();
        assert!(matches!(err, MlError::Training(_)));
    }
}
