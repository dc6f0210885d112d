//! Experiment runner: identity, skip-if-done, execution and atomic persist.
//!
//! A run moves through
//! `Init → {Skip | Prepare → GenerateData → BuildModel → Train → Persist → Done}`.
//! Failure while generating data, building the model or training ends in
//! `Failed` and writes nothing at the result path.

use crate::data::{
    LagStructure, LaggedData, LorenzSpec, Scaling, SyntheticSeries, VarSpec, format_ts_data,
    normalize, shift_pairs, simulate_lorenz_96, simulate_var, split_data,
};
use crate::error::MlError;
use crate::models::lstm::LstmSpec;
use crate::models::mlp::MlpSpec;
use crate::models::{LstmData, LstmEncoding, MlpEncoding};
use crate::reproducibility::SeedManager;
use crate::results::{BestResults, DataSnapshot, Provenance, ResultBundle};
use crate::training::{Selection, TrainerOptions, TrainingOutcome, train};
use chrono::Utc;
use neuralgc_core::persistence;
use neuralgc_core::{ExperimentConfig, ExperimentFamily, ExperimentKind, VarData};
use std::fmt;
use std::path::{Path, PathBuf};

/// Coefficient magnitude of the long-lag VAR before shrinking.
const LONG_VAR_BETA: f64 = 1.0;
/// Coefficient magnitude of the standardized VARs before rescaling.
const STANDARDIZED_BETA: f64 = 5.0;

/// Lifecycle state of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Skip,
    Prepare,
    GenerateData,
    BuildModel,
    Train,
    Persist,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "init"),
            RunState::Skip => write!(f, "skip"),
            RunState::Prepare => write!(f, "prepare"),
            RunState::GenerateData => write!(f, "generate_data"),
            RunState::BuildModel => write!(f, "build_model"),
            RunState::Train => write!(f, "train"),
            RunState::Persist => write!(f, "persist"),
            RunState::Done => write!(f, "done"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// A new result file was written.
    Completed { path: PathBuf },
    /// A result already existed; nothing was done.
    Skipped { path: PathBuf },
}

impl RunOutcome {
    pub fn path(&self) -> &Path {
        match self {
            RunOutcome::Completed { path } | RunOutcome::Skipped { path } => path,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, RunOutcome::Skipped { .. })
    }
}

/// Model inputs derived from a synthetic series.
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedData {
    Lagged(LaggedData),
    Recurrent {
        train: LstmData,
        val: Option<LstmData>,
    },
}

/// A synthetic series and the model inputs cut from it.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedData {
    pub synthetic: SyntheticSeries,
    pub prepared: PreparedData,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuiltModel {
    Mlp(MlpEncoding),
    Lstm(LstmEncoding),
}

/// The three fallible stages of a run.
///
/// [`SyntheticPipeline`] is the real implementation; tests substitute
/// counting or failing ones.
pub trait ExperimentPipeline {
    fn generate_data(
        &mut self,
        config: &ExperimentConfig,
        seeds: &SeedManager,
    ) -> Result<GeneratedData, MlError>;

    fn build_model(
        &mut self,
        config: &ExperimentConfig,
        data: &GeneratedData,
        seeds: &SeedManager,
    ) -> Result<BuiltModel, MlError>;

    fn train(
        &mut self,
        config: &ExperimentConfig,
        data: &GeneratedData,
        model: BuiltModel,
    ) -> Result<TrainingOutcome, MlError>;
}

/// Synthesizes data, builds the family's encoding and trains it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticPipeline;

impl ExperimentPipeline for SyntheticPipeline {
    fn generate_data(
        &mut self,
        config: &ExperimentConfig,
        seeds: &SeedManager,
    ) -> Result<GeneratedData, MlError> {
        let mut rng = seeds.data_rng();
        let validation = config.family().validation_fraction();
        match config.kind() {
            ExperimentKind::LongVarMlp { training, data } => {
                let spec = var_spec(data, LONG_VAR_BETA, LagStructure::LongLag, Scaling::Shrink);
                let synthetic = simulate_var(&spec, &mut rng)?;
                let lagged = format_ts_data(&synthetic.series, training.network_lag, validation)?;
                Ok(GeneratedData {
                    synthetic,
                    prepared: PreparedData::Lagged(lagged),
                })
            }
            ExperimentKind::StandardizedVarMlp { training, data } => {
                let spec =
                    var_spec(data, STANDARDIZED_BETA, LagStructure::Full, Scaling::Standardized);
                let synthetic = simulate_var(&spec, &mut rng)?;
                let series = normalize(&synthetic.series);
                let lagged = format_ts_data(&series, training.network_lag, validation)?;
                Ok(GeneratedData {
                    synthetic,
                    prepared: PreparedData::Lagged(lagged),
                })
            }
            ExperimentKind::StandardizedVarLstm { training, data } => {
                let spec = var_spec(
                    data,
                    STANDARDIZED_BETA,
                    LagStructure::LongLag,
                    Scaling::Standardized,
                );
                let synthetic = simulate_var(&spec, &mut rng)?;
                let (train_part, val_part) = split_data(&normalize(&synthetic.series), validation);
                let (x, y) = shift_pairs(&train_part)
                    .ok_or_else(|| MlError::data("training split is shorter than two steps"))?;
                let train = LstmData::windowed(x, y, training.window, training.stride)?;
                let val = shift_pairs(&val_part)
                    .map(|(x, y)| LstmData::sequence(x, y))
                    .transpose()?;
                Ok(GeneratedData {
                    synthetic,
                    prepared: PreparedData::Recurrent { train, val },
                })
            }
            ExperimentKind::LorenzMlp { training, data } => {
                let spec = LorenzSpec {
                    p: data.p,
                    t: data.t,
                    forcing: data.forcing,
                    dt: data.dt,
                    sd: data.sd,
                };
                let synthetic = simulate_lorenz_96(&spec, &mut rng)?;
                let series = normalize(&synthetic.series);
                let lagged = format_ts_data(&series, training.network_lag, validation)?;
                Ok(GeneratedData {
                    synthetic,
                    prepared: PreparedData::Lagged(lagged),
                })
            }
        }
    }

    fn build_model(
        &mut self,
        config: &ExperimentConfig,
        data: &GeneratedData,
        seeds: &SeedManager,
    ) -> Result<BuiltModel, MlError> {
        let mut rng = seeds.model_rng();
        let family = config.family();
        let p = data.synthetic.p();
        match config.kind() {
            ExperimentKind::LongVarMlp { training, .. }
            | ExperimentKind::StandardizedVarMlp { training, .. }
            | ExperimentKind::LorenzMlp { training, .. } => {
                let spec = MlpSpec {
                    inputs: p,
                    outputs: p,
                    lag: training.network_lag,
                    hidden: vec![training.hidden],
                    nonlinearity: family.nonlinearity(),
                    optimizer: family.optimizer(),
                    penalty: training.penalty,
                    lam: training.lam,
                    weight_decay: training.weight_decay,
                };
                Ok(BuiltModel::Mlp(MlpEncoding::new(spec, &mut rng)?))
            }
            ExperimentKind::StandardizedVarLstm { training, .. } => {
                let spec = LstmSpec {
                    inputs: p,
                    outputs: p,
                    hidden: training.hidden,
                    lam: training.lam,
                    truncation: training.truncation,
                };
                Ok(BuiltModel::Lstm(LstmEncoding::new(spec, &mut rng)?))
            }
        }
    }

    fn train(
        &mut self,
        config: &ExperimentConfig,
        data: &GeneratedData,
        model: BuiltModel,
    ) -> Result<TrainingOutcome, MlError> {
        let options = trainer_options(config);
        match (model, &data.prepared) {
            (BuiltModel::Mlp(mut mlp), PreparedData::Lagged(lagged)) => {
                train(&mut mlp, &lagged.train, lagged.val.as_ref(), &options)
            }
            (BuiltModel::Lstm(mut lstm), PreparedData::Recurrent { train: t, val }) => {
                train(&mut lstm, t, val.as_ref(), &options)
            }
            _ => Err(MlError::model(format!(
                "model and prepared data do not match for family {}",
                config.family()
            ))),
        }
    }
}

fn var_spec(data: &VarData, beta_value: f64, structure: LagStructure, scaling: Scaling) -> VarSpec {
    VarSpec {
        p: data.p,
        t: data.t,
        lag: data.lag,
        sparsity: data.sparsity,
        beta_value,
        sd: data.sd,
        structure,
        scaling,
    }
}

/// Checkpoint selection used by each family.
pub fn selection(family: ExperimentFamily) -> Selection {
    match family {
        ExperimentFamily::LongVarMlp => Selection::BestValidation,
        ExperimentFamily::StandardizedVarLstm => Selection::BestObjective,
        ExperimentFamily::StandardizedVarMlp | ExperimentFamily::LorenzMlp => {
            Selection::FinalEpoch
        }
    }
}

fn trainer_options(config: &ExperimentConfig) -> TrainerOptions {
    let selection = selection(config.family());
    match config.kind() {
        ExperimentKind::LongVarMlp { training, .. }
        | ExperimentKind::StandardizedVarMlp { training, .. }
        | ExperimentKind::LorenzMlp { training, .. } => TrainerOptions {
            nepoch: training.nepoch,
            lr: training.lr,
            loss_check: training.loss_check,
            selection,
            cooldown: false,
        },
        ExperimentKind::StandardizedVarLstm { training, .. } => TrainerOptions {
            nepoch: training.nepoch,
            lr: training.lr,
            loss_check: training.loss_check,
            selection,
            cooldown: training.cooldown.is_on(),
        },
    }
}

/// Runs experiments whose results live under one results root.
#[derive(Debug, Clone)]
pub struct ExperimentRunner {
    results_root: PathBuf,
}

impl ExperimentRunner {
    pub fn new(results_root: impl Into<PathBuf>) -> Self {
        Self {
            results_root: results_root.into(),
        }
    }

    pub fn results_root(&self) -> &Path {
        &self.results_root
    }

    /// Run `config` unless its result already exists.
    ///
    /// Existence is checked before anything else happens. Concurrent runs of
    /// the same identity are not locked against each other: both may train,
    /// and the last rename wins.
    pub fn run<P: ExperimentPipeline + ?Sized>(
        &self,
        config: &ExperimentConfig,
        pipeline: &mut P,
    ) -> Result<RunOutcome, MlError> {
        let result = config.result_path(&self.results_root);
        let path = result.path();
        let identity = result.identity().to_string();
        let span = tracing::info_span!("experiment", family = %config.family(), identity = %identity);
        let _enter = span.enter();

        enter(RunState::Init);
        if result.is_done() {
            enter(RunState::Skip);
            tracing::info!(path = %path.display(), "Skipping experiment, result already exists");
            return Ok(RunOutcome::Skipped { path });
        }

        enter(RunState::Prepare);
        std::fs::create_dir_all(result.family_dir())?;
        let started_at = Utc::now();
        let seeds = SeedManager::new(config.model_seed(), config.data_seed());
        tracing::debug!(
            model_seed = ?seeds.model_seed,
            data_seed = ?seeds.seed_for(crate::reproducibility::DATA),
            "Seeds"
        );

        let (data, outcome) = match execute(config, pipeline, &seeds) {
            Ok(done) => done,
            Err(e) => {
                tracing::error!(state = %RunState::Failed, error = %e, "Experiment failed");
                return Err(e);
            }
        };

        enter(RunState::Persist);
        let bundle = ResultBundle {
            experiment_params: config.training_params(),
            data_params: DataSnapshot {
                params: config.data_params(),
                gc_true: data.synthetic.gc_rows(),
            },
            best_results: BestResults::from_outcome(&outcome),
            provenance: Provenance::new(config, started_at, Utc::now()),
        };
        if let Err(e) = persistence::atomic_write_json(&path, &bundle) {
            tracing::error!(path = %path.display(), error = %e, "Failed to persist result");
            return Err(e.into());
        }

        enter(RunState::Done);
        tracing::info!(
            path = %path.display(),
            duration_secs = bundle.provenance.duration_secs,
            "Experiment complete"
        );
        Ok(RunOutcome::Completed { path })
    }
}

fn execute<P: ExperimentPipeline + ?Sized>(
    config: &ExperimentConfig,
    pipeline: &mut P,
    seeds: &SeedManager,
) -> Result<(GeneratedData, TrainingOutcome), MlError> {
    enter(RunState::GenerateData);
    let data = pipeline.generate_data(config, seeds)?;
    enter(RunState::BuildModel);
    let model = pipeline.build_model(config, &data, seeds)?;
    enter(RunState::Train);
    let outcome = pipeline.train(config, &data, model)?;
    Ok((data, outcome))
}

fn enter(state: RunState) {
    tracing::debug!(state = %state, "Run state");
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuralgc_core::{LorenzData, LstmTraining, MlpTraining, Penalty};
    use pretty_assertions::assert_eq;

    fn mlp(nepoch: usize) -> MlpTraining {
        MlpTraining {
            nepoch,
            lr: 0.01,
            lam: 0.01,
            seed: 7,
            hidden: 3,
            network_lag: 2,
            penalty: Penalty::Hierarchical,
            weight_decay: 0.01,
            loss_check: 2,
        }
    }

    fn var() -> VarData {
        VarData {
            sparsity: 0.5,
            p: 4,
            t: 60,
            lag: 1,
            sd: 1.0,
            data_seed: -1,
        }
    }

    fn configs() -> Vec<ExperimentConfig> {
        vec![
            ExperimentConfig::new(ExperimentKind::LongVarMlp {
                training: MlpTraining {
                    penalty: Penalty::GroupLasso,
                    weight_decay: 0.0,
                    ..mlp(4)
                },
                data: VarData { lag: 2, ..var() },
            })
            .unwrap(),
            ExperimentConfig::new(ExperimentKind::StandardizedVarMlp {
                training: mlp(4),
                data: var(),
            })
            .unwrap(),
            ExperimentConfig::new(ExperimentKind::StandardizedVarLstm {
                training: LstmTraining {
                    nepoch: 3,
                    lr: 0.01,
                    lam: 0.01,
                    seed: 7,
                    hidden: 3,
                    cooldown: neuralgc_core::Cooldown::On,
                    window: 10,
                    stride: 5,
                    truncation: Some(4),
                    loss_check: 1,
                },
                data: var(),
            })
            .unwrap(),
            ExperimentConfig::new(ExperimentKind::LorenzMlp {
                training: mlp(4),
                data: LorenzData {
                    forcing: 10.0,
                    sd: 0.1,
                    dt: 0.05,
                    p: 4,
                    t: 40,
                    data_seed: 3,
                },
            })
            .unwrap(),
        ]
    }

    #[test]
    fn test_every_family_completes() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ExperimentRunner::new(dir.path());
        for config in configs() {
            let outcome = runner.run(&config, &mut SyntheticPipeline).unwrap();
            assert!(!outcome.is_skipped());
            let path = outcome.path();
            assert!(path.starts_with(dir.path().join(config.family().directory_name())));

            let bundle: ResultBundle = persistence::load_json(path).unwrap().unwrap();
            assert_eq!(bundle.experiment_params, config.training_params());
            assert_eq!(bundle.data_params.params, config.data_params());
            let p = bundle.data_params.gc_true.len();
            assert_eq!(bundle.best_results.gc_est.len(), p);
            assert!(bundle.best_results.gc_est.iter().all(|row| row.len() == p));
            assert_eq!(bundle.provenance.identity, config.identity().to_string());
        }
    }

    #[test]
    fn test_family_selection_policies() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ExperimentRunner::new(dir.path());
        let configs = configs();

        // Long VAR keeps a validation tail and reports it.
        let path = runner.run(&configs[0], &mut SyntheticPipeline).unwrap();
        let bundle: ResultBundle = persistence::load_json(path.path()).unwrap().unwrap();
        assert!(bundle.best_results.best_val_loss.is_some());
        assert!(bundle.best_results.predictions_val.is_some());

        // Final-epoch families report the last check for every output.
        let path = runner.run(&configs[1], &mut SyntheticPipeline).unwrap();
        let bundle: ResultBundle = persistence::load_json(path.path()).unwrap().unwrap();
        assert!(bundle.best_results.best_nepoch.iter().all(|&e| e == 4));
        assert!(bundle.best_results.val_loss.is_none());
        assert_eq!(bundle.best_results.check_epochs, vec![2, 4]);
    }

    #[test]
    fn test_mismatched_model_and_data_is_an_error() {
        let config = &configs()[1];
        let seeds = SeedManager::new(Some(1), None);
        let mut pipeline = SyntheticPipeline;
        let data = pipeline.generate_data(config, &seeds).unwrap();
        let lstm = LstmEncoding::new(
            LstmSpec {
                inputs: 4,
                outputs: 4,
                hidden: 2,
                lam: 0.0,
                truncation: None,
            },
            &mut seeds.model_rng(),
        )
        .unwrap();
        assert!(pipeline.train(config, &data, BuiltModel::Lstm(lstm)).is_err());
    }

    #[test]
    fn test_selection_by_family() {
        assert_eq!(selection(ExperimentFamily::LongVarMlp), Selection::BestValidation);
        assert_eq!(selection(ExperimentFamily::StandardizedVarLstm), Selection::BestObjective);
        assert_eq!(selection(ExperimentFamily::LorenzMlp), Selection::FinalEpoch);
    }
}
