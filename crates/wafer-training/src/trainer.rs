//! Model selection: evaluate every candidate, tune the winner, gate and persist it.

use crate::artifacts::{ArtifactKind, save_object};
use crate::config::{ModelSelectionConfig, TrainerConfig};
use crate::error::{Stage, StageResult, TrainingError, TrainingResult};
use crate::grid::GridSearch;
use crate::layout::ArtifactLayout;
use crate::models::{Classifier, Estimator, ModelKind, ParamSet, accuracy};
use crate::progress::RunLog;
use crate::transformation::Partition;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainerState {
    EvaluateAll,
    SelectBest,
    TuneBest,
    Refit,
    ValidateGate,
    Persist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub model: String,
    pub accuracy: f64,
}

/// Test accuracy per evaluated model, in evaluation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelReport {
    scores: Vec<ModelScore>,
}

impl ModelReport {
    pub fn insert(&mut self, model: &str, accuracy: f64) {
        match self.scores.iter_mut().find(|s| s.model == model) {
            Some(existing) => existing.accuracy = accuracy,
            None => self.scores.push(ModelScore { model: model.to_string(), accuracy }),
        }
    }

    pub fn get(&self, model: &str) -> Option<f64> {
        self.scores.iter().find(|s| s.model == model).map(|s| s.accuracy)
    }

    pub fn scores(&self) -> &[ModelScore] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Highest accuracy; the earliest entry wins ties.
    pub fn best(&self) -> Option<&ModelScore> {
        let mut best: Option<&ModelScore> = None;
        for score in &self.scores {
            if best.is_none_or(|b| score.accuracy > b.accuracy) {
                best = Some(score);
            }
        }
        best
    }
}

#[derive(Debug, Clone)]
pub struct TrainerOutcome {
    pub model_name: String,
    pub model_kind: ModelKind,
    pub accuracy: f64,
    pub best_params: ParamSet,
    pub report: ModelReport,
    pub model_path: PathBuf,
}

pub struct ModelTrainer<'a> {
    layout: &'a ArtifactLayout,
    config: &'a TrainerConfig,
    selection: &'a ModelSelectionConfig,
    candidates: Vec<ModelKind>,
    log: RunLog,
}

impl<'a> ModelTrainer<'a> {
    pub fn new(
        layout: &'a ArtifactLayout,
        config: &'a TrainerConfig,
        selection: &'a ModelSelectionConfig,
        log: RunLog,
    ) -> Self {
        Self { layout, config, selection, candidates: ModelKind::ALL.to_vec(), log }
    }

    /// Restrict the candidate set, keeping the given order.
    #[must_use]
    pub fn with_candidates(mut self, candidates: Vec<ModelKind>) -> Self {
        self.candidates = candidates;
        self
    }

    #[track_caller]
    pub fn initiate(&self, train: &Partition, test: &Partition) -> StageResult<TrainerOutcome> {
        self.log.stage(Stage::Training, || self.run(train, test))
    }

    fn run(&self, train: &Partition, test: &Partition) -> TrainingResult<TrainerOutcome> {
        self.log.trainer_state(TrainerState::EvaluateAll);
        let report = self.evaluate_all(train, test);

        self.log.trainer_state(TrainerState::SelectBest);
        let best = report.best().ok_or(TrainingError::NoModelEvaluated)?;
        let kind = ModelKind::from_name(&best.model).ok_or(TrainingError::NoModelEvaluated)?;
        self.log.info(
            Stage::Training,
            format!("best untuned model: {} (accuracy {:.4})", best.model, best.accuracy),
        );

        self.log.trainer_state(TrainerState::TuneBest);
        let grid = self.selection.grid_for(kind);
        let search = GridSearch::new(self.config.cv_folds).search(
            &Classifier::new(kind),
            &grid,
            train.x.view(),
            train.y.view(),
        )?;
        if search.best_score.is_finite() {
            self.log.info(
                Stage::Training,
                format!(
                    "grid search over {} candidates for {kind}: best CV accuracy {:.4}",
                    search.scores.len(),
                    search.best_score
                ),
            );
        } else {
            self.log.info(Stage::Training, format!("no search grid for {kind}; keeping default parameters"));
        }

        self.log.trainer_state(TrainerState::Refit);
        let mut model = Classifier::new(kind);
        model.set_params(&search.best_params)?;
        model.fit(train.x.view(), train.y.view())?;
        let predicted = model.predict(test.x.view())?;
        let final_accuracy = accuracy(test.y.view(), predicted.view())?;
        self.log.model_scored(kind.name(), final_accuracy);

        self.log.trainer_state(TrainerState::ValidateGate);
        if final_accuracy < self.config.expected_accuracy {
            return Err(TrainingError::Acceptance {
                model: kind.name().to_string(),
                accuracy: final_accuracy,
                threshold: self.config.expected_accuracy,
            });
        }

        self.log.trainer_state(TrainerState::Persist);
        let model_path = self.layout.model_path();
        save_object(&model_path, ArtifactKind::Model, &model)?;
        self.log.info(Stage::Training, format!("model written to {}", model_path.display()));

        Ok(TrainerOutcome {
            model_name: kind.name().to_string(),
            model_kind: kind,
            accuracy: final_accuracy,
            best_params: search.best_params,
            report,
            model_path,
        })
    }

    fn evaluate_all(&self, train: &Partition, test: &Partition) -> ModelReport {
        let mut report = ModelReport::default();
        for kind in &self.candidates {
            match score_candidate(*kind, train, test) {
                Ok(score) => {
                    self.log.model_scored(kind.name(), score);
                    report.insert(kind.name(), score);
                }
                Err(err) => {
                    debug!(model = kind.name(), error = %err, "candidate evaluation failed");
                    self.log.warn(Stage::Training, format!("{kind} excluded from the report: {err}"));
                }
            }
        }
        report
    }
}

/// Fit `kind` with default parameters on `train` and score it on `test`.
fn score_candidate(kind: ModelKind, train: &Partition, test: &Partition) -> TrainingResult<f64> {
    let mut model = Classifier::new(kind);
    model.fit(train.x.view(), train.y.view())?;
    let predicted = model.predict(test.x.view())?;
    accuracy(test.y.view(), predicted.view())
}
