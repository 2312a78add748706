//! End-to-end training run: ingestion, transformation, model selection.

use crate::artifacts::{ArtifactKind, TrainingManifest, discard_artifact, make_artifact, promote_artifact};
use crate::config::PipelineConfig;
use crate::error::{Stage, StageError, StageResult, TrainingResult};
use crate::ingestion::DataIngestion;
use crate::layout::ArtifactLayout;
use crate::progress::{FanoutSink, JsonlFileSink, ProgressSink, RunLog, TracingProgressSink};
use crate::store::{DocumentStore, SqliteDocumentStore};
use crate::trainer::{ModelTrainer, TrainerOutcome};
use crate::transformation::{DataTransformation, TransformationOutput};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Run log writing to `tracing` and to a JSON-lines file under the configured log directory.
pub fn open_run_log(config: &PipelineConfig) -> TrainingResult<RunLog> {
    let file = Arc::new(JsonlFileSink::create(&config.log_dir())?);
    let sinks: Vec<Arc<dyn ProgressSink>> = vec![Arc::new(TracingProgressSink), file];
    Ok(RunLog::new(Arc::new(FanoutSink::new(sinks))))
}

pub struct TrainingPipeline {
    config: PipelineConfig,
    store: Arc<dyn DocumentStore>,
    log: RunLog,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn DocumentStore>, log: RunLog) -> Self {
        Self { config, store, log }
    }

    /// Pipeline over the SQLite store and run log named by `config`.
    pub fn from_config(config: PipelineConfig) -> TrainingResult<Self> {
        config.validate()?;
        let store = SqliteDocumentStore::connect(&config.store_uri(), &config.store.collection)?;
        let log = open_run_log(&config)?;
        Ok(Self::new(config, Arc::new(store), log))
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    /// Train, gate and persist a model; returns its test accuracy.
    pub fn run(&self) -> StageResult<f64> {
        self.run_with_manifest().map(|manifest| manifest.accuracy)
    }

    /// As [`Self::run`], returning the manifest written next to the artifacts.
    pub fn run_with_manifest(&self) -> StageResult<TrainingManifest> {
        self.log.start("training");
        let result = self.execute();
        if let Err(err) = &result {
            warn!(run_id = %self.log.run_id(), stage = %err.stage, error = %err.source, "training run failed");
        }
        if let Err(err) = self.log.finish(result.is_ok()) {
            warn!(error = %err, "failed to flush the run log");
        }
        result
    }

    fn execute(&self) -> StageResult<TrainingManifest> {
        let layout = self.config.layout();
        let schema = self.config.schema().map_err(|e| StageError::new(Stage::Ingestion, e))?;
        let selection = self.config.model_selection().map_err(|e| StageError::new(Stage::Training, e))?;

        let feature_store = DataIngestion::new(self.store.as_ref(), &layout, &schema, self.log.clone()).initiate()?;

        let transformed = DataTransformation::new(
            &layout,
            &schema,
            &self.config.split,
            self.config.scaler_fit,
            self.log.clone(),
        )
        .initiate(&feature_store)?;

        let trained = ModelTrainer::new(&layout, &self.config.trainer, &selection, self.log.clone())
            .initiate(&transformed.train, &transformed.test);
        let outcome = match trained {
            Ok(outcome) => outcome,
            Err(err) => {
                // The live model keeps the scaler it was trained with.
                if let Err(cleanup) = discard_artifact(&transformed.scaler_path) {
                    warn!(error = %cleanup, "failed to remove the staged scaler");
                }
                return Err(err);
            }
        };
        promote_artifact(&transformed.scaler_path, &layout.scaler_path())
            .map_err(|e| StageError::new(Stage::Training, e))?;

        let manifest = self
            .write_manifest(&layout, &feature_store, &transformed, &outcome)
            .map_err(|e| StageError::new(Stage::Training, e))?;

        self.log.info(
            Stage::Training,
            format!("training completed with {} at accuracy {:.4}", manifest.model_name, manifest.accuracy),
        );
        Ok(manifest)
    }

    fn write_manifest(
        &self,
        layout: &ArtifactLayout,
        feature_store: &Path,
        transformed: &TransformationOutput,
        outcome: &TrainerOutcome,
    ) -> TrainingResult<TrainingManifest> {
        let manifest = TrainingManifest {
            run_id: self.log.run_id().clone(),
            created_at: chrono::Utc::now(),
            model_name: outcome.model_name.clone(),
            accuracy: outcome.accuracy,
            best_params: outcome.best_params.clone(),
            report: outcome.report.clone(),
            artifacts: vec![
                make_artifact(ArtifactKind::FeatureStore, feature_store.to_path_buf())?,
                make_artifact(ArtifactKind::TrainSplit, transformed.train_path.clone())?,
                make_artifact(ArtifactKind::TestSplit, transformed.test_path.clone())?,
                make_artifact(ArtifactKind::Scaler, layout.scaler_path())?,
                make_artifact(ArtifactKind::Model, outcome.model_path.clone())?,
            ],
        };
        manifest.write(&layout.manifest_path())?;
        Ok(manifest)
    }
}
