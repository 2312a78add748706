//! End-to-end training runs over in-process and SQLite document stores.
//!
//! These tests drive the full pipeline:
//! - Exporting documents into the feature store
//! - Imputation, label mapping, splitting and scaling
//! - Model selection, the acceptance gate and artifact persistence

mod common;

use common::{informative_cell, pipeline_config, sensor_documents};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wafer_training::artifacts::sha256_file;
use wafer_training::progress::MemoryProgressSink;
use wafer_training::{
    ArtifactKind, Classifier, DocumentStore, MemoryDocumentStore, ModelKind, Partition, ProgressEvent, RunLog,
    SqliteDocumentStore, Stage, StandardScaler, TrainingError, TrainingManifest, TrainingPipeline, load_object,
};

#[test]
fn test_full_width_zero_data_trains_and_persists() {
    let temp = TempDir::new().unwrap();
    let config = pipeline_config(temp.path(), 590, 0.0);
    let layout = config.layout();
    let store = MemoryDocumentStore::with_documents("waferfault", sensor_documents(100, 590, |_, _| json!(0)));

    let pipeline = TrainingPipeline::new(config, Arc::new(store), RunLog::tracing());
    let accuracy = pipeline.run().unwrap();

    assert!((0.0..=1.0).contains(&accuracy));
    assert!(layout.model_path().exists());
    assert!(layout.scaler_path().exists());
    assert!(layout.feature_store_path().exists());

    let scaler: StandardScaler = load_object(&layout.scaler_path(), ArtifactKind::Scaler).unwrap();
    assert_eq!(scaler.n_features(), 590);
    let train = Partition::read_csv(&layout.train_path(), "Good/Bad").unwrap();
    let test = Partition::read_csv(&layout.test_path(), "Good/Bad").unwrap();
    assert_eq!((train.n_rows(), test.n_rows()), (80, 20));
}

#[test]
fn test_informative_sensor_passes_default_gate() {
    let temp = TempDir::new().unwrap();
    let config = pipeline_config(temp.path(), 5, 0.5);
    let layout = config.layout();
    let store = MemoryDocumentStore::with_documents("waferfault", sensor_documents(60, 5, informative_cell));
    let sink = Arc::new(MemoryProgressSink::default());

    let pipeline = TrainingPipeline::new(config, Arc::new(store), RunLog::new(sink.clone()));
    let manifest = pipeline.run_with_manifest().unwrap();

    assert!((manifest.accuracy - 1.0).abs() < f64::EPSILON);
    assert_eq!(manifest.report.len(), 4);
    assert!(ModelKind::from_name(&manifest.model_name).is_some());
    assert_eq!(manifest.artifacts.len(), 5);
    assert!(manifest.artifacts.iter().all(|a| a.sha256.len() == 64));

    let on_disk = TrainingManifest::read(&layout.manifest_path()).unwrap();
    assert_eq!(on_disk.model_name, manifest.model_name);
    assert_eq!(&on_disk.run_id, pipeline.log().run_id());

    let model: Classifier = load_object(&layout.model_path(), ArtifactKind::Model).unwrap();
    assert_eq!(model.name(), manifest.model_name);

    let events = sink.events();
    assert!(matches!(events.first(), Some(ProgressEvent::RunStarted { .. })));
    assert!(matches!(events.last(), Some(ProgressEvent::RunFinished { success: true, .. })));
    let scored = events.iter().filter(|e| matches!(e, ProgressEvent::ModelScored { .. })).count();
    assert_eq!(scored, 5);
}

#[test]
fn test_stored_labels_map_to_classes() {
    let temp = TempDir::new().unwrap();
    let config = pipeline_config(temp.path(), 5, 0.0);
    let layout = config.layout();
    let store = MemoryDocumentStore::with_documents("waferfault", sensor_documents(40, 5, informative_cell));

    TrainingPipeline::new(config, Arc::new(store), RunLog::tracing()).run().unwrap();

    let train = Partition::read_csv(&layout.train_path(), "Good/Bad").unwrap();
    let test = Partition::read_csv(&layout.test_path(), "Good/Bad").unwrap();
    let labels: Vec<f64> = train.y.iter().chain(test.y.iter()).copied().collect();
    assert!(labels.iter().all(|y| *y == 0.0 || *y == 1.0));
    assert_eq!(labels.iter().filter(|y| **y == 0.0).count(), 20);
    assert_eq!(labels.iter().filter(|y| **y == 1.0).count(), 20);
}

#[test]
fn test_acceptance_failure_writes_no_model() {
    let temp = TempDir::new().unwrap();
    let config = pipeline_config(temp.path(), 3, 1.0);
    let layout = config.layout();
    // Constant sensors leave nothing to learn, so no model reaches 100%.
    let store = MemoryDocumentStore::with_documents("waferfault", sensor_documents(50, 3, |_, _| json!(0)));
    let sink = Arc::new(MemoryProgressSink::default());

    let err = TrainingPipeline::new(config, Arc::new(store), RunLog::new(sink.clone())).run().unwrap_err();

    assert_eq!(err.stage, Stage::Training);
    match err.source {
        TrainingError::Acceptance { accuracy, threshold, .. } => {
            assert!(accuracy < threshold);
            assert!((threshold - 1.0).abs() < f64::EPSILON);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!layout.model_path().exists());
    assert!(!layout.manifest_path().exists());
    // The feature store stays behind; the rejected run's scaler does not.
    assert!(layout.feature_store_path().exists());
    assert!(!layout.scaler_path().exists());
    assert!(!layout.pending_scaler_path().exists());
    assert!(matches!(sink.events().last(), Some(ProgressEvent::RunFinished { success: false, .. })));
}

#[test]
fn test_rejected_rerun_keeps_accepted_model_and_scaler() {
    let temp = TempDir::new().unwrap();
    let accepted = pipeline_config(temp.path(), 3, 0.5);
    let layout = accepted.layout();
    let store = MemoryDocumentStore::with_documents("waferfault", sensor_documents(60, 3, informative_cell));
    TrainingPipeline::new(accepted, Arc::new(store), RunLog::tracing()).run().unwrap();

    let scaler_bytes = std::fs::read(layout.scaler_path()).unwrap();
    let model_bytes = std::fs::read(layout.model_path()).unwrap();

    let rejected = pipeline_config(temp.path(), 3, 1.0);
    let store = MemoryDocumentStore::with_documents("waferfault", sensor_documents(50, 3, |_, s| json!(s * 10)));
    let err = TrainingPipeline::new(rejected, Arc::new(store), RunLog::tracing()).run().unwrap_err();
    assert!(matches!(err.source, TrainingError::Acceptance { .. }));

    assert_eq!(std::fs::read(layout.scaler_path()).unwrap(), scaler_bytes);
    assert_eq!(std::fs::read(layout.model_path()).unwrap(), model_bytes);
    assert!(!layout.pending_scaler_path().exists());

    let manifest = TrainingManifest::read(&layout.manifest_path()).unwrap();
    for kind in [ArtifactKind::Scaler, ArtifactKind::Model] {
        let entry = manifest.artifacts.iter().find(|a| a.kind == kind).unwrap();
        assert_eq!(entry.sha256, sha256_file(&entry.path).unwrap(), "{kind:?}");
    }
}

#[test]
fn test_empty_collection_fails_in_ingestion() {
    let temp = TempDir::new().unwrap();
    let config = pipeline_config(temp.path(), 3, 0.0);
    let layout = config.layout();

    let err = TrainingPipeline::new(config, Arc::new(MemoryDocumentStore::new("waferfault")), RunLog::tracing())
        .run()
        .unwrap_err();

    assert_eq!(err.stage, Stage::Ingestion);
    assert!(matches!(err.source, TrainingError::EmptyCollection { .. }));
    assert!(!layout.feature_store_path().exists());
}

#[test]
fn test_schema_mismatch_fails_in_ingestion() {
    let temp = TempDir::new().unwrap();
    let config = pipeline_config(temp.path(), 4, 0.0);
    let store = MemoryDocumentStore::with_documents("waferfault", sensor_documents(10, 3, |_, _| json!(1)));

    let err = TrainingPipeline::new(config, Arc::new(store), RunLog::tracing()).run().unwrap_err();

    assert_eq!(err.stage, Stage::Ingestion);
    assert!(matches!(err.source, TrainingError::SchemaMismatch { expected: 5, found: 4, .. }));
}

#[test]
fn test_positionally_named_documents_are_relabelled() {
    let temp = TempDir::new().unwrap();
    let config = pipeline_config(temp.path(), 3, 0.0);
    let layout = config.layout();
    let docs = (0..20)
        .map(|i| {
            json!({"0": i % 3, "1": "na", "2": i % 2, "3": common::stored_label(i)})
                .as_object()
                .cloned()
                .unwrap()
        })
        .collect();
    let store = MemoryDocumentStore::with_documents("waferfault", docs);

    TrainingPipeline::new(config, Arc::new(store), RunLog::tracing()).run().unwrap();

    let header = std::fs::read_to_string(layout.feature_store_path()).unwrap();
    assert!(header.starts_with("Sensor-1,Sensor-2,Sensor-3,Good/Bad\n"));
}

#[test]
fn test_from_config_reads_sqlite_store_and_writes_run_log() {
    let temp = TempDir::new().unwrap();
    let config = pipeline_config(temp.path(), 5, 0.5);
    let layout = config.layout();
    let seeded = SqliteDocumentStore::connect(&config.store_uri(), &config.store.collection).unwrap();
    assert_eq!(seeded.insert_many(&sensor_documents(40, 5, informative_cell)).unwrap(), 40);
    drop(seeded);

    let log_dir = config.log_dir();
    let pipeline = TrainingPipeline::from_config(config).unwrap();
    let accuracy = pipeline.run().unwrap();

    assert!(accuracy >= 0.5);
    assert!(layout.model_path().exists());
    let log_files: Vec<_> = std::fs::read_dir(&log_dir).unwrap().filter_map(Result::ok).collect();
    assert_eq!(log_files.len(), 1);
    let text = std::fs::read_to_string(log_files[0].path()).unwrap();
    assert!(text.lines().count() > 5);
    assert!(text.contains("run_finished"));
}

#[test]
fn test_rerun_overwrites_artifacts() {
    let temp = TempDir::new().unwrap();
    let config = pipeline_config(temp.path(), 5, 0.0);
    let layout = config.layout();
    let store: Arc<dyn DocumentStore> =
        Arc::new(MemoryDocumentStore::with_documents("waferfault", sensor_documents(30, 5, informative_cell)));

    TrainingPipeline::new(config.clone(), store.clone(), RunLog::tracing()).run().unwrap();
    let first = std::fs::read(layout.train_path()).unwrap();
    TrainingPipeline::new(config, store, RunLog::tracing()).run().unwrap();
    let second = std::fs::read(layout.train_path()).unwrap();

    assert_eq!(first, second);
}
