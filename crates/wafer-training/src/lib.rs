//! Wafer Training
//!
//! Fault-detection pipeline for semiconductor wafer sensor data:
//! - Exporting the raw document collection into a feature store (`DataIngestion`)
//! - Imputing, splitting and scaling it (`DataTransformation`)
//! - Selecting, tuning and gating a classifier (`ModelTrainer`)
//! - Labelling uploaded sensor files with the persisted model (`PredictionPipeline`)

pub mod artifacts;
pub mod config;
pub mod error;
pub mod frame;
pub mod grid;
pub mod ingestion;
pub mod layout;
pub mod models;
pub mod pipeline;
pub mod prediction;
pub mod progress;
pub mod schema;
pub mod store;
pub mod trainer;
pub mod transformation;

pub use artifacts::{ArtifactKind, TrainingArtifact, TrainingManifest, load_object, save_object};
pub use config::{PipelineConfig, ScalerFit, SplitConfig, StoreConfig, TrainerConfig};
pub use error::{Stage, StageError, StageResult, TrainingError, TrainingResult};
pub use frame::Frame;
pub use grid::{GridSearch, GridSearchResult};
pub use ingestion::DataIngestion;
pub use layout::ArtifactLayout;
pub use models::{Classifier, Estimator, ModelKind, ParamGrid, ParamSet, ParamValue};
pub use pipeline::{TrainingPipeline, open_run_log};
pub use prediction::{PredictionFile, PredictionPipeline, UploadedFile};
pub use progress::{ProgressEvent, ProgressSink, RunLog};
pub use schema::SensorSchema;
pub use store::{Document, DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
pub use trainer::{ModelReport, ModelTrainer, TrainerOutcome, TrainerState};
pub use transformation::{DataTransformation, Partition, StandardScaler, TransformationOutput};
