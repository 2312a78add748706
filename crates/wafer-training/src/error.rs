use std::fmt;
use std::panic::Location;
use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

/// Result returned by stage entry points (`initiate`, `run`).
pub type StageResult<T> = std::result::Result<T, StageError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no documents found in collection `{collection}`")]
    EmptyCollection { collection: String },

    #[error("schema mismatch: expected {expected} columns, found {found}; {context}")]
    SchemaMismatch { expected: usize, found: usize, context: String },

    #[error("no candidate model could be evaluated")]
    NoModelEvaluated,

    #[error("model `{model}` reached accuracy {accuracy:.4}, below the acceptance threshold {threshold:.4}")]
    Acceptance { model: String, accuracy: f64, threshold: f64 },

    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("invalid parameters for {model}: {message}")]
    InvalidParams { model: String, message: String },

    #[error("grid search failed for {model}: every candidate errored")]
    GridSearchFailed { model: String },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("artifact error: {0}")]
    Artifact(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Encode(#[from] bincode::error::EncodeError),

    #[error(transparent)]
    Decode(#[from] bincode::error::DecodeError),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl TrainingError {
    pub(crate) fn invalid_params(model: &str, message: impl Into<String>) -> Self {
        Self::InvalidParams { model: model.to_string(), message: message.into() }
    }
}

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingestion,
    Transformation,
    Training,
    Prediction,
}

impl Stage {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ingestion => "data_ingestion",
            Self::Transformation => "data_transformation",
            Self::Training => "model_trainer",
            Self::Prediction => "prediction",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform error crossing a stage boundary.
///
/// `location` is captured for diagnostics only; callers branch on `source`.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    pub location: &'static Location<'static>,
    #[source]
    pub source: TrainingError,
}

impl StageError {
    #[track_caller]
    pub fn new(stage: Stage, source: TrainingError) -> Self {
        Self { stage, location: Location::caller(), source }
    }

    pub fn kind(&self) -> &TrainingError {
        &self.source
    }
}
