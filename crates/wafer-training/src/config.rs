//! Pipeline configuration.
//!
//! `wafer.toml` drives the pipeline itself; `config/model.yaml` holds the
//! hyperparameter grids and `config/schema.yaml` the sensor layout.
//!
//! Precedence: environment variables, then the TOML file, then defaults.

use crate::error::{TrainingError, TrainingResult};
use crate::layout::ArtifactLayout;
use crate::models::{ModelKind, ParamGrid};
use crate::schema::SensorSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "wafer.toml";

/// Where the scaler learns its statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerFit {
    /// Fit on the training partition only.
    #[default]
    TrainSplit,
    /// Fit on every row before splitting. Test rows leak into the scaler.
    FullDataset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_uri")]
    pub uri: String,
    #[serde(default = "default_collection")]
    pub collection: String,
}

fn default_store_uri() -> String {
    "wafer.db".to_string()
}

fn default_collection() -> String {
    "waferfault".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { uri: default_store_uri(), collection: default_collection() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_test_ratio() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { test_ratio: default_test_ratio(), seed: default_seed() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Acceptance gate: the refit model must reach at least this test accuracy.
    #[serde(default = "default_expected_accuracy")]
    pub expected_accuracy: f64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Hyperparameter grids. `None` tunes over empty grids.
    #[serde(default = "default_model_config_path")]
    pub model_config_path: Option<PathBuf>,
}

fn default_expected_accuracy() -> f64 {
    0.5
}

fn default_cv_folds() -> usize {
    5
}

#[allow(clippy::unnecessary_wraps)]
fn default_model_config_path() -> Option<PathBuf> {
    Some(PathBuf::from("config").join("model.yaml"))
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            expected_accuracy: default_expected_accuracy(),
            cv_folds: default_cv_folds(),
            model_config_path: default_model_config_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory every relative path below is resolved against.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub scaler_fit: ScalerFit,
    #[serde(default)]
    pub trainer: TrainerConfig,
    /// Sensor layout. A missing file falls back to the 590-sensor default.
    #[serde(default = "default_schema_config_path")]
    pub schema_config_path: Option<PathBuf>,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

#[allow(clippy::unnecessary_wraps)]
fn default_schema_config_path() -> Option<PathBuf> {
    Some(PathBuf::from("config").join("schema.yaml"))
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            store: StoreConfig::default(),
            split: SplitConfig::default(),
            scaler_fit: ScalerFit::default(),
            trainer: TrainerConfig::default(),
            schema_config_path: default_schema_config_path(),
            log_dir: default_log_dir(),
        }
    }
}

impl PipelineConfig {
    /// Configuration rooted at `root` with every other value defaulted.
    #[must_use]
    pub fn for_root(root: &Path) -> Self {
        Self { root: root.to_path_buf(), ..Self::default() }
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> TrainingResult<Self> {
        if !path.exists() {
            return Err(TrainingError::Config(format!("configuration file not found: {}", path.display())));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        if config.root.is_relative() {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                config.root = parent.join(&config.root);
            }
        }
        Ok(config)
    }

    /// Load `path` when given, else `./wafer.toml` when present, else defaults;
    /// environment overrides are applied last.
    pub fn discover(path: Option<&Path>) -> TrainingResult<Self> {
        let mut config = match path {
            Some(p) => Self::load_from_file(p)?,
            None => {
                let local = Path::new(CONFIG_FILE_NAME);
                if local.exists() { Self::load_from_file(local)? } else { Self::default() }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `WAFER_ROOT`, `WAFER_STORE_URI` and `WAFER_STORE_COLLECTION`.
    pub fn apply_env_overrides<F: Fn(&str) -> Option<String>>(&mut self, lookup: F) {
        if let Some(root) = lookup("WAFER_ROOT") {
            self.root = PathBuf::from(root);
        }
        if let Some(uri) = lookup("WAFER_STORE_URI") {
            self.store.uri = uri;
        }
        if let Some(collection) = lookup("WAFER_STORE_COLLECTION") {
            self.store.collection = collection;
        }
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(self.root.clone())
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.root.join(path) }
    }

    /// Store URI with relative file paths resolved against `root`.
    pub fn store_uri(&self) -> String {
        if self.store.uri == ":memory:" || Path::new(&self.store.uri).is_absolute() {
            self.store.uri.clone()
        } else {
            self.root.join(&self.store.uri).to_string_lossy().to_string()
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.resolve(&self.log_dir)
    }

    pub fn schema(&self) -> TrainingResult<SensorSchema> {
        match &self.schema_config_path {
            Some(path) => {
                let path = self.resolve(path);
                if path.exists() { Ok(SchemaConfig::load(&path)?.schema) } else { Ok(SensorSchema::default()) }
            }
            None => Ok(SensorSchema::default()),
        }
    }

    pub fn model_selection(&self) -> TrainingResult<ModelSelectionConfig> {
        match &self.trainer.model_config_path {
            Some(path) => ModelSelectionConfig::load(&self.resolve(path)),
            None => Ok(ModelSelectionConfig::default()),
        }
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if !(self.split.test_ratio > 0.0 && self.split.test_ratio < 1.0) {
            return Err(TrainingError::Config("split.test_ratio must be in (0, 1)".to_string()));
        }
        if self.trainer.cv_folds < 2 {
            return Err(TrainingError::Config("trainer.cv_folds must be >= 2".to_string()));
        }
        if !(0.0..=1.0).contains(&self.trainer.expected_accuracy) {
            return Err(TrainingError::Config("trainer.expected_accuracy must be in [0, 1]".to_string()));
        }
        if self.store.collection.trim().is_empty() {
            return Err(TrainingError::Config("store.collection is required".to_string()));
        }
        Ok(())
    }
}

/// `config/model.yaml`:
///
/// ```yaml
/// model_selection:
///   model:
///     SVC:
///       search_param_grid:
///         C: [0.5, 1.0]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSelectionConfig {
    #[serde(default)]
    pub model_selection: ModelSelection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSelection {
    #[serde(default)]
    pub model: BTreeMap<String, ModelSearchConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSearchConfig {
    #[serde(default)]
    pub search_param_grid: ParamGrid,
}

impl ModelSelectionConfig {
    pub fn load(path: &Path) -> TrainingResult<Self> {
        if !path.exists() {
            return Err(TrainingError::Config(format!("model config not found: {}", path.display())));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Grid for `kind`; a model without an entry gets an empty grid.
    pub fn grid_for(&self, kind: ModelKind) -> ParamGrid {
        self.model_selection
            .model
            .get(kind.name())
            .map(|m| m.search_param_grid.clone())
            .unwrap_or_default()
    }
}

/// `config/schema.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub schema: SensorSchema,
}

impl SchemaConfig {
    pub fn load(path: &Path) -> TrainingResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParamValue;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.split.seed, 42);
        assert!((config.split.test_ratio - 0.2).abs() < f64::EPSILON);
        assert!((config.trainer.expected_accuracy - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.trainer.cv_folds, 5);
        assert_eq!(config.scaler_fit, ScalerFit::TrainSplit);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_toml_resolves_root_next_to_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("wafer.toml");
        std::fs::write(
            &path,
            r#"
scaler_fit = "full_dataset"

[store]
collection = "sensors"

[trainer]
expected_accuracy = 0.6
"#,
        )
        .unwrap();

        let config = PipelineConfig::load_from_file(&path).unwrap();
        assert_eq!(config.scaler_fit, ScalerFit::FullDataset);
        assert_eq!(config.store.collection, "sensors");
        assert_eq!(config.store.uri, "wafer.db");
        assert!((config.trainer.expected_accuracy - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.root, temp.path().join("."));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = PipelineConfig::default();
        config.apply_env_overrides(|key| match key {
            "WAFER_STORE_URI" => Some(":memory:".to_string()),
            "WAFER_STORE_COLLECTION" => Some("other".to_string()),
            _ => None,
        });
        assert_eq!(config.store_uri(), ":memory:");
        assert_eq!(config.store.collection, "other");
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let mut config = PipelineConfig::default();
        config.split.test_ratio = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_model_selection_yaml() {
        let yaml = r#"
model_selection:
  model:
    SVC:
      search_param_grid:
        C: [0.5, 1.0]
        kernel: ["rbf", "linear"]
"#;
        let config: ModelSelectionConfig = serde_yaml::from_str(yaml).unwrap();
        let grid = config.grid_for(ModelKind::Svc);
        assert_eq!(grid["C"], vec![ParamValue::Float(0.5), ParamValue::Float(1.0)]);
        assert_eq!(grid["kernel"][1], ParamValue::Text("linear".to_string()));
        assert!(config.grid_for(ModelKind::RandomForest).is_empty());
    }

    #[test]
    fn test_schema_falls_back_to_default_when_file_missing() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::for_root(temp.path());
        assert_eq!(config.schema().unwrap(), SensorSchema::default());
    }

    #[test]
    fn test_missing_model_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let config = PipelineConfig::for_root(temp.path());
        assert!(matches!(config.model_selection(), Err(TrainingError::Config(_))));
    }
}
