use crate::error::TrainingResult;
use std::path::{Path, PathBuf};

/// Filesystem layout for pipeline artifacts.
///
/// Every path is relative to a single root (normally the working directory):
/// `artifacts/`, `predictions/`, `prediction_artifacts/` and `logs/`.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub const ARTIFACT_DIR: &'static str = "artifacts";
    pub const PREDICTION_DIR: &'static str = "predictions";
    pub const UPLOAD_DIR: &'static str = "prediction_artifacts";
    pub const PREDICTION_FILE_NAME: &'static str = "predictions_file.csv";

    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn artifact_dir(&self) -> PathBuf {
        self.root.join(Self::ARTIFACT_DIR)
    }

    #[must_use]
    pub fn feature_store_path(&self) -> PathBuf {
        self.artifact_dir().join("wafer_fault.csv")
    }

    #[must_use]
    pub fn train_path(&self) -> PathBuf {
        self.artifact_dir().join("train.csv")
    }

    #[must_use]
    pub fn test_path(&self) -> PathBuf {
        self.artifact_dir().join("test.csv")
    }

    #[must_use]
    pub fn scaler_path(&self) -> PathBuf {
        self.artifact_dir().join("scaler.pkl")
    }

    /// Scaler fitted by a run whose model has not passed the acceptance gate yet.
    #[must_use]
    pub fn pending_scaler_path(&self) -> PathBuf {
        self.artifact_dir().join("scaler.pkl.pending")
    }

    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        self.artifact_dir().join("model.pkl")
    }

    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.artifact_dir().join("training_manifest.json")
    }

    #[must_use]
    pub fn prediction_dir(&self) -> PathBuf {
        self.root.join(Self::PREDICTION_DIR)
    }

    #[must_use]
    pub fn prediction_file_path(&self) -> PathBuf {
        self.prediction_dir().join(Self::PREDICTION_FILE_NAME)
    }

    #[must_use]
    pub fn upload_dir(&self) -> PathBuf {
        self.root.join(Self::UPLOAD_DIR)
    }

    pub fn ensure_artifact_dir(&self) -> TrainingResult<()> {
        std::fs::create_dir_all(self.artifact_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().to_path_buf());

        assert!(layout.feature_store_path().ends_with("artifacts/wafer_fault.csv"));
        assert!(layout.scaler_path().ends_with("artifacts/scaler.pkl"));
        assert!(layout.pending_scaler_path().ends_with("artifacts/scaler.pkl.pending"));
        assert!(layout.model_path().ends_with("artifacts/model.pkl"));
        assert!(layout.prediction_file_path().ends_with("predictions/predictions_file.csv"));
        assert!(layout.upload_dir().ends_with("prediction_artifacts"));
    }

    #[test]
    fn test_ensure_artifact_dir_creates_tree() {
        let temp = TempDir::new().unwrap();
        let layout = ArtifactLayout::new(temp.path().join("nested").join("root"));
        layout.ensure_artifact_dir().unwrap();
        assert!(layout.artifact_dir().is_dir());
    }
}
