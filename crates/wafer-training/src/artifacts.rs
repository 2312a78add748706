//! Artifact codec and training manifest.
//!
//! Binary artifacts (scaler, model) are bincode-encoded behind a small header
//! naming the artifact kind, so a scaler file can never be loaded as a model.
//! Writes go to a sibling temp file that is renamed into place.

use crate::error::{TrainingError, TrainingResult};
use crate::models::ParamSet;
use crate::progress::RunId;
use crate::trainer::ModelReport;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    FeatureStore,
    TrainSplit,
    TestSplit,
    Scaler,
    Model,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactHeader {
    version: u32,
    kind: ArtifactKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingArtifact {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingManifest {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub model_name: String,
    pub accuracy: f64,
    #[serde(default)]
    pub best_params: ParamSet,
    pub report: ModelReport,
    pub artifacts: Vec<TrainingArtifact>,
}

impl TrainingManifest {
    pub fn write(&self, path: &Path) -> TrainingResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }

    pub fn read(path: &Path) -> TrainingResult<Self> {
        if !path.exists() {
            return Err(TrainingError::ArtifactNotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Serialize `value` to `path` as an artifact of the given kind.
pub fn save_object<T: Serialize>(path: &Path, kind: ArtifactKind, value: &T) -> TrainingResult<()> {
    let config = bincode::config::standard();
    let mut bytes = bincode::serde::encode_to_vec(ArtifactHeader { version: FORMAT_VERSION, kind }, config)?;
    bytes.extend(bincode::serde::encode_to_vec(value, config)?);
    write_atomic(path, &bytes)?;
    debug!(path = %path.display(), ?kind, bytes = bytes.len(), "artifact saved");
    Ok(())
}

/// Load an artifact previously written by [`save_object`].
pub fn load_object<T: DeserializeOwned>(path: &Path, kind: ArtifactKind) -> TrainingResult<T> {
    if !path.exists() {
        return Err(TrainingError::ArtifactNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    let config = bincode::config::standard();

    let (header, read): (ArtifactHeader, usize) = bincode::serde::decode_from_slice(&bytes, config)?;
    if header.version != FORMAT_VERSION {
        return Err(TrainingError::Artifact(format!(
            "{} has format version {}, expected {}",
            path.display(),
            header.version,
            FORMAT_VERSION
        )));
    }
    if header.kind != kind {
        return Err(TrainingError::Artifact(format!(
            "{} holds a {:?} artifact, expected {:?}",
            path.display(),
            header.kind,
            kind
        )));
    }

    let (value, _): (T, usize) = bincode::serde::decode_from_slice(&bytes[read..], config)?;
    debug!(path = %path.display(), ?kind, "artifact loaded");
    Ok(value)
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> TrainingResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Move a staged artifact over its live path.
pub fn promote_artifact(staged: &Path, path: &Path) -> TrainingResult<()> {
    if !staged.exists() {
        return Err(TrainingError::ArtifactNotFound(staged.to_path_buf()));
    }
    std::fs::rename(staged, path)?;
    debug!(from = %staged.display(), to = %path.display(), "artifact promoted");
    Ok(())
}

/// Remove a staged artifact; a missing file is fine.
pub fn discard_artifact(staged: &Path) -> TrainingResult<()> {
    match std::fs::remove_file(staged) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(kind: ArtifactKind, path: PathBuf) -> TrainingResult<TrainingArtifact> {
    if !path.exists() {
        return Err(TrainingError::ArtifactNotFound(path));
    }

    let hash = sha256_file(&path)?;
    Ok(TrainingArtifact { kind, path, sha256: hash })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Weights {
        weights: Vec<f64>,
        label: String,
    }

    #[test]
    fn test_save_then_load_returns_same_value() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("weights.pkl");
        let weights = Weights { weights: vec![0.5, -1.25, 3.0], label: "weights".to_string() };

        save_object(&path, ArtifactKind::Model, &weights).unwrap();
        let loaded: Weights = load_object(&path, ArtifactKind::Model).unwrap();
        assert_eq!(loaded, weights);
    }

    #[test]
    fn test_load_missing_artifact_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = load_object::<Weights>(&temp.path().join("model.pkl"), ArtifactKind::Model).unwrap_err();
        assert!(matches!(err, TrainingError::ArtifactNotFound(_)));
    }

    #[test]
    fn test_load_rejects_wrong_kind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scaler.pkl");
        save_object(&path, ArtifactKind::Scaler, &vec![1.0f64, 2.0]).unwrap();

        let err = load_object::<Vec<f64>>(&path, ArtifactKind::Model).unwrap_err();
        assert!(matches!(err, TrainingError::Artifact(_)));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.pkl");
        save_object(&path, ArtifactKind::Model, &42u32).unwrap();

        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["model.pkl".to_string()]);
    }

    #[test]
    fn test_promote_replaces_live_artifact() {
        let temp = TempDir::new().unwrap();
        let live = temp.path().join("scaler.pkl");
        let staged = temp.path().join("scaler.pkl.pending");
        save_object(&live, ArtifactKind::Scaler, &1u32).unwrap();
        save_object(&staged, ArtifactKind::Scaler, &2u32).unwrap();

        promote_artifact(&staged, &live).unwrap();
        assert!(!staged.exists());
        assert_eq!(load_object::<u32>(&live, ArtifactKind::Scaler).unwrap(), 2);
        assert!(matches!(promote_artifact(&staged, &live), Err(TrainingError::ArtifactNotFound(_))));
    }

    #[test]
    fn test_discard_tolerates_missing_file() {
        let temp = TempDir::new().unwrap();
        let staged = temp.path().join("scaler.pkl.pending");
        discard_artifact(&staged).unwrap();
        std::fs::write(&staged, b"x").unwrap();
        discard_artifact(&staged).unwrap();
        assert!(!staged.exists());
    }

    #[test]
    fn test_make_artifact_hashes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("train.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let artifact = make_artifact(ArtifactKind::TrainSplit, path).unwrap();
        assert_eq!(artifact.sha256.len(), 64);
    }
}
