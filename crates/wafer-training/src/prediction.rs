//! Score an uploaded sensor CSV with the persisted scaler and model.

use crate::artifacts::{ArtifactKind, load_object};
use crate::error::{Stage, StageResult, TrainingError, TrainingResult};
use crate::frame::Frame;
use crate::layout::ArtifactLayout;
use crate::models::{Classifier, Estimator};
use crate::progress::RunLog;
use crate::schema::{CLASS_GOOD, SensorSchema, UNNAMED_PREFIX, class_to_label};
use crate::transformation::StandardScaler;
use std::path::{Path, PathBuf};

/// A CSV file received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), bytes }
    }

    /// Read a local file as if it had been uploaded under its own name.
    pub fn from_path(path: &Path) -> TrainingResult<Self> {
        if !path.exists() {
            return Err(TrainingError::FileNotFound(path.to_path_buf()));
        }
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        Ok(Self { name, bytes: std::fs::read(path)? })
    }

    /// Final path component of the client-supplied name.
    pub fn safe_name(&self) -> TrainingResult<String> {
        let trimmed = self.name.trim().replace('\\', "/");
        Path::new(&trimmed)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty() && n != "..")
            .ok_or_else(|| TrainingError::Dataset(format!("upload name `{}` has no file name", self.name)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictionFile {
    pub path: PathBuf,
    pub name: String,
}

pub struct PredictionPipeline<'a> {
    layout: &'a ArtifactLayout,
    schema: &'a SensorSchema,
    log: RunLog,
}

impl<'a> PredictionPipeline<'a> {
    pub fn new(layout: &'a ArtifactLayout, schema: &'a SensorSchema, log: RunLog) -> Self {
        Self { layout, schema, log }
    }

    /// Save the upload, label every row and write the prediction file.
    #[track_caller]
    pub fn run(&self, upload: &UploadedFile) -> StageResult<PredictionFile> {
        self.log.start("prediction");
        let result = self.log.stage(Stage::Prediction, || self.predict(upload));
        if let Err(err) = self.log.finish(result.is_ok()) {
            tracing::warn!(error = %err, "failed to flush the run log");
        }
        result
    }

    fn predict(&self, upload: &UploadedFile) -> TrainingResult<PredictionFile> {
        let input_path = self.save_upload(upload)?;
        self.log.info(Stage::Prediction, format!("upload saved to {}", input_path.display()));

        let model: Classifier = load_object(&self.layout.model_path(), ArtifactKind::Model)?;
        let scaler: StandardScaler = load_object(&self.layout.scaler_path(), ArtifactKind::Scaler)?;

        let mut frame = Frame::read_csv(&input_path)?;
        self.conform(&mut frame)?;

        let sensor_count = self.schema.sensor_count;
        let cells: Vec<Vec<Option<f64>>> = frame.rows().iter().map(|row| row[..sensor_count].to_vec()).collect();
        let x = scaler.transform_cells(&cells)?;
        let classes = model.predict(x.view())?;
        let labels: Vec<&str> = classes.iter().map(|c| class_to_label(*c)).collect();

        let target = self.schema.target_column.as_str();
        frame.drop_columns_where(|c| c == target);
        let path = self.layout.prediction_file_path();
        frame.write_csv_with_column(&path, Some((target, labels.as_slice())))?;

        let good = classes.iter().filter(|c| **c == CLASS_GOOD).count();
        self.log.info(
            Stage::Prediction,
            format!("{} rows scored with {} ({good} good); written to {}", labels.len(), model.name(), path.display()),
        );
        let name = path
            .file_name()
            .map_or_else(|| ArtifactLayout::PREDICTION_FILE_NAME.to_string(), |n| n.to_string_lossy().to_string());
        Ok(PredictionFile { path, name })
    }

    fn save_upload(&self, upload: &UploadedFile) -> TrainingResult<PathBuf> {
        let dir = self.layout.upload_dir();
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(upload.safe_name()?);
        std::fs::write(&path, &upload.bytes)?;
        Ok(path)
    }

    /// Drop row-index columns, then make the leading columns the sensor columns.
    fn conform(&self, frame: &mut Frame) -> TrainingResult<()> {
        let dropped = frame.drop_columns_where(|c| c.starts_with(UNNAMED_PREFIX));
        if !dropped.is_empty() {
            self.log.info(Stage::Prediction, format!("dropped index columns {dropped:?}"));
        }

        let sensors = self.schema.sensor_columns();
        if frame.n_cols() < sensors.len() {
            return Err(TrainingError::SchemaMismatch {
                expected: sensors.len(),
                found: frame.n_cols(),
                context: "uploaded file has too few sensor columns".to_string(),
            });
        }
        if frame.columns()[..sensors.len()] != sensors[..] {
            self.log.warn(
                Stage::Prediction,
                format!("sensor headers differ; keeping the first {} columns relabelled positionally", sensors.len()),
            );
            frame.truncate_columns(sensors.len());
            frame.rename_columns(sensors)?;
        }
        Ok(())
    }
}
