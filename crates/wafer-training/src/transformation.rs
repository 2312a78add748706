//! Clean, split and scale the feature store into train/test partitions.

use crate::artifacts::{ArtifactKind, save_object};
use crate::config::{ScalerFit, SplitConfig};
use crate::error::{Stage, StageResult, TrainingError, TrainingResult};
use crate::frame::Frame;
use crate::layout::ArtifactLayout;
use crate::progress::RunLog;
use crate::schema::{SensorSchema, stored_label_to_class};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-feature standardization to zero mean and unit variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    feature_names: Vec<String>,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Population statistics of each column. A constant column gets scale 1.
    pub fn fit(feature_names: Vec<String>, x: ArrayView2<'_, f64>) -> TrainingResult<Self> {
        if x.nrows() == 0 {
            return Err(TrainingError::Dataset("cannot fit a scaler on zero rows".to_string()));
        }
        if feature_names.len() != x.ncols() {
            return Err(TrainingError::SchemaMismatch {
                expected: feature_names.len(),
                found: x.ncols(),
                context: "scaler feature names do not match the matrix width".to_string(),
            });
        }
        let mut mean = Vec::with_capacity(x.ncols());
        let mut scale = Vec::with_capacity(x.ncols());
        for column in x.axis_iter(Axis(1)) {
            let m = column.sum() / column.len() as f64;
            let var = column.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / column.len() as f64;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std > f64::EPSILON { std } else { 1.0 });
        }
        Ok(Self { feature_names, mean, scale })
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn transform(&self, x: ArrayView2<'_, f64>) -> TrainingResult<Array2<f64>> {
        self.check_width(x.ncols())?;
        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            column.mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }

    /// Scale raw cells; a missing cell takes the feature mean, i.e. scales to 0.
    pub fn transform_cells(&self, rows: &[Vec<Option<f64>>]) -> TrainingResult<Array2<f64>> {
        let mut out = Array2::<f64>::zeros((rows.len(), self.n_features()));
        for (i, row) in rows.iter().enumerate() {
            self.check_width(row.len())?;
            for (j, cell) in row.iter().enumerate() {
                out[[i, j]] = cell.map_or(0.0, |v| (v - self.mean[j]) / self.scale[j]);
            }
        }
        Ok(out)
    }

    fn check_width(&self, found: usize) -> TrainingResult<()> {
        if found == self.n_features() {
            Ok(())
        } else {
            Err(TrainingError::SchemaMismatch {
                expected: self.n_features(),
                found,
                context: "input width differs from the fitted scaler".to_string(),
            })
        }
    }
}

/// Scaled feature rows with their class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl Partition {
    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    /// Features followed by the target column.
    pub fn to_frame(&self, feature_names: &[String], target: &str) -> TrainingResult<Frame> {
        let mut columns = feature_names.to_vec();
        columns.push(target.to_string());
        let mut frame = Frame::new(columns);
        for (row, label) in self.x.rows().into_iter().zip(self.y.iter()) {
            let mut cells: Vec<Option<f64>> = row.iter().copied().map(Some).collect();
            cells.push(Some(*label));
            frame.push_row(cells)?;
        }
        Ok(frame)
    }

    /// Read a partition written by [`Self::to_frame`].
    pub fn read_csv(path: &Path, target: &str) -> TrainingResult<Self> {
        let frame = Frame::read_csv(path)?;
        let target_idx = frame.column_index(target).ok_or_else(|| TrainingError::SchemaMismatch {
            expected: frame.n_cols() + 1,
            found: frame.n_cols(),
            context: format!("{} has no `{target}` column", path.display()),
        })?;
        let n_features = frame.n_cols() - 1;
        let mut x = Array2::<f64>::zeros((frame.n_rows(), n_features));
        let mut y = Array1::<f64>::zeros(frame.n_rows());
        for (i, row) in frame.rows().iter().enumerate() {
            let mut j = 0;
            for (c, cell) in row.iter().enumerate() {
                let value = cell.ok_or_else(|| {
                    TrainingError::Dataset(format!("{}: row {} has a missing cell", path.display(), i + 1))
                })?;
                if c == target_idx {
                    y[i] = value;
                } else {
                    x[[i, j]] = value;
                    j += 1;
                }
            }
        }
        Ok(Self { x, y })
    }
}

#[derive(Debug, Clone)]
pub struct TransformationOutput {
    pub train: Partition,
    pub test: Partition,
    pub feature_names: Vec<String>,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    /// Staged scaler; the training pipeline promotes it once a model is accepted.
    pub scaler_path: PathBuf,
}

/// Shuffle `0..n` with `seed` and cut the first `ceil(n * test_ratio)` indices
/// off as the test partition. Returns `(train, test)`.
pub fn train_test_split(n: usize, test_ratio: f64, seed: u64) -> TrainingResult<(Vec<usize>, Vec<usize>)> {
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(TrainingError::Config(format!("test ratio must be in (0, 1), got {test_ratio}")));
    }
    let n_test = (n as f64 * test_ratio).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(TrainingError::Dataset(format!(
            "{n} rows cannot be split with test ratio {test_ratio}"
        )));
    }
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Fill missing feature cells with their column mean over every row.
/// A column with no observed value is filled with 0.
pub fn impute_column_means(frame: &mut Frame, skip: Option<usize>) {
    for j in 0..frame.n_cols() {
        if Some(j) == skip {
            continue;
        }
        let (sum, count) = frame
            .column_values(j)
            .flatten()
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        let mean = if count == 0 { 0.0 } else { sum / count as f64 };
        for row in frame.rows_mut() {
            if row[j].is_none() {
                row[j] = Some(mean);
            }
        }
    }
}

/// Relabel an integer-indexed header (`0, 1, ...`) to the schema names.
fn repair_header(frame: &mut Frame, schema: &SensorSchema, log: &RunLog) -> TrainingResult<()> {
    if frame.columns().first().map(String::as_str) != Some("0") {
        return Ok(());
    }
    let n = frame.n_cols();
    let mut names: Vec<String> = (1..n).map(|i| format!("{}{i}", schema.sensor_prefix)).collect();
    names.push(schema.target_column.clone());
    frame.rename_columns(names)?;
    log.warn(Stage::Transformation, "integer-indexed header relabelled to sensor names");
    Ok(())
}

pub struct DataTransformation<'a> {
    layout: &'a ArtifactLayout,
    schema: &'a SensorSchema,
    split: &'a SplitConfig,
    scaler_fit: ScalerFit,
    log: RunLog,
}

impl<'a> DataTransformation<'a> {
    pub fn new(
        layout: &'a ArtifactLayout,
        schema: &'a SensorSchema,
        split: &'a SplitConfig,
        scaler_fit: ScalerFit,
        log: RunLog,
    ) -> Self {
        Self { layout, schema, split, scaler_fit, log }
    }

    #[track_caller]
    pub fn initiate(&self, feature_store_path: &Path) -> StageResult<TransformationOutput> {
        self.log.stage(Stage::Transformation, || self.transform(feature_store_path))
    }

    fn transform(&self, feature_store_path: &Path) -> TrainingResult<TransformationOutput> {
        let mut frame = Frame::read_csv(feature_store_path)?;
        repair_header(&mut frame, self.schema, &self.log)?;

        let target = self.schema.target_column.as_str();
        let Some(target_idx) = frame.column_index(target) else {
            return Err(TrainingError::SchemaMismatch {
                expected: self.schema.column_count(),
                found: frame.n_cols(),
                context: format!("target column `{target}` is missing"),
            });
        };
        if frame.n_cols() != self.schema.column_count() {
            return Err(TrainingError::SchemaMismatch {
                expected: self.schema.column_count(),
                found: frame.n_cols(),
                context: format!("{} does not match the sensor schema", feature_store_path.display()),
            });
        }
        if frame.n_rows() == 0 {
            return Err(TrainingError::Dataset(format!("{} has no rows", feature_store_path.display())));
        }

        let mut labels = Vec::with_capacity(frame.n_rows());
        for (i, row) in frame.rows().iter().enumerate() {
            let class = row[target_idx].and_then(stored_label_to_class).ok_or_else(|| {
                TrainingError::Dataset(format!(
                    "row {} has label {:?}; expected 1 or -1",
                    i + 1,
                    row[target_idx]
                ))
            })?;
            labels.push(class);
        }

        impute_column_means(&mut frame, Some(target_idx));
        let feature_names: Vec<String> =
            frame.columns().iter().enumerate().filter(|(j, _)| *j != target_idx).map(|(_, c)| c.clone()).collect();
        let mut x = Array2::<f64>::zeros((frame.n_rows(), feature_names.len()));
        for (i, row) in frame.rows().iter().enumerate() {
            let features = row.iter().enumerate().filter(|(j, _)| *j != target_idx);
            for (k, (_, cell)) in features.enumerate() {
                x[[i, k]] = cell.unwrap_or(0.0);
            }
        }
        let y = Array1::from(labels);

        let (train_idx, test_idx) = train_test_split(frame.n_rows(), self.split.test_ratio, self.split.seed)?;
        let raw_train = x.select(Axis(0), &train_idx);
        let raw_test = x.select(Axis(0), &test_idx);
        let scaler = match self.scaler_fit {
            ScalerFit::TrainSplit => StandardScaler::fit(feature_names.clone(), raw_train.view())?,
            ScalerFit::FullDataset => StandardScaler::fit(feature_names.clone(), x.view())?,
        };
        let train = Partition { x: scaler.transform(raw_train.view())?, y: y.select(Axis(0), &train_idx) };
        let test = Partition { x: scaler.transform(raw_test.view())?, y: y.select(Axis(0), &test_idx) };
        self.log.info(
            Stage::Transformation,
            format!(
                "split {} rows into {} train / {} test; scaler fit on {:?}",
                frame.n_rows(),
                train.n_rows(),
                test.n_rows(),
                self.scaler_fit
            ),
        );

        self.layout.ensure_artifact_dir()?;
        let train_path = self.layout.train_path();
        let test_path = self.layout.test_path();
        let scaler_path = self.layout.pending_scaler_path();
        train.to_frame(&feature_names, target)?.write_csv(&train_path)?;
        test.to_frame(&feature_names, target)?.write_csv(&test_path)?;
        save_object(&scaler_path, ArtifactKind::Scaler, &scaler)?;

        Ok(TransformationOutput { train, test, feature_names, train_path, test_path, scaler_path })
    }
}
