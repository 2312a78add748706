//! Expected column layout of wafer sensor tables.

use serde::{Deserialize, Serialize};

pub const DEFAULT_SENSOR_COUNT: usize = 590;
pub const DEFAULT_SENSOR_PREFIX: &str = "Sensor-";
pub const TARGET_COLUMN: &str = "Good/Bad";
pub const ID_FIELD: &str = "_id";
/// Header prefix pandas-style writers give to a serialized row index.
pub const UNNAMED_PREFIX: &str = "Unnamed";

/// Label values as stored in the document collection.
pub const STORED_GOOD: f64 = 1.0;
pub const STORED_BAD: f64 = -1.0;
/// Label values used for training and prediction.
pub const CLASS_GOOD: f64 = 1.0;
pub const CLASS_BAD: f64 = 0.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSchema {
    #[serde(default = "default_sensor_count")]
    pub sensor_count: usize,
    #[serde(default = "default_sensor_prefix")]
    pub sensor_prefix: String,
    #[serde(default = "default_target_column")]
    pub target_column: String,
}

fn default_sensor_count() -> usize {
    DEFAULT_SENSOR_COUNT
}

fn default_sensor_prefix() -> String {
    DEFAULT_SENSOR_PREFIX.to_string()
}

fn default_target_column() -> String {
    TARGET_COLUMN.to_string()
}

impl Default for SensorSchema {
    fn default() -> Self {
        Self {
            sensor_count: DEFAULT_SENSOR_COUNT,
            sensor_prefix: DEFAULT_SENSOR_PREFIX.to_string(),
            target_column: TARGET_COLUMN.to_string(),
        }
    }
}

impl SensorSchema {
    #[must_use]
    pub fn with_sensor_count(sensor_count: usize) -> Self {
        Self { sensor_count, ..Self::default() }
    }

    /// `Sensor-1 .. Sensor-N`.
    pub fn sensor_columns(&self) -> Vec<String> {
        (1..=self.sensor_count).map(|i| format!("{}{i}", self.sensor_prefix)).collect()
    }

    /// Sensor columns followed by the target column.
    pub fn expected_columns(&self) -> Vec<String> {
        let mut cols = self.sensor_columns();
        cols.push(self.target_column.clone());
        cols
    }

    pub fn column_count(&self) -> usize {
        self.sensor_count + 1
    }
}

/// Map a stored label (`1` / `-1`) to its training class (`1` / `0`).
pub fn stored_label_to_class(value: f64) -> Option<f64> {
    if value == STORED_GOOD {
        Some(CLASS_GOOD)
    } else if value == STORED_BAD {
        Some(CLASS_BAD)
    } else {
        None
    }
}

/// Map a predicted class to its display label.
pub fn class_to_label(class: f64) -> &'static str {
    if class == CLASS_GOOD { "Good" } else { "Bad" }
}
