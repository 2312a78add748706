//! Shared fixtures for wafer-training integration tests.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::path::Path;
use wafer_training::{Document, PipelineConfig};

/// Stored label for row `i`: Good (`1`) on even rows, Bad (`-1`) on odd rows.
pub fn stored_label(i: usize) -> i64 {
    if i % 2 == 0 { 1 } else { -1 }
}

/// `n_rows` documents over `sensor_count` sensors; `cell(row, sensor)` gives
/// each sensor value (sensors are 1-based).
pub fn sensor_documents(n_rows: usize, sensor_count: usize, cell: impl Fn(usize, usize) -> Value) -> Vec<Document> {
    (0..n_rows)
        .map(|i| {
            let mut doc = Document::new();
            doc.insert("_id".to_string(), json!(format!("doc-{i}")));
            for s in 1..=sensor_count {
                doc.insert(format!("Sensor-{s}"), cell(i, s));
            }
            doc.insert("Good/Bad".to_string(), json!(stored_label(i)));
            doc
        })
        .collect()
}

/// `Sensor-1` carries the label with a margin; other sensors are label-free noise.
pub fn informative_cell(row: usize, sensor: usize) -> Value {
    if sensor == 1 {
        let jitter = (row % 5) as f64 * 0.1;
        json!(stored_label(row) as f64 * (1.0 + jitter))
    } else {
        json!(((row * 7 + sensor * 3) % 11) as f64)
    }
}

/// Configuration rooted at `root` with a `sensor_count`-wide schema, no
/// hyperparameter grids and the given acceptance threshold.
pub fn pipeline_config(root: &Path, sensor_count: usize, expected_accuracy: f64) -> PipelineConfig {
    let config_dir = root.join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("schema.yaml"), format!("schema:\n  sensor_count: {sensor_count}\n")).unwrap();

    let mut config = PipelineConfig::for_root(root);
    config.trainer.model_config_path = None;
    config.trainer.expected_accuracy = expected_accuracy;
    config
}

/// Sensor CSV as a client would upload it: a leading row-index column, then
/// the sensors from `cell`.
pub fn upload_csv(n_rows: usize, sensor_count: usize, cell: impl Fn(usize, usize) -> Value) -> String {
    let mut header = vec!["Unnamed: 0".to_string()];
    header.extend((1..=sensor_count).map(|s| format!("Sensor-{s}")));
    let mut text = header.join(",");
    text.push('\n');
    for i in 0..n_rows {
        let mut row = vec![i.to_string()];
        row.extend((1..=sensor_count).map(|s| cell(i, s).to_string()));
        text.push_str(&row.join(","));
        text.push('\n');
    }
    text
}

/// Sensor CSV written by `DataFrame.to_csv` over a frame that was itself read
/// with its index: a blank-headed index column, then `Unnamed: 0`, then the
/// sensors from `cell`.
pub fn indexed_upload_csv(n_rows: usize, sensor_count: usize, cell: impl Fn(usize, usize) -> Value) -> String {
    let mut header = vec![String::new(), "Unnamed: 0".to_string()];
    header.extend((1..=sensor_count).map(|s| format!("Sensor-{s}")));
    let mut text = header.join(",");
    text.push('\n');
    for i in 0..n_rows {
        let mut row = vec![i.to_string(), (i + 100).to_string()];
        row.extend((1..=sensor_count).map(|s| cell(i, s).to_string()));
        text.push_str(&row.join(","));
        text.push('\n');
    }
    text
}
