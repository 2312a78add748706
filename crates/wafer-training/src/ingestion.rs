//! Export the raw document collection into the feature store CSV.

use crate::error::{Stage, StageResult, TrainingError, TrainingResult};
use crate::frame::{Frame, parse_cell};
use crate::layout::ArtifactLayout;
use crate::progress::RunLog;
use crate::schema::{ID_FIELD, SensorSchema};
use crate::store::{Document, DocumentStore};
use serde_json::Value;
use std::path::PathBuf;

pub struct DataIngestion<'a> {
    store: &'a dyn DocumentStore,
    layout: &'a ArtifactLayout,
    schema: &'a SensorSchema,
    log: RunLog,
}

impl<'a> DataIngestion<'a> {
    pub fn new(store: &'a dyn DocumentStore, layout: &'a ArtifactLayout, schema: &'a SensorSchema, log: RunLog) -> Self {
        Self { store, layout, schema, log }
    }

    /// Write every document of the collection to the feature store and
    /// return its path.
    #[track_caller]
    pub fn initiate(&self) -> StageResult<PathBuf> {
        self.log.stage(Stage::Ingestion, || {
            let documents = self.store.find()?;
            self.log.info(
                Stage::Ingestion,
                format!("read {} documents from `{}`", documents.len(), self.store.collection()),
            );
            let frame = documents_to_frame(&documents, self.store.collection(), self.schema, &self.log)?;

            self.layout.ensure_artifact_dir()?;
            let path = self.layout.feature_store_path();
            frame.write_csv(&path)?;
            self.log.info(
                Stage::Ingestion,
                format!("feature store written to {} ({} rows)", path.display(), frame.n_rows()),
            );
            Ok(path)
        })
    }
}

/// Convert documents into a frame laid out as `schema` expects.
///
/// Columns are the union of document keys in first-seen order, without the
/// store identifier. A column count matching the schema with different names
/// is relabelled positionally.
pub fn documents_to_frame(
    documents: &[Document],
    collection: &str,
    schema: &SensorSchema,
    log: &RunLog,
) -> TrainingResult<Frame> {
    let Some(first) = documents.first() else {
        return Err(TrainingError::EmptyCollection { collection: collection.to_string() });
    };

    let mut columns: Vec<String> = Vec::new();
    for doc in documents {
        for key in doc.keys() {
            if key != ID_FIELD && !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    if columns.len() != schema.column_count() {
        let mut sample = first.clone();
        sample.remove(ID_FIELD);
        return Err(TrainingError::SchemaMismatch {
            expected: schema.column_count(),
            found: columns.len(),
            context: format!("first document: {}", Value::Object(sample)),
        });
    }

    let mut frame = Frame::new(columns.clone());
    for (row_idx, doc) in documents.iter().enumerate() {
        let mut row = Vec::with_capacity(columns.len());
        for name in &columns {
            row.push(cell_value(doc.get(name), row_idx, name)?);
        }
        frame.push_row(row)?;
    }

    let expected = schema.expected_columns();
    if frame.columns() != expected.as_slice() {
        log.warn(
            Stage::Ingestion,
            format!("column names differ from the expected schema; relabelling {} columns positionally", expected.len()),
        );
        frame.rename_columns(expected)?;
    }
    Ok(frame)
}

fn cell_value(value: Option<&Value>, row_idx: usize, column: &str) -> TrainingResult<Option<f64>> {
    let invalid = |shown: &dyn std::fmt::Display| {
        TrainingError::Dataset(format!("document {} field `{column}` is not numeric: {shown}", row_idx + 1))
    };
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| invalid(n)),
        Some(Value::String(s)) => parse_cell(s).ok_or_else(|| invalid(&format!("`{s}`"))),
        Some(other) => Err(invalid(other)),
    }
}
