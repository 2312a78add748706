//! Column-named numeric tables and their CSV representation.

use crate::error::{TrainingError, TrainingResult};
use crate::schema::UNNAMED_PREFIX;
use std::path::Path;

/// Tokens read as a missing cell.
const MISSING_TOKENS: [&str; 6] = ["", "na", "NA", "nan", "NaN", "null"];

/// A column-named table of numeric cells; `None` marks a missing value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Option<f64>>>,
}

impl Frame {
    #[must_use]
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns, rows: Vec::new() }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Option<f64>>>) -> TrainingResult<Self> {
        let mut frame = Self::new(columns);
        for row in rows {
            frame.push_row(row)?;
        }
        Ok(frame)
    }

    pub fn push_row(&mut self, row: Vec<Option<f64>>) -> TrainingResult<()> {
        if row.len() != self.columns.len() {
            return Err(TrainingError::Dataset(format!(
                "row {} has {} cells, expected {}",
                self.rows.len() + 1,
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Option<f64>>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Vec<Option<f64>>] {
        &mut self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Relabel every column positionally. Cell values and order are untouched.
    pub fn rename_columns(&mut self, names: Vec<String>) -> TrainingResult<()> {
        if names.len() != self.columns.len() {
            return Err(TrainingError::SchemaMismatch {
                expected: names.len(),
                found: self.columns.len(),
                context: "cannot relabel columns positionally".to_string(),
            });
        }
        self.columns = names;
        Ok(())
    }

    /// Keep only the first `n` columns.
    pub fn truncate_columns(&mut self, n: usize) {
        self.columns.truncate(n);
        for row in &mut self.rows {
            row.truncate(n);
        }
    }

    /// Remove every column whose name satisfies `predicate`; returns the removed names.
    pub fn drop_columns_where<F: Fn(&str) -> bool>(&mut self, predicate: F) -> Vec<String> {
        let keep: Vec<bool> = self.columns.iter().map(|c| !predicate(c)).collect();
        if keep.iter().all(|k| *k) {
            return Vec::new();
        }

        let mut dropped = Vec::new();
        let mut columns = Vec::with_capacity(self.columns.len());
        for (name, keep_it) in self.columns.drain(..).zip(&keep) {
            if *keep_it {
                columns.push(name);
            } else {
                dropped.push(name);
            }
        }
        self.columns = columns;

        for row in &mut self.rows {
            let mut idx = 0;
            row.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
        dropped
    }

    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = Option<f64>> + '_ {
        self.rows.iter().map(move |row| row[idx])
    }

    pub fn read_csv(path: &Path) -> TrainingResult<Self> {
        if !path.exists() {
            return Err(TrainingError::FileNotFound(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
        let columns: Vec<String> =
            reader.headers()?.iter().enumerate().map(|(idx, h)| header_name(idx, h)).collect();
        let mut frame = Self::new(columns);

        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            let mut row = Vec::with_capacity(record.len());
            for (col_idx, cell) in record.iter().enumerate() {
                let value = parse_cell(cell).ok_or_else(|| {
                    TrainingError::Dataset(format!(
                        "{}: row {} column `{}` is not numeric: `{}`",
                        path.display(),
                        row_idx + 1,
                        frame.columns.get(col_idx).map_or("?", String::as_str),
                        cell
                    ))
                })?;
                row.push(value);
            }
            frame.push_row(row)?;
        }

        Ok(frame)
    }

    pub fn write_csv(&self, path: &Path) -> TrainingResult<()> {
        self.write_csv_with_column::<&str>(path, None)
    }

    /// Write the table, optionally appending one text column (one value per row).
    pub fn write_csv_with_column<S: AsRef<str>>(
        &self,
        path: &Path,
        extra: Option<(&str, &[S])>,
    ) -> TrainingResult<()> {
        if let Some((_, values)) = extra {
            if values.len() != self.rows.len() {
                return Err(TrainingError::Dataset(format!(
                    "extra column has {} values for {} rows",
                    values.len(),
                    self.rows.len()
                )));
            }
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;
        let mut header: Vec<&str> = self.columns.iter().map(String::as_str).collect();
        if let Some((name, _)) = extra {
            header.push(name);
        }
        writer.write_record(&header)?;

        for (idx, row) in self.rows.iter().enumerate() {
            let mut record: Vec<String> = row.iter().map(|cell| format_cell(*cell)).collect();
            if let Some((_, values)) = extra {
                record.push(values[idx].as_ref().to_string());
            }
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Parse one CSV cell. `Some(None)` is a missing value, `None` is unparseable.
pub fn parse_cell(raw: &str) -> Option<Option<f64>> {
    let trimmed = raw.trim();
    if MISSING_TOKENS.contains(&trimmed) {
        return Some(None);
    }
    trimmed.parse::<f64>().ok().map(|v| if v.is_nan() { None } else { Some(v) })
}

/// A blank header (a written row index) is named `Unnamed: <position>`.
fn header_name(idx: usize, raw: &str) -> String {
    let name = raw.trim();
    if name.is_empty() { format!("{UNNAMED_PREFIX}: {idx}") } else { name.to_string() }
}

fn format_cell(cell: Option<f64>) -> String {
    cell.map_or_else(String::new, |v| format!("{v}"))
}
