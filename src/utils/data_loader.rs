//! Data loading utilities
//!
//! Reads CSV files with polars and converts them into the dense feature
//! matrix and label vector the pipeliner works on.

use crate::error::{PipelinerError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Features and labels extracted from a table
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub feature_names: Vec<String>,
    pub target_name: String,
}

/// CSV loader
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows used to infer the schema
    infer_schema_length: Option<usize>,
    separator: u8,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(100),
            separator: b',',
        }
    }

    /// Set the field separator
    pub fn with_separator(mut self, separator: u8) -> Self {
        self.separator = separator;
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelinerError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;

        let parse_opts = CsvParseOptions::default().with_separator(self.separator);
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .with_parse_options(parse_opts)
            .into_reader_with_file_handle(file)
            .finish()?;
        Ok(df)
    }

    /// Load a CSV file and split it into features and the `target` column.
    ///
    /// Every column must be numeric and complete.
    pub fn load_dataset(&self, path: impl AsRef<Path>, target: &str) -> Result<Dataset> {
        let start = Instant::now();
        let df = self.load_csv(&path)?;
        let dataset = dataframe_to_dataset(&df, target)?;
        info!(
            path = %path.as_ref().display(),
            rows = dataset.x.nrows(),
            features = dataset.x.ncols(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded dataset"
        );
        Ok(dataset)
    }
}

/// Split a frame into a feature matrix and the `target` column
pub fn dataframe_to_dataset(df: &DataFrame, target: &str) -> Result<Dataset> {
    let feature_names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|name| name.as_str() != target)
        .map(|s| s.to_string())
        .collect();
    if feature_names.is_empty() {
        return Err(PipelinerError::DataError("no feature columns".to_string()));
    }

    let y = Array1::from_vec(column_values(df, target)?);
    let columns = feature_names
        .iter()
        .map(|name| column_values(df, name))
        .collect::<Result<Vec<Vec<f64>>>>()?;

    let x = Array2::from_shape_fn((df.height(), columns.len()), |(r, c)| columns[c][r]);

    Ok(Dataset {
        x,
        y,
        feature_names,
        target_name: target.to_string(),
    })
}

/// A column cast to f64; missing values are rejected
fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df
        .column(name)
        .map_err(|_| PipelinerError::DataError(format!("column '{}' not found", name)))?;
    let cast = column.cast(&DataType::Float64)?;
    cast.f64()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                PipelinerError::DataError(format!("missing value in column '{}' at row {}", name, row))
            })
        })
        .collect()
}
