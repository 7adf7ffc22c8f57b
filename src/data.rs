//! Dataset loading and feature extraction using Polars

use ndarray::Array2;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;

use crate::error::{Error, Result};
use crate::features::{FEATURE_NAMES, FULL_FEATURE_COUNT, SUBSET_FEATURE_NAMES};

/// Seed for batch sampling. Fixed so the same dataset and sample size
/// always select the same rows.
pub const BATCH_SAMPLE_SEED: u64 = 42;

/// Rows shown by dataset and batch previews.
pub const PREVIEW_ROWS: usize = 10;

/// Row and column counts plus the required columns the dataset lacks
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetInfo {
    pub rows: usize,
    pub columns: usize,
    pub missing: Vec<String>,
}

impl DatasetInfo {
    pub fn from_frame(df: &DataFrame) -> Self {
        Self {
            rows: df.height(),
            columns: df.width(),
            missing: missing_columns(df),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// One-line status as shown next to a loaded dataset.
    pub fn status(&self) -> String {
        if self.is_complete() {
            "All required columns present".to_string()
        } else {
            format!("Missing: [{}]", self.missing.join(", "))
        }
    }
}

/// Load a CSV dataset
///
/// # Arguments
/// * `file_path` - Path to the CSV file, with a header row
pub fn load_dataset(file_path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(file_path.to_path_buf()))?
        .finish()?;

    tracing::info!(
        path = %file_path.display(),
        rows = df.height(),
        columns = df.width(),
        "dataset loaded"
    );
    Ok(df)
}

/// Columns a batch dataset must carry: the classifier columns followed by
/// any clustering column not already among them.
pub fn required_columns() -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = FEATURE_NAMES.to_vec();
    for name in SUBSET_FEATURE_NAMES {
        if !columns.contains(&name) {
            columns.push(name);
        }
    }
    columns
}

/// Required columns absent from `df`, in canonical order.
pub fn missing_columns(df: &DataFrame) -> Vec<String> {
    required_columns()
        .into_iter()
        .filter(|name| df.column(name).is_err())
        .map(str::to_string)
        .collect()
}

/// First `rows` rows of the required columns present in `df`, as `f64`
/// rounded to three decimals.
pub fn preview_frame(df: &DataFrame, rows: usize) -> Result<DataFrame> {
    let head = df.head(Some(rows));
    let columns = required_columns()
        .into_iter()
        .filter(|name| head.column(name).is_ok())
        .map(|name| -> Result<Column> {
            let values = head.column(name)?.cast(&DataType::Float64)?;
            let rounded: Vec<Option<f64>> = values
                .f64()?
                .iter()
                .map(|v| v.map(|x| (x * 1000.0).round() / 1000.0))
                .collect();
            Ok(Column::from(Series::new(name.into(), rounded)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(DataFrame::new(columns)?)
}

/// Extract one column as `f64`, rejecting nulls and non-numeric values.
pub fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    let values = column.f64()?;

    let null_count = values.null_count();
    if null_count > 0 {
        return Err(Error::schema(format!(
            "column {} has {} missing or non-numeric values",
            name, null_count
        )));
    }

    Ok(values.into_no_null_iter().collect())
}

/// Classifier feature matrix (n_rows, 20) in [`FEATURE_NAMES`] order.
pub fn feature_matrix(df: &DataFrame) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let columns = FEATURE_NAMES
        .iter()
        .map(|name| numeric_column(df, name))
        .collect::<Result<Vec<_>>>()?;

    let mut data = Vec::with_capacity(n_rows * FULL_FEATURE_COUNT);
    for row in 0..n_rows {
        data.extend(columns.iter().map(|column| column[row]));
    }

    Array2::from_shape_vec((n_rows, FULL_FEATURE_COUNT), data).map_err(|e| Error::schema(e.to_string()))
}

/// Row indices to evaluate for a requested sample size, or `None` when the
/// whole dataset is used (`sample_size` of 0 or at least `n_rows`).
/// Sampled indices are distinct and returned in ascending order.
pub fn sample_indices(n_rows: usize, sample_size: usize) -> Option<Vec<usize>> {
    if sample_size == 0 || sample_size >= n_rows {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(BATCH_SAMPLE_SEED);
    let mut indices = rand::seq::index::sample(&mut rng, n_rows, sample_size).into_vec();
    indices.sort_unstable();
    Some(indices)
}

/// Apply [`sample_indices`] to a frame.
pub fn sample_rows(df: &DataFrame, sample_size: usize) -> Result<DataFrame> {
    match sample_indices(df.height(), sample_size) {
        None => Ok(df.clone()),
        Some(indices) => {
            let idx: Vec<IdxSize> = indices.into_iter().map(|i| i as IdxSize).collect();
            let idx = IdxCa::from_vec("row".into(), idx);
            Ok(df.take(&idx)?)
        }
    }
}
