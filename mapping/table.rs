//! # Expression Table Loading
//!
//! The tabular-data collaborator. An expression table has one row per measured
//! gene (or gene product) and one column per sample. On disk it is a delimited text
//! file with a header line whose first column holds the row identifiers:
//!
//! ```text
//! gene    s1    s2
//! g1      4.0   0.0
//! g2      2.0   7.0
//! ```
//!
//! - Any header is accepted for the identifier column. Every cell is read as text, so
//!   identifiers such as `007` or `1.50` keep their exact spelling.
//! - Every other column is a sample and must be numeric with no missing cells.
//! - Files ending in `.tsv`, `.tab` or `.txt` are tab-separated; everything else is
//!   read as comma-separated.

use crate::batch::MappingError;
use crate::types::SampleSelector;
use itertools::Itertools;
use ndarray::{Array2, ArrayView1, Axis};
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The expression table has no sample columns. Expected a row identifier column followed by one column per sample."
    )]
    NoSampleColumns,
    #[error(
        "The sample column '{column_name}' could not be converted to the expected type '{expected_type}'. It contains non-numeric data. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in column '{0}'. Every gene must have a value for every sample."
    )]
    MissingValuesFound(String),
    #[error("Expression values have shape {found:?}, but {rows} row ids and {samples} sample ids were given.")]
    ShapeMismatch {
        rows: usize,
        samples: usize,
        found: (usize, usize),
    },
}

/// Raw per-sample measurements, rows keyed by gene (or alias) identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionTable {
    row_ids: Vec<String>,
    sample_ids: Vec<String>,
    /// Shape: [n_rows, n_samples].
    values: Array2<f64>,
}

impl ExpressionTable {
    pub fn new(
        row_ids: Vec<String>,
        sample_ids: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, TableError> {
        if values.dim() != (row_ids.len(), sample_ids.len()) {
            return Err(TableError::ShapeMismatch {
                rows: row_ids.len(),
                samples: sample_ids.len(),
                found: values.dim(),
            });
        }
        Ok(Self {
            row_ids,
            sample_ids,
            values,
        })
    }

    /// Builds a table from named sample columns, each holding one value per row id.
    pub fn from_columns(
        row_ids: Vec<String>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, TableError> {
        let n_rows = row_ids.len();
        let mut values = Array2::zeros((n_rows, columns.len()));
        let mut sample_ids = Vec::with_capacity(columns.len());
        for (j, (name, column)) in columns.into_iter().enumerate() {
            if column.len() != n_rows {
                return Err(TableError::ShapeMismatch {
                    rows: n_rows,
                    samples: j + 1,
                    found: (column.len(), j + 1),
                });
            }
            values.column_mut(j).assign(&ArrayView1::from(&column));
            sample_ids.push(name);
        }
        Self::new(row_ids, sample_ids, values)
    }

    /// Reads a delimited expression file. The first column holds the row identifiers.
    pub fn from_path(path: &Path) -> Result<Self, TableError> {
        let separator = match path.extension().and_then(|ext| ext.to_str()) {
            Some("tsv" | "tab" | "txt") => b'\t',
            _ => b',',
        };

        let df = CsvReader::new(File::open(path)?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_infer_schema_length(Some(0))
                    .with_parse_options(CsvParseOptions::default().with_separator(separator)),
            )
            .finish()?;

        let column_names: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        let Some((id_column, sample_columns)) = column_names.split_first() else {
            return Err(TableError::NoSampleColumns);
        };
        if sample_columns.is_empty() {
            return Err(TableError::NoSampleColumns);
        }

        let row_ids = extract_identifier_column(&df, id_column)?;
        let mut values = Array2::zeros((df.height(), sample_columns.len()));
        for (j, name) in sample_columns.iter().enumerate() {
            let column = extract_numeric_column(&df, name)?;
            values.column_mut(j).assign(&ArrayView1::from(&column));
        }

        Self::new(row_ids, sample_columns.to_vec(), values)
    }

    pub fn row_ids(&self) -> &[String] {
        &self.row_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_rows(&self) -> usize {
        self.row_ids.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// One sample's values, aligned with [`row_ids`](Self::row_ids).
    pub fn column(&self, index: usize) -> ArrayView1<'_, f64> {
        self.values.column(index)
    }

    /// Resolves a selector to a column position. Names match exactly; the first
    /// column with that name wins.
    pub fn resolve(&self, selector: &SampleSelector) -> Result<usize, MappingError> {
        let position = match selector {
            SampleSelector::Index(index) => (*index < self.sample_ids.len()).then_some(*index),
            SampleSelector::Name(name) => self.sample_ids.iter().position(|id| id == name),
        };
        position.ok_or_else(|| MappingError::SampleNotFound(selector.clone()))
    }

    /// Row identifiers that occur more than once, each reported once.
    pub fn duplicated_row_ids(&self) -> Vec<&str> {
        self.row_ids.iter().map(String::as_str).duplicates().collect()
    }

    /// A copy of the table holding only the rows whose identifier passes `keep`.
    /// Row order is preserved.
    pub fn retain_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&str) -> bool,
    {
        let kept: Vec<usize> = self
            .row_ids
            .iter()
            .enumerate()
            .filter_map(|(i, id)| keep(id.as_str()).then_some(i))
            .collect();
        Self {
            row_ids: kept.iter().map(|&i| self.row_ids[i].clone()).collect(),
            sample_ids: self.sample_ids.clone(),
            values: self.values.select(Axis(0), &kept),
        }
    }
}

fn extract_identifier_column(df: &DataFrame, column_name: &str) -> Result<Vec<String>, TableError> {
    let column = df.column(column_name)?;
    if column.null_count() > 0 {
        return Err(TableError::MissingValuesFound(column_name.to_string()));
    }
    let ids = column
        .as_materialized_series()
        .str()?
        .into_no_null_iter()
        .map(|id| id.trim().to_string())
        .collect();
    Ok(ids)
}

fn extract_numeric_column(df: &DataFrame, column_name: &str) -> Result<Vec<f64>, TableError> {
    let column = df.column(column_name)?;
    if column.null_count() > 0 {
        return Err(TableError::MissingValuesFound(column_name.to_string()));
    }

    let wrong_type = || TableError::ColumnWrongType {
        column_name: column_name.to_string(),
        expected_type: "f64 (numeric)",
        found_type: format!("{:?}", column.dtype()),
    };
    let casted = column.cast(&DataType::Float64).map_err(|_| wrong_type())?;
    if casted.null_count() > 0 {
        return Err(wrong_type());
    }

    let chunked = casted.f64()?.rechunk();
    Ok(chunked.into_no_null_iter().collect())
}
