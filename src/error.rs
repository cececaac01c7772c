use std::path::PathBuf;

use thiserror::Error;

/// Failure to build a [`Dataset`](crate::data::model::Dataset) from its source.
///
/// Loading is all-or-nothing: the first malformed row aborts the whole load.
#[derive(Error, Debug)]
pub enum DataLoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    #[error("invalid source layout: {0}")]
    InvalidLayout(String),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("row {row}, column '{column}': {reason} (got '{value}')")]
    InvalidValue {
        row: usize,
        column: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl DataLoadError {
    pub(crate) fn invalid(
        row: usize,
        column: &'static str,
        value: impl Into<String>,
        reason: &'static str,
    ) -> Self {
        DataLoadError::InvalidValue {
            row,
            column,
            value: value.into(),
            reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataLoadError>;
