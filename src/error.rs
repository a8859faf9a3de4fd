//! Error types for the analysis pipelines

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClvError {
    /// Nothing left to aggregate after filtering.
    #[error("no data: {0}")]
    NoData(String),

    #[error("invalid analysis window: start {start} is after end {end}")]
    InvalidWindow {
        start: chrono::NaiveDate,
        end: chrono::NaiveDate,
    },

    #[error("invalid score input: {0}")]
    InvalidScore(String),

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}
