//! Error and warning types for the segmentation pipeline

use serde::Serialize;
use thiserror::Error;

/// Fatal errors: any of these aborts the run
#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("No rows left after {stage}")]
    EmptyResult { stage: &'static str },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Number of customers ({customers}) must be at least equal to number of clusters ({clusters})")]
    TooFewCustomers { customers: usize, clusters: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed event on line {line}: {source}")]
    EventParse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Projection failed: {0}")]
    Projection(String),
}

/// Kind of row-level data quality problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQualityKind {
    MissingPrice,
    MissingCustomer,
    NegativePrice,
    NonFiniteFeature,
}

/// Recoverable conditions. Collected into the run summary and logged, never returned as `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Warning {
    DataQuality { kind: DataQualityKind, count: usize },
    Convergence { iterations: usize },
}

impl Warning {
    /// Emit the warning through `tracing`
    pub fn log(&self) {
        match self {
            Warning::DataQuality { kind, count } => {
                tracing::warn!(kind = ?kind, count, "data quality: rows excluded or adjusted");
            }
            Warning::Convergence { iterations } => {
                tracing::warn!(iterations, "k-means hit the iteration bound without stabilizing");
            }
        }
    }
}
