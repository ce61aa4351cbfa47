//! Error types for derived computations.

use chrono::NaiveDate;
use storage::StorageError;
use thiserror::Error;

/// Calculator inputs that cannot describe a real day.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("minimum temperature {min} is above maximum {max}")]
    MinAboveMax { min: f64, max: f64 },

    #[error("base threshold {base} is above upper threshold {upper}")]
    BaseAboveUpper { base: f64, upper: f64 },

    #[error("non-finite input: {0}")]
    NotFinite(&'static str),
}

/// Failure of a whole (derived type, date) computation.
#[derive(Error, Debug)]
pub enum DerivedError {
    #[error("invalid raw data at ({latitude}, {longitude}): {source}")]
    Validation {
        latitude: f64,
        longitude: f64,
        #[source]
        source: ValidationError,
    },

    #[error("no raw data for {source_name} on {date}")]
    NoRawData { source_name: String, date: NaiveDate },

    #[error("persistence failed: {0}")]
    Storage(#[from] StorageError),

    #[error("computation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DerivedError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NoRawData { .. } => "no_raw_data",
            Self::Storage(_) => "persistence",
            Self::Task(_) => "task",
        }
    }
}

pub type Result<T> = std::result::Result<T, DerivedError>;
