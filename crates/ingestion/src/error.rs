//! Error types for the ingestion crate.

use std::path::PathBuf;
use std::time::Duration;

use agweather_common::{ExtentError, GridIndexError};
use storage::StorageError;
use thiserror::Error;

/// Failure to retrieve one unit file.
#[derive(Error, Debug)]
pub enum FetchError {
    /// Network failure, timeout or server-side error. Retried.
    #[error("Transient fetch failure for {url}: {reason}")]
    Transient { url: String, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request for {url} rejected with HTTP {status}")]
    Rejected { url: String, status: u16 },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Local I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Failure to decode one unit file.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// A single output line did not match the tuple format. Skipped by callers.
    #[error("Malformed line: {0:?}")]
    MalformedLine(String),

    #[error("Failed to start decoder '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Decoder timed out after {0:?}")]
    Timeout(Duration),

    #[error("Decoder exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure of a whole (source, date) ingestion.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("no data retrieved")]
    NoData,

    #[error("incomplete coverage: {retrieved} of {expected} units retrieved")]
    IncompleteCoverage { retrieved: usize, expected: usize },

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("grid index error: {0}")]
    GridIndex(#[from] GridIndexError),

    #[error("invalid extent: {0}")]
    Extent(#[from] ExtentError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] StorageError),

    #[error("cache error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid source configuration: {0}")]
    Config(String),
}

impl IngestError {
    /// Short label used for the `outcome` metric label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::IncompleteCoverage { .. } => "incomplete_coverage",
            Self::Fetch(_) => "fetch",
            Self::Decode(_) => "decode",
            Self::GridIndex(_) => "grid_index",
            Self::Extent(_) => "extent",
            Self::Persistence(_) => "persistence",
            Self::Io(_) => "io",
            Self::Config(_) => "config",
        }
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
