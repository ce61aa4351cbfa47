//! Error types for the storage crate.

use agweather_common::{ExtentError, GridIndexError};
use thiserror::Error;

/// Errors raised by stores and the ledger.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to prepare database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Grid error: {0}")]
    Grid(#[from] GridIndexError),

    #[error("Extent error: {0}")]
    Extent(#[from] ExtentError),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
