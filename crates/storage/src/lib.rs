//! Storage abstractions for agweather services.
//!
//! Provides:
//! - Repository traits for the import ledger, raw observations and
//!   derived data
//! - A SQLite implementation of all three
//! - [`ImportLedger`], the per (source, date) ingestion state machine
//! - Grid snapshots of persisted rows for map rendering

pub mod error;
pub mod ledger;
pub mod repository;
pub mod snapshot;
pub mod sqlite;

pub use error::{Result, StorageError};
pub use ledger::{DayState, DayStatus, ImportLedger, SourceProblem, StatusReport};
pub use repository::{
    DerivedDataStore, DerivedDatumRow, ImportRecord, ImportStatus, LedgerStore, RawDataStore,
    RawObservationRow,
};
pub use snapshot::{derived_grid, grid_snapshot, observation_grid};
pub use sqlite::SqliteStore;
