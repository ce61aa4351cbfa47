//! Common types and utilities shared across all agweather crates.

pub mod error;
pub mod extent;
pub mod field;
pub mod grid;
pub mod time;

pub use error::{ExtentError, GridIndexError};
pub use extent::{Extent, Extents, FULL_EXTENT};
pub use field::{Field, Observation};
pub use grid::{GridCoordinate, Points, SpatialGrid, EPSILON};
pub use time::DateRange;
