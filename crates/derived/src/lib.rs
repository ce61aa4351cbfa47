//! Derived agronomic datasets computed from gridded raw observations.
//!
//! Each dataset is a [`DerivedStage`]: a pure per-cell function over one
//! day's raw observation. [`DerivedEngine`] finds dates with raw data but no
//! confirmed derived rows, computes them and replaces the day's rows in one
//! transaction. Degree days are the built-in stage.

pub mod degree_days;
pub mod engine;
pub mod error;

pub use degree_days::{calculate_degree_days, DegreeDayMethod, TemperatureUnit};
pub use engine::{compute_rows, DegreeDayConfig, DegreeDayStage, DeriveSummary, DerivedEngine, DerivedStage};
pub use error::{DerivedError, Result, ValidationError};
