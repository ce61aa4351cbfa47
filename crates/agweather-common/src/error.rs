//! Error types for grid addressing and extent configuration.

use thiserror::Error;

/// A coordinate did not resolve to a cell of a `SpatialGrid`.
///
/// This is a programmer or configuration error: callers that may see
/// arbitrary coordinates should snap them with `closest_point` first.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GridIndexError {
    #[error("latitude {value} is outside the grid [{min}, {max}]")]
    LatitudeOutOfRange { value: f64, min: f64, max: f64 },

    #[error("longitude {value} is outside the grid [{min}, {max}]")]
    LongitudeOutOfRange { value: f64, min: f64, max: f64 },

    #[error("({latitude}, {longitude}) is not a grid point for step {step}")]
    OffGrid {
        latitude: f64,
        longitude: f64,
        step: f64,
    },
}

/// Invalid grid or extent parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtentError {
    #[error("invalid {axis} bounds: min {min} must be less than max {max}")]
    InvalidBounds { axis: &'static str, min: f64, max: f64 },

    #[error("invalid {axis} step {step}: must be > 0 and <= {span}")]
    InvalidStep { axis: &'static str, step: f64, span: f64 },

    #[error("extent '{inner}' is not contained in extent '{outer}'")]
    NotNested { inner: String, outer: String },

    #[error("unknown extent '{0}'")]
    Unknown(String),
}
