//! Geographic extents (latitude/longitude bounds).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ExtentError;
use crate::grid::EPSILON;

/// Name of the extent every other configured extent must nest inside.
pub const FULL_EXTENT: &str = "full";

/// A latitude/longitude bounding box in decimal degrees.
///
/// Longitudes use the -180..180 convention.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_long: f64,
    pub max_long: f64,
}

impl Extent {
    /// Create an extent, checking that min < max on both axes.
    pub fn new(min_lat: f64, max_lat: f64, min_long: f64, max_long: f64) -> Result<Self, ExtentError> {
        let extent = Self {
            min_lat,
            max_lat,
            min_long,
            max_long,
        };
        extent.validate()?;
        Ok(extent)
    }

    /// Check the min < max invariant. Deserialized extents bypass `new`.
    pub fn validate(&self) -> Result<(), ExtentError> {
        if !(self.min_lat < self.max_lat) {
            return Err(ExtentError::InvalidBounds {
                axis: "latitude",
                min: self.min_lat,
                max: self.max_lat,
            });
        }
        if !(self.min_long < self.max_long) {
            return Err(ExtentError::InvalidBounds {
                axis: "longitude",
                min: self.min_long,
                max: self.max_long,
            });
        }
        Ok(())
    }

    /// Check if a point lies within the extent (inclusive, with float tolerance).
    pub fn contains(&self, lat: f64, long: f64) -> bool {
        lat >= self.min_lat - EPSILON
            && lat <= self.max_lat + EPSILON
            && long >= self.min_long - EPSILON
            && long <= self.max_long + EPSILON
    }

    /// Check if another extent lies entirely within this one.
    pub fn contains_extent(&self, other: &Extent) -> bool {
        self.contains(other.min_lat, other.min_long) && self.contains(other.max_lat, other.max_long)
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn long_span(&self) -> f64 {
        self.max_long - self.min_long
    }
}

/// The set of named extents configured for a deployment.
///
/// Always contains [`FULL_EXTENT`]; every other extent is a subset of it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extents {
    full: Extent,
    extents: BTreeMap<String, Extent>,
}

impl Extents {
    /// Build from a name → extent map, validating bounds and nesting.
    pub fn from_map(extents: BTreeMap<String, Extent>) -> Result<Self, ExtentError> {
        let full = *extents
            .get(FULL_EXTENT)
            .ok_or_else(|| ExtentError::Unknown(FULL_EXTENT.to_string()))?;

        for (name, extent) in &extents {
            extent.validate()?;
            if !full.contains_extent(extent) {
                return Err(ExtentError::NotNested {
                    inner: name.clone(),
                    outer: FULL_EXTENT.to_string(),
                });
            }
        }

        Ok(Self { full, extents })
    }

    pub fn full(&self) -> &Extent {
        &self.full
    }

    pub fn get(&self, name: &str) -> Result<&Extent, ExtentError> {
        self.extents
            .get(name)
            .ok_or_else(|| ExtentError::Unknown(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extents.keys().map(String::as_str)
    }
}
