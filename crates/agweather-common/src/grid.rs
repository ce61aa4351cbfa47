//! Quantized latitude/longitude grids.
//!
//! A [`SpatialGrid`] is a dense 2-D array over a bounded region with a fixed
//! step in degrees. Every aggregation pass snaps incoming points onto it with
//! [`SpatialGrid::closest_point`] and walks the canonical cell set with
//! [`SpatialGrid::each_point`].

use serde::{Deserialize, Serialize};

use crate::error::{ExtentError, GridIndexError};
use crate::extent::Extent;

/// Tolerance for floating-point drift when matching coordinates to cells.
pub const EPSILON: f64 = 1e-6;

/// Coordinates are stored at this precision (1e-6 degrees).
const COORD_SCALE: f64 = 1e6;

/// Round a coordinate to storage precision so equal cells compare equal.
pub fn quantize(value: f64) -> f64 {
    (value * COORD_SCALE).round() / COORD_SCALE
}

/// A (latitude, longitude) pair addressing one grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl GridCoordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Miss reasons for a single axis lookup.
enum AxisMiss {
    OutOfRange,
    OffGrid,
}

/// One dimension of a grid.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Axis {
    min: f64,
    max: f64,
    step: f64,
    len: usize,
}

impl Axis {
    fn new(axis: &'static str, min: f64, max: f64, step: f64) -> Result<Self, ExtentError> {
        if !(min < max) {
            return Err(ExtentError::InvalidBounds { axis, min, max });
        }
        let span = max - min;
        if !(step > 0.0) || step > span + EPSILON {
            return Err(ExtentError::InvalidStep { axis, step, span });
        }

        let len = (span / step + EPSILON).floor() as usize + 1;
        Ok(Self {
            min,
            max,
            step,
            len,
        })
    }

    fn value_at(&self, index: usize) -> f64 {
        quantize(self.min + index as f64 * self.step)
    }

    fn last(&self) -> f64 {
        self.value_at(self.len - 1)
    }

    /// Exact lookup: the value must sit on a grid point within EPSILON.
    fn index_of(&self, value: f64) -> Result<usize, AxisMiss> {
        if !value.is_finite() || value < self.min - EPSILON || value > self.last() + EPSILON {
            return Err(AxisMiss::OutOfRange);
        }

        let index = ((value - self.min) / self.step).round().max(0.0) as usize;
        let index = index.min(self.len - 1);
        if (self.value_at(index) - value).abs() > EPSILON {
            return Err(AxisMiss::OffGrid);
        }
        Ok(index)
    }

    /// Nearest cell, clamping to the ends and rounding half up.
    fn closest_index(&self, value: f64) -> usize {
        if value <= self.min {
            return 0;
        }
        if value >= self.last() {
            return self.len - 1;
        }
        let index = ((value - self.min) / self.step + 0.5 + EPSILON).floor() as usize;
        index.min(self.len - 1)
    }
}

/// Dense 2-D array of optional values addressed by [`GridCoordinate`].
///
/// Cells are stored row-major: latitude ascending, longitude ascending
/// within each latitude.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialGrid<T> {
    lat: Axis,
    long: Axis,
    cells: Vec<Option<T>>,
}

impl<T> SpatialGrid<T> {
    /// Create an empty grid. The same step is used on both axes.
    pub fn new(
        min_lat: f64,
        max_lat: f64,
        min_long: f64,
        max_long: f64,
        step: f64,
    ) -> Result<Self, ExtentError> {
        let lat = Axis::new("latitude", min_lat, max_lat, step)?;
        let long = Axis::new("longitude", min_long, max_long, step)?;
        let mut cells = Vec::with_capacity(lat.len * long.len);
        cells.resize_with(lat.len * long.len, || None);

        Ok(Self { lat, long, cells })
    }

    /// Create an empty grid covering an extent.
    pub fn for_extent(extent: &Extent, step: f64) -> Result<Self, ExtentError> {
        Self::new(
            extent.min_lat,
            extent.max_lat,
            extent.min_long,
            extent.max_long,
            step,
        )
    }

    pub fn step(&self) -> f64 {
        self.lat.step
    }

    pub fn extent(&self) -> Extent {
        Extent {
            min_lat: self.lat.min,
            max_lat: self.lat.max,
            min_long: self.long.min,
            max_long: self.long.max,
        }
    }

    /// Number of cells along the latitude axis.
    pub fn lat_len(&self) -> usize {
        self.lat.len
    }

    /// Number of cells along the longitude axis.
    pub fn long_len(&self) -> usize {
        self.long.len
    }

    /// Total number of cells, defined or not.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Number of cells holding a value.
    pub fn defined_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    fn flat_index(&self, coord: GridCoordinate) -> Result<usize, GridIndexError> {
        let i = self.lat.index_of(coord.latitude).map_err(|miss| match miss {
            AxisMiss::OutOfRange => GridIndexError::LatitudeOutOfRange {
                value: coord.latitude,
                min: self.lat.min,
                max: self.lat.last(),
            },
            AxisMiss::OffGrid => self.off_grid(coord),
        })?;
        let j = self.long.index_of(coord.longitude).map_err(|miss| match miss {
            AxisMiss::OutOfRange => GridIndexError::LongitudeOutOfRange {
                value: coord.longitude,
                min: self.long.min,
                max: self.long.last(),
            },
            AxisMiss::OffGrid => self.off_grid(coord),
        })?;
        Ok(i * self.long.len + j)
    }

    fn off_grid(&self, coord: GridCoordinate) -> GridIndexError {
        GridIndexError::OffGrid {
            latitude: coord.latitude,
            longitude: coord.longitude,
            step: self.lat.step,
        }
    }

    fn coord_at(&self, flat: usize) -> GridCoordinate {
        GridCoordinate::new(
            self.lat.value_at(flat / self.long.len),
            self.long.value_at(flat % self.long.len),
        )
    }

    /// Store a value. The coordinate must resolve to a cell; nothing is clamped.
    pub fn set(&mut self, coord: GridCoordinate, value: T) -> Result<(), GridIndexError> {
        let index = self.flat_index(coord)?;
        self.cells[index] = Some(value);
        Ok(())
    }

    /// Read a cell. `Ok(None)` means the cell exists but holds no value.
    pub fn get(&self, coord: GridCoordinate) -> Result<Option<&T>, GridIndexError> {
        let index = self.flat_index(coord)?;
        Ok(self.cells[index].as_ref())
    }

    /// Mutable access to a cell, inserting a value from `init` if undefined.
    pub fn get_or_insert_with<F>(
        &mut self,
        coord: GridCoordinate,
        init: F,
    ) -> Result<&mut T, GridIndexError>
    where
        F: FnOnce() -> T,
    {
        let index = self.flat_index(coord)?;
        Ok(self.cells[index].get_or_insert_with(init))
    }

    /// Snap an arbitrary point to the nearest cell.
    ///
    /// Each axis is handled independently: values below the minimum map to
    /// the first cell, values above the maximum to the last, and everything
    /// else rounds to the nearest cell with ties rounding up.
    pub fn closest_point(&self, lat: f64, long: f64) -> GridCoordinate {
        GridCoordinate::new(
            self.lat.value_at(self.lat.closest_index(lat)),
            self.long.value_at(self.long.closest_index(long)),
        )
    }

    /// Every cell coordinate in row-major order. Calling again restarts.
    pub fn each_point(&self) -> Points {
        Points {
            lat: self.lat,
            long: self.long,
            next: 0,
        }
    }

    /// Defined cells with their coordinates, in row-major order.
    pub fn iter_defined(&self) -> impl Iterator<Item = (GridCoordinate, &T)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(i, cell)| cell.as_ref().map(|v| (self.coord_at(i), v)))
    }

    /// Build a grid with the same shape, keeping cells where `f` returns `Some`.
    pub fn map_defined<U, F>(&self, mut f: F) -> SpatialGrid<U>
    where
        F: FnMut(GridCoordinate, &T) -> Option<U>,
    {
        let cells = self
            .cells
            .iter()
            .enumerate()
            .map(|(i, cell)| cell.as_ref().and_then(|v| f(self.coord_at(i), v)))
            .collect();

        SpatialGrid {
            lat: self.lat,
            long: self.long,
            cells,
        }
    }
}

/// Lazy, finite iterator over the cell coordinates of a grid.
#[derive(Debug, Clone)]
pub struct Points {
    lat: Axis,
    long: Axis,
    next: usize,
}

impl Iterator for Points {
    type Item = GridCoordinate;

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.lat.len * self.long.len;
        if self.next >= total {
            return None;
        }
        let i = self.next / self.long.len;
        let j = self.next % self.long.len;
        self.next += 1;
        Some(GridCoordinate::new(self.lat.value_at(i), self.long.value_at(j)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.lat.len * self.long.len - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Points {}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> SpatialGrid<f64> {
        SpatialGrid::new(10.0, 20.0, 0.0, 5.0, 1.0).unwrap()
    }

    #[test]
    fn test_cell_counts() {
        let grid = small();
        assert_eq!(grid.lat_len(), 11);
        assert_eq!(grid.long_len(), 6);
        assert_eq!(grid.len(), 66);

        // 0.1 degree steps accumulate drift; the epsilon keeps the last row
        let grid: SpatialGrid<f64> = SpatialGrid::new(38.0, 50.0, -98.0, -82.0, 0.1).unwrap();
        assert_eq!(grid.lat_len(), 121);
        assert_eq!(grid.long_len(), 161);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(matches!(
            SpatialGrid::<f64>::new(20.0, 10.0, 0.0, 5.0, 1.0),
            Err(ExtentError::InvalidBounds { .. })
        ));
        assert!(matches!(
            SpatialGrid::<f64>::new(10.0, 20.0, 0.0, 5.0, 0.0),
            Err(ExtentError::InvalidStep { .. })
        ));
        assert!(matches!(
            SpatialGrid::<f64>::new(10.0, 20.0, 0.0, 5.0, 6.0),
            Err(ExtentError::InvalidStep { axis: "longitude", .. })
        ));
    }

    #[test]
    fn test_closest_point() {
        let grid = small();
        assert_eq!(grid.closest_point(9.0, -1.0), GridCoordinate::new(10.0, 0.0));
        assert_eq!(grid.closest_point(21.0, 6.0), GridCoordinate::new(20.0, 5.0));
        assert_eq!(grid.closest_point(14.6, 2.4), GridCoordinate::new(15.0, 2.0));
        assert_eq!(grid.closest_point(14.5, 2.5).latitude, 15.0);
        assert_eq!(grid.closest_point(14.5, 2.5).longitude, 3.0);
        assert_eq!(grid.closest_point(14.49, 0.0).latitude, 14.0);
    }

    #[test]
    fn test_closest_point_tenth_degree_ties() {
        let grid: SpatialGrid<f64> = SpatialGrid::new(38.0, 50.0, -98.0, -82.0, 0.1).unwrap();
        let p = grid.closest_point(43.15, -90.05);
        assert_eq!(p.latitude, 43.2);
        assert_eq!(p.longitude, -90.0);
        assert!(grid.get(p).is_ok());
    }

    #[test]
    fn test_set_get_round_trip() {
        let mut grid = small();
        grid.set(GridCoordinate::new(12.0, 3.0), 7.5).unwrap();
        assert_eq!(grid.get(GridCoordinate::new(12.0, 3.0)).unwrap(), Some(&7.5));
        assert_eq!(grid.get(GridCoordinate::new(12.0, 4.0)).unwrap(), None);
        // within epsilon of the same point is the same cell
        assert_eq!(
            grid.get(GridCoordinate::new(12.0000004, 2.9999996)).unwrap(),
            Some(&7.5)
        );
        assert_eq!(grid.defined_count(), 1);
    }

    #[test]
    fn test_out_of_grid_is_an_error() {
        let mut grid = small();
        assert!(matches!(
            grid.set(GridCoordinate::new(21.0, 3.0), 1.0),
            Err(GridIndexError::LatitudeOutOfRange { .. })
        ));
        assert!(matches!(
            grid.get(GridCoordinate::new(15.0, -0.5)),
            Err(GridIndexError::LongitudeOutOfRange { .. })
        ));
        assert!(matches!(
            grid.get(GridCoordinate::new(15.3, 2.0)),
            Err(GridIndexError::OffGrid { .. })
        ));
    }

    #[test]
    fn test_each_point_row_major_and_restartable() {
        let grid: SpatialGrid<()> = SpatialGrid::new(0.0, 1.0, 0.0, 2.0, 1.0).unwrap();
        let points: Vec<_> = grid
            .each_point()
            .map(|p| (p.latitude, p.longitude))
            .collect();
        assert_eq!(
            points,
            vec![(0.0, 0.0), (0.0, 1.0), (0.0, 2.0), (1.0, 0.0), (1.0, 1.0), (1.0, 2.0)]
        );

        let iter = grid.each_point();
        assert_eq!(iter.len(), 6);
        assert_eq!(grid.each_point().count(), 6);
    }

    #[test]
    fn test_map_defined_keeps_shape() {
        let mut grid = small();
        grid.set(GridCoordinate::new(10.0, 0.0), 1.0).unwrap();
        grid.set(GridCoordinate::new(20.0, 5.0), -1.0).unwrap();

        let positive = grid.map_defined(|_, v| (*v > 0.0).then_some(*v * 2.0));
        assert_eq!(positive.len(), grid.len());
        assert_eq!(positive.defined_count(), 1);
        assert_eq!(
            positive.get(GridCoordinate::new(10.0, 0.0)).unwrap(),
            Some(&2.0)
        );
    }
}
