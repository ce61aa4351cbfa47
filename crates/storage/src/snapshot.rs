//! Rebuild filled grids from persisted rows for map rendering.

use agweather_common::{Extent, Field, GridCoordinate, Observation, SpatialGrid};

use crate::error::Result;
use crate::repository::{DerivedDatumRow, RawObservationRow};

/// Place raw rows back onto a grid. Rows outside the extent are skipped.
pub fn observation_grid(
    rows: &[RawObservationRow],
    extent: &Extent,
    step: f64,
) -> Result<SpatialGrid<Observation>> {
    let mut grid = SpatialGrid::for_extent(extent, step)?;
    for row in rows {
        if !extent.contains(row.latitude, row.longitude) {
            continue;
        }
        grid.set(GridCoordinate::new(row.latitude, row.longitude), row.values)?;
    }
    Ok(grid)
}

/// Grid of one measurement for a day; cells without that field stay empty.
pub fn grid_snapshot(
    rows: &[RawObservationRow],
    extent: &Extent,
    step: f64,
    field: Field,
) -> Result<SpatialGrid<f64>> {
    let grid = observation_grid(rows, extent, step)?;
    Ok(grid.map_defined(|_, obs| field.get(obs)))
}

pub fn derived_grid(rows: &[DerivedDatumRow], extent: &Extent, step: f64) -> Result<SpatialGrid<f64>> {
    let mut grid = SpatialGrid::for_extent(extent, step)?;
    for row in rows {
        if !extent.contains(row.latitude, row.longitude) {
            continue;
        }
        grid.set(GridCoordinate::new(row.latitude, row.longitude), row.value)?;
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(lat: f64, long: f64, max: Option<f64>) -> RawObservationRow {
        RawObservationRow {
            source: "weather".into(),
            date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            latitude: lat,
            longitude: long,
            values: Observation {
                max_temp: max,
                min_temp: Some(10.0),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_grid_snapshot_selects_field() {
        let extent = Extent::new(43.0, 44.0, -90.0, -89.0).unwrap();
        let rows = vec![row(43.0, -90.0, Some(25.0)), row(44.0, -89.0, None), row(50.0, -89.0, Some(1.0))];

        let grid = grid_snapshot(&rows, &extent, 0.5, Field::MaxTemp).unwrap();
        assert_eq!(grid.defined_count(), 1);
        assert_eq!(grid.get(GridCoordinate::new(43.0, -90.0)).unwrap(), Some(&25.0));
        assert_eq!(grid.get(GridCoordinate::new(44.0, -89.0)).unwrap(), None);
    }

    #[test]
    fn test_off_grid_row_is_an_error() {
        let extent = Extent::new(43.0, 44.0, -90.0, -89.0).unwrap();
        let rows = vec![row(43.25, -90.0, Some(25.0))];
        assert!(observation_grid(&rows, &extent, 0.5).is_err());
    }
}
