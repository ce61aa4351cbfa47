//! Reduction of decoded point clouds onto grid cells.

use chrono::NaiveDate;

use agweather_common::{Extent, Field, Observation, SpatialGrid};
use storage::RawObservationRow;

use crate::config::SourceConfig;
use crate::decoder::Reading;
use crate::error::Result;

/// Shift longitudes in the 0..360 convention into -180..180.
pub fn normalize_longitude(longitude: f64) -> f64 {
    if longitude > 180.0 {
        longitude - 360.0
    } else {
        longitude
    }
}

/// Raw readings collected for one cell, one list per measurement.
#[derive(Debug, Default, Clone)]
pub struct CellReadings {
    values: [Vec<f64>; Field::ALL.len()],
}

impl CellReadings {
    fn slot(field: Field) -> usize {
        Field::ALL
            .iter()
            .position(|f| *f == field)
            .unwrap_or_default()
    }

    pub fn push(&mut self, field: Field, value: f64) {
        self.values[Self::slot(field)].push(value);
    }

    pub fn values(&self, field: Field) -> &[f64] {
        &self.values[Self::slot(field)]
    }
}

/// Accumulates readings from every unit of a day onto one grid.
pub struct Accumulator<'a> {
    config: &'a SourceConfig,
    extent: Extent,
    grid: SpatialGrid<CellReadings>,
    accepted: usize,
    outside: usize,
    unwanted: usize,
}

impl<'a> Accumulator<'a> {
    pub fn new(config: &'a SourceConfig, extent: &Extent) -> Result<Self> {
        Ok(Self {
            config,
            extent: *extent,
            grid: SpatialGrid::for_extent(extent, config.step)?,
            accepted: 0,
            outside: 0,
            unwanted: 0,
        })
    }

    /// Add one reading. Readings outside the extent or with an unconfigured
    /// tag are dropped.
    pub fn add(&mut self, reading: &Reading) -> Result<()> {
        let Some(rule) = self.config.rule_for(&reading.tag) else {
            self.unwanted += 1;
            return Ok(());
        };

        let longitude = normalize_longitude(reading.longitude);
        if !self.extent.contains(reading.latitude, longitude) {
            self.outside += 1;
            return Ok(());
        }

        let coord = self.grid.closest_point(reading.latitude, longitude);
        let cell = self.grid.get_or_insert_with(coord, CellReadings::default)?;
        let value = rule.convert.apply(reading.value);
        for output in &rule.outputs {
            cell.push(output.field, value);
        }
        self.accepted += 1;
        Ok(())
    }

    pub fn extend<'r>(&mut self, readings: impl IntoIterator<Item = &'r Reading>) -> Result<()> {
        for reading in readings {
            self.add(reading)?;
        }
        Ok(())
    }

    pub fn accepted(&self) -> usize {
        self.accepted
    }

    pub fn outside(&self) -> usize {
        self.outside
    }

    pub fn unwanted(&self) -> usize {
        self.unwanted
    }

    /// Reduce every cell to one summary value per measurement.
    ///
    /// A measurement with more than one output rule keeps the last one.
    /// Cells without readings are not emitted.
    pub fn reduce(&self) -> SpatialGrid<Observation> {
        self.grid.map_defined(|_, cell| {
            let mut obs = Observation::default();
            for rule in &self.config.fields {
                for output in &rule.outputs {
                    if let Some(v) = output.reduce.reduce(cell.values(output.field)) {
                        output.field.set(&mut obs, v);
                    }
                }
            }
            (!obs.is_empty()).then_some(obs)
        })
    }

    /// Reduced cells as rows for persistence, row-major.
    pub fn into_rows(self, date: NaiveDate) -> Vec<RawObservationRow> {
        let source = &self.config.name;
        self.reduce()
            .iter_defined()
            .map(|(coord, obs)| RawObservationRow {
                source: source.clone(),
                date,
                latitude: coord.latitude,
                longitude: coord.longitude,
                values: *obs,
            })
            .collect()
    }
}
