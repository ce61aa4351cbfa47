//! Measurement identifiers and per-cell observation values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A measured quantity stored for a grid cell.
///
/// Temperatures are degrees Celsius; insolation is MJ/m²/day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    MinTemp,
    MaxTemp,
    AvgTemp,
    DewPoint,
    Insolation,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::MinTemp,
        Field::MaxTemp,
        Field::AvgTemp,
        Field::DewPoint,
        Field::Insolation,
    ];

    /// Column name in the raw observation table.
    pub fn column(&self) -> &'static str {
        match self {
            Field::MinTemp => "min_temp",
            Field::MaxTemp => "max_temp",
            Field::AvgTemp => "avg_temp",
            Field::DewPoint => "dew_point",
            Field::Insolation => "insolation",
        }
    }

    pub fn get(&self, obs: &Observation) -> Option<f64> {
        match self {
            Field::MinTemp => obs.min_temp,
            Field::MaxTemp => obs.max_temp,
            Field::AvgTemp => obs.avg_temp,
            Field::DewPoint => obs.dew_point,
            Field::Insolation => obs.insolation,
        }
    }

    pub fn set(&self, obs: &mut Observation, value: f64) {
        let slot = match self {
            Field::MinTemp => &mut obs.min_temp,
            Field::MaxTemp => &mut obs.max_temp,
            Field::AvgTemp => &mut obs.avg_temp,
            Field::DewPoint => &mut obs.dew_point,
            Field::Insolation => &mut obs.insolation,
        };
        *slot = Some(value);
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// The summary values of one cell for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub avg_temp: Option<f64>,
    pub dew_point: Option<f64>,
    pub insolation: Option<f64>,
}

impl Observation {
    /// True if no field holds a value.
    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().all(|f| f.get(self).is_none())
    }
}
