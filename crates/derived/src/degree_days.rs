//! Degree-day calculation from daily minimum and maximum temperature.

use std::f64::consts::{FRAC_PI_2, PI};

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How the day's temperature curve is approximated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegreeDayMethod {
    /// Midpoint of min and max, minus base.
    Average,
    /// Midpoint after clamping min and max into `[base, upper]`.
    Modified,
    /// Single sine curve through min and max, integrated between thresholds.
    Sine,
}

/// Unit the thresholds are expressed in. Stored temperatures are Celsius.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Convert a Celsius value into this unit.
    pub fn from_celsius(&self, celsius: f64) -> f64 {
        match self {
            Self::Celsius => celsius,
            Self::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }
}

fn check_finite(value: f64, name: &'static str) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NotFinite(name))
    }
}

/// Degree days for one day; never negative.
///
/// `upper` of `None` means no upper cutoff. All values must share a unit.
pub fn calculate_degree_days(
    min: f64,
    max: f64,
    base: f64,
    upper: Option<f64>,
    method: DegreeDayMethod,
) -> Result<f64, ValidationError> {
    check_finite(min, "min")?;
    check_finite(max, "max")?;
    check_finite(base, "base")?;
    if let Some(upper) = upper {
        // NaN upper is rejected; +inf is the same as no cutoff
        if upper.is_nan() {
            return Err(ValidationError::NotFinite("upper"));
        }
        if base > upper {
            return Err(ValidationError::BaseAboveUpper { base, upper });
        }
    }
    if min > max {
        return Err(ValidationError::MinAboveMax { min, max });
    }

    let upper = upper.unwrap_or(f64::INFINITY);
    let value = match method {
        DegreeDayMethod::Average => average(min, max, base),
        DegreeDayMethod::Modified => modified(min, max, base, upper),
        DegreeDayMethod::Sine => sine(min, max, base, upper),
    };
    Ok(value.max(0.0))
}

fn average(min: f64, max: f64, base: f64) -> f64 {
    if max <= base {
        return 0.0;
    }
    (min + max) / 2.0 - base
}

fn modified(min: f64, max: f64, base: f64, upper: f64) -> f64 {
    if max <= base {
        return 0.0;
    }
    let min = min.clamp(base, upper);
    let max = max.clamp(base, upper);
    (min + max) / 2.0 - base
}

fn sine(min: f64, max: f64, base: f64, upper: f64) -> f64 {
    // Entirely below base
    if max <= base {
        return 0.0;
    }
    // Entirely above upper
    if min >= upper {
        return upper - base;
    }

    let avg = (min + max) / 2.0;
    // Entirely between thresholds
    if base <= min && max <= upper {
        return avg - base;
    }

    // min < max from here on, so amp > 0
    let amp = (max - min) / 2.0;
    let theta = |threshold: f64| ((threshold - avg) / amp).clamp(-1.0, 1.0).asin();

    if min < base && max <= upper {
        // Curve crosses base only
        let tb = theta(base);
        ((avg - base) * (FRAC_PI_2 - tb) + amp * tb.cos()) / PI
    } else if base <= min && max > upper {
        // Curve crosses upper only
        let tu = theta(upper);
        ((avg - base) * (tu + FRAC_PI_2) + (upper - base) * (FRAC_PI_2 - tu) - amp * tu.cos()) / PI
    } else {
        // Curve crosses both thresholds
        let tb = theta(base);
        let tu = theta(upper);
        ((avg - base) * (tu - tb) + amp * (tb.cos() - tu.cos()) + (upper - base) * (FRAC_PI_2 - tu))
            / PI
    }
}
