//! Common test fixtures for agweather tests.
//!
//! This module provides pre-defined extents, dates and reference values
//! used across the crates' test suites.

/// Common extents as `(min_lat, max_lat, min_long, max_long)`.
pub mod extent {
    /// Small 11 x 6 grid at 1 degree steps.
    pub const SMALL: (f64, f64, f64, f64) = (10.0, 20.0, 0.0, 5.0);

    /// Tiny 3 x 3 grid at 1 degree steps, cheap for end-to-end runs.
    pub const TINY: (f64, f64, f64, f64) = (43.0, 45.0, -91.0, -89.0);

    /// Upper Midwest region at 0.1 degree steps.
    pub const MIDWEST: (f64, f64, f64, f64) = (38.0, 50.0, -98.0, -82.0);

    /// Wisconsin sub-region, nested inside `MIDWEST`.
    pub const WISCONSIN: (f64, f64, f64, f64) = (42.0, 47.1, -93.0, -86.8);
}

/// Reference degree-day values as `(min, max, base, upper, expected)`.
pub mod degree_days {
    /// Sine method, base crosses the curve (case 4).
    pub const SINE_BASE_CROSSING: (f64, f64, f64, f64, f64) = (30.0, 45.0, 40.0, 90.0, 1.2712244);

    /// Sine method, the whole day sits above the upper threshold.
    /// Sine method, the curve crosses only the upper threshold.
    pub const SINE_UPPER_CROSSING: (f64, f64, f64, f64, f64) = (60.0, 100.0, 50.0, 86.0, 26.3451143);

    /// Sine method, the curve crosses both thresholds.
    pub const SINE_BOTH_CROSSINGS: (f64, f64, f64, f64, f64) = (30.0, 110.0, 50.0, 86.0, 18.5946400);

    pub const SINE_SATURATED: (f64, f64, f64, f64, f64) = (90.0, 95.0, 40.0, 80.0, 40.0);
}

/// Common calendar values.
pub mod dates {
    use chrono::NaiveDate;

    /// A fixed "today" so date arithmetic in tests is deterministic.
    pub fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap()
    }

    /// The date `days` before [`today`].
    pub fn days_ago(days: i64) -> NaiveDate {
        today() - chrono::Duration::days(days)
    }
}
