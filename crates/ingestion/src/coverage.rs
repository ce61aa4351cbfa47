//! Deciding whether a day's retrieved units are enough to persist.

use chrono::NaiveDate;

use agweather_common::time::age_in_days;

use crate::error::{IngestError, Result};

/// Outcome of a successful coverage check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    Complete,
    /// Some units missing, accepted because the date is past the freshness
    /// threshold and the remote source will not fill it in further.
    BestEffort { retrieved: usize, expected: usize },
}

/// Apply the coverage policy.
///
/// Zero units fail with [`IngestError::NoData`]. A partial day succeeds only
/// when it is strictly older than `freshness_days`; recent partial days fail
/// with [`IngestError::IncompleteCoverage`] since late data is still expected.
pub fn check_coverage(
    retrieved: usize,
    expected: usize,
    date: NaiveDate,
    today: NaiveDate,
    freshness_days: u32,
) -> Result<Coverage> {
    if retrieved == 0 {
        return Err(IngestError::NoData);
    }
    if retrieved >= expected {
        return Ok(Coverage::Complete);
    }
    if age_in_days(date, today) > i64::from(freshness_days) {
        Ok(Coverage::BestEffort {
            retrieved,
            expected,
        })
    } else {
        Err(IngestError::IncompleteCoverage {
            retrieved,
            expected,
        })
    }
}
