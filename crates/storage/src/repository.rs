//! Repository interfaces and the row shapes they persist.
//!
//! Pipelines and engines receive these as trait objects so tests can run
//! against an in-memory store and production against a database file.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use agweather_common::{DateRange, Extent, Observation};

use crate::error::Result;

/// Ingestion state for one (source, date).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Started,
    Successful,
    Unsuccessful,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Successful => "successful",
            Self::Unsuccessful => "unsuccessful",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "started" => Some(Self::Started),
            "successful" => Some(Self::Successful),
            "unsuccessful" => Some(Self::Unsuccessful),
            _ => None,
        }
    }
}

/// Ledger entry, unique per (source, date).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportRecord {
    pub source: String,
    pub date: NaiveDate,
    pub status: ImportStatus,
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// One grid cell of raw data for a day, unique per (source, date, lat, long).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawObservationRow {
    pub source: String,
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub values: Observation,
}

/// One grid cell of a derived dataset, unique per (type, date, lat, long).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedDatumRow {
    pub derived_type: String,
    pub date: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub value: f64,
}

/// Durable storage behind [`crate::ImportLedger`].
///
/// Writes are last-write-wins upserts keyed by (source, date).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn upsert_status(
        &self,
        source: &str,
        date: NaiveDate,
        status: ImportStatus,
        message: Option<&str>,
    ) -> Result<()>;

    async fn record(&self, source: &str, date: NaiveDate) -> Result<Option<ImportRecord>>;

    /// All records for every source within the range, ordered by date then source.
    async fn records_between(&self, range: DateRange) -> Result<Vec<ImportRecord>>;

    async fn dates_with_status(
        &self,
        source: &str,
        range: DateRange,
        status: ImportStatus,
    ) -> Result<Vec<NaiveDate>>;
}

/// Raw observation rows written by the ingestion pipeline.
#[async_trait]
pub trait RawDataStore: Send + Sync {
    /// Atomically replace every row for (source, date) with `rows`.
    ///
    /// Readers see either the old complete set or the new one. Returns the
    /// number of rows inserted.
    async fn replace_observations(
        &self,
        source: &str,
        date: NaiveDate,
        rows: &[RawObservationRow],
    ) -> Result<u64>;

    async fn observations(&self, source: &str, date: NaiveDate) -> Result<Vec<RawObservationRow>>;

    async fn observations_in(
        &self,
        source: &str,
        range: DateRange,
        area: &Extent,
    ) -> Result<Vec<RawObservationRow>>;

    async fn observation_dates(&self, source: &str, range: DateRange) -> Result<Vec<NaiveDate>>;
}

/// Derived rows written by derived-computation engines.
#[async_trait]
pub trait DerivedDataStore: Send + Sync {
    /// Atomically replace every row for (derived_type, date) with `rows`.
    async fn replace_derived(
        &self,
        derived_type: &str,
        date: NaiveDate,
        rows: &[DerivedDatumRow],
    ) -> Result<u64>;

    async fn derived_values(&self, derived_type: &str, date: NaiveDate) -> Result<Vec<DerivedDatumRow>>;

    async fn derived_values_in(
        &self,
        derived_type: &str,
        range: DateRange,
        area: &Extent,
    ) -> Result<Vec<DerivedDatumRow>>;

    async fn derived_dates(&self, derived_type: &str, range: DateRange) -> Result<Vec<NaiveDate>>;
}
