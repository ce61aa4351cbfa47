//! SQLite-backed stores using sqlx.
//!
//! One database holds the import ledger, raw observations and derived data.
//! Day replacement runs delete-then-insert inside a single transaction.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use tracing::{debug, info};

use agweather_common::grid::{quantize, EPSILON};
use agweather_common::{DateRange, Extent, Observation};

use crate::error::{Result, StorageError};
use crate::repository::{
    DerivedDataStore, DerivedDatumRow, ImportRecord, ImportStatus, LedgerStore, RawDataStore,
    RawObservationRow,
};

/// Rows per INSERT statement; 9 binds per raw row stays well under SQLite's limit.
const INSERT_CHUNK: usize = 500;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS import_records (
    source TEXT NOT NULL,
    date TEXT NOT NULL,
    status TEXT NOT NULL,
    message TEXT,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (source, date)
);
CREATE INDEX IF NOT EXISTS idx_import_records_date ON import_records(date);
CREATE INDEX IF NOT EXISTS idx_import_records_status ON import_records(source, status);

CREATE TABLE IF NOT EXISTS raw_observations (
    source TEXT NOT NULL,
    date TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    min_temp REAL,
    max_temp REAL,
    avg_temp REAL,
    dew_point REAL,
    insolation REAL,
    UNIQUE (source, date, latitude, longitude)
);
CREATE INDEX IF NOT EXISTS idx_raw_source_date ON raw_observations(source, date);
CREATE INDEX IF NOT EXISTS idx_raw_lat_long ON raw_observations(latitude, longitude);

CREATE TABLE IF NOT EXISTS derived_data (
    derived_type TEXT NOT NULL,
    date TEXT NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    value REAL NOT NULL,
    UNIQUE (derived_type, date, latitude, longitude)
);
CREATE INDEX IF NOT EXISTS idx_derived_type_date ON derived_data(derived_type, date);
CREATE INDEX IF NOT EXISTS idx_derived_lat_long ON derived_data(latitude, longitude)
"#;

/// SQLite database holding every agweather table.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create the database file at the given path.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        Self::connect_with(options, 5).await
    }

    /// Connect using a `sqlite:` URL, e.g. `sqlite:///data/agweather.db`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        Self::connect_with(options, 5).await
    }

    /// Open an in-memory database (for testing).
    ///
    /// Uses a single connection that is never recycled, so the data lives as
    /// long as the store.
    pub async fn open_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn connect_with(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let options = options
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        info!("Opened agweather database");
        Ok(store)
    }

    /// Create tables and indexes if missing.
    async fn migrate(&self) -> Result<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Query bounds for an area, widened by the coordinate tolerance.
fn area_bounds(area: &Extent) -> (f64, f64, f64, f64) {
    (
        area.min_lat - EPSILON,
        area.max_lat + EPSILON,
        area.min_long - EPSILON,
        area.max_long + EPSILON,
    )
}

#[derive(FromRow)]
struct ImportRecordRow {
    source: String,
    date: NaiveDate,
    status: String,
    message: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ImportRecordRow> for ImportRecord {
    type Error = StorageError;

    fn try_from(row: ImportRecordRow) -> Result<Self> {
        let status = ImportStatus::parse(&row.status).ok_or_else(|| {
            StorageError::InvalidRow(format!(
                "unknown import status '{}' for {} {}",
                row.status, row.source, row.date
            ))
        })?;

        Ok(Self {
            source: row.source,
            date: row.date,
            status,
            message: row.message,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn upsert_status(
        &self,
        source: &str,
        date: NaiveDate,
        status: ImportStatus,
        message: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO import_records (source, date, status, message, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (source, date) DO UPDATE SET
                status = excluded.status,
                message = excluded.message,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(source)
        .bind(date)
        .bind(status.as_str())
        .bind(message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(source = %source, date = %date, status = status.as_str(), "Updated import record");
        Ok(())
    }

    async fn record(&self, source: &str, date: NaiveDate) -> Result<Option<ImportRecord>> {
        let row = sqlx::query_as::<_, ImportRecordRow>(
            "SELECT source, date, status, message, updated_at FROM import_records \
             WHERE source = ? AND date = ?",
        )
        .bind(source)
        .bind(date)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ImportRecord::try_from).transpose()
    }

    async fn records_between(&self, range: DateRange) -> Result<Vec<ImportRecord>> {
        let rows = sqlx::query_as::<_, ImportRecordRow>(
            "SELECT source, date, status, message, updated_at FROM import_records \
             WHERE date >= ? AND date <= ? ORDER BY date, source",
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ImportRecord::try_from).collect()
    }

    async fn dates_with_status(
        &self,
        source: &str,
        range: DateRange,
        status: ImportStatus,
    ) -> Result<Vec<NaiveDate>> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT date FROM import_records \
             WHERE source = ? AND status = ? AND date >= ? AND date <= ? ORDER BY date",
        )
        .bind(source)
        .bind(status.as_str())
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(dates)
    }
}

#[derive(FromRow)]
struct ObservationRow {
    source: String,
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
    min_temp: Option<f64>,
    max_temp: Option<f64>,
    avg_temp: Option<f64>,
    dew_point: Option<f64>,
    insolation: Option<f64>,
}

impl From<ObservationRow> for RawObservationRow {
    fn from(row: ObservationRow) -> Self {
        Self {
            source: row.source,
            date: row.date,
            latitude: row.latitude,
            longitude: row.longitude,
            values: Observation {
                min_temp: row.min_temp,
                max_temp: row.max_temp,
                avg_temp: row.avg_temp,
                dew_point: row.dew_point,
                insolation: row.insolation,
            },
        }
    }
}

const OBSERVATION_COLUMNS: &str =
    "source, date, latitude, longitude, min_temp, max_temp, avg_temp, dew_point, insolation";

#[async_trait]
impl RawDataStore for SqliteStore {
    async fn replace_observations(
        &self,
        source: &str,
        date: NaiveDate,
        rows: &[RawObservationRow],
    ) -> Result<u64> {
        if let Some(row) = rows.iter().find(|r| r.source != source || r.date != date) {
            return Err(StorageError::InvalidRow(format!(
                "row for {} {} passed to replace of {} {}",
                row.source, row.date, source, date
            )));
        }

        // Dropping the transaction without commit rolls it back
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM raw_observations WHERE source = ? AND date = ?")
            .bind(source)
            .bind(date)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut inserted = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO raw_observations ({}) ", OBSERVATION_COLUMNS));
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.source)
                    .push_bind(row.date)
                    .push_bind(quantize(row.latitude))
                    .push_bind(quantize(row.longitude))
                    .push_bind(row.values.min_temp)
                    .push_bind(row.values.max_temp)
                    .push_bind(row.values.avg_temp)
                    .push_bind(row.values.dew_point)
                    .push_bind(row.values.insolation);
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        debug!(
            source = %source,
            date = %date,
            deleted = deleted,
            inserted = inserted,
            "Replaced raw observations"
        );
        Ok(inserted)
    }

    async fn observations(&self, source: &str, date: NaiveDate) -> Result<Vec<RawObservationRow>> {
        let rows = sqlx::query_as::<_, ObservationRow>(&format!(
            "SELECT {} FROM raw_observations WHERE source = ? AND date = ? \
             ORDER BY latitude, longitude",
            OBSERVATION_COLUMNS
        ))
        .bind(source)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn observations_in(
        &self,
        source: &str,
        range: DateRange,
        area: &Extent,
    ) -> Result<Vec<RawObservationRow>> {
        let (min_lat, max_lat, min_long, max_long) = area_bounds(area);
        let rows = sqlx::query_as::<_, ObservationRow>(&format!(
            "SELECT {} FROM raw_observations \
             WHERE source = ? AND date >= ? AND date <= ? \
             AND latitude >= ? AND latitude <= ? AND longitude >= ? AND longitude <= ? \
             ORDER BY date, latitude, longitude",
            OBSERVATION_COLUMNS
        ))
        .bind(source)
        .bind(range.start)
        .bind(range.end)
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_long)
        .bind(max_long)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn observation_dates(&self, source: &str, range: DateRange) -> Result<Vec<NaiveDate>> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT DISTINCT date FROM raw_observations \
             WHERE source = ? AND date >= ? AND date <= ? ORDER BY date",
        )
        .bind(source)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(dates)
    }
}

#[derive(FromRow)]
struct DerivedRow {
    derived_type: String,
    date: NaiveDate,
    latitude: f64,
    longitude: f64,
    value: f64,
}

impl From<DerivedRow> for DerivedDatumRow {
    fn from(row: DerivedRow) -> Self {
        Self {
            derived_type: row.derived_type,
            date: row.date,
            latitude: row.latitude,
            longitude: row.longitude,
            value: row.value,
        }
    }
}

#[async_trait]
impl DerivedDataStore for SqliteStore {
    async fn replace_derived(
        &self,
        derived_type: &str,
        date: NaiveDate,
        rows: &[DerivedDatumRow],
    ) -> Result<u64> {
        if let Some(row) = rows
            .iter()
            .find(|r| r.derived_type != derived_type || r.date != date)
        {
            return Err(StorageError::InvalidRow(format!(
                "row for {} {} passed to replace of {} {}",
                row.derived_type, row.date, derived_type, date
            )));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM derived_data WHERE derived_type = ? AND date = ?")
            .bind(derived_type)
            .bind(date)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
                "INSERT INTO derived_data (derived_type, date, latitude, longitude, value) ",
            );
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(&row.derived_type)
                    .push_bind(row.date)
                    .push_bind(quantize(row.latitude))
                    .push_bind(quantize(row.longitude))
                    .push_bind(row.value);
            });
            inserted += qb.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;

        debug!(derived_type = %derived_type, date = %date, inserted = inserted, "Replaced derived data");
        Ok(inserted)
    }

    async fn derived_values(&self, derived_type: &str, date: NaiveDate) -> Result<Vec<DerivedDatumRow>> {
        let rows = sqlx::query_as::<_, DerivedRow>(
            "SELECT derived_type, date, latitude, longitude, value FROM derived_data \
             WHERE derived_type = ? AND date = ? ORDER BY latitude, longitude",
        )
        .bind(derived_type)
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn derived_values_in(
        &self,
        derived_type: &str,
        range: DateRange,
        area: &Extent,
    ) -> Result<Vec<DerivedDatumRow>> {
        let (min_lat, max_lat, min_long, max_long) = area_bounds(area);
        let rows = sqlx::query_as::<_, DerivedRow>(
            "SELECT derived_type, date, latitude, longitude, value FROM derived_data \
             WHERE derived_type = ? AND date >= ? AND date <= ? \
             AND latitude >= ? AND latitude <= ? AND longitude >= ? AND longitude <= ? \
             ORDER BY date, latitude, longitude",
        )
        .bind(derived_type)
        .bind(range.start)
        .bind(range.end)
        .bind(min_lat)
        .bind(max_lat)
        .bind(min_long)
        .bind(max_long)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn derived_dates(&self, derived_type: &str, range: DateRange) -> Result<Vec<NaiveDate>> {
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            "SELECT DISTINCT date FROM derived_data \
             WHERE derived_type = ? AND date >= ? AND date <= ? ORDER BY date",
        )
        .bind(derived_type)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(dates)
    }
}
