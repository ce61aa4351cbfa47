//! Orchestration of derived computations over persisted raw data.

use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use metrics::counter;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use agweather_common::{DateRange, Observation};
use storage::{DerivedDataStore, DerivedDatumRow, ImportLedger, RawDataStore, RawObservationRow};

use crate::degree_days::{calculate_degree_days, DegreeDayMethod, TemperatureUnit};
use crate::error::{DerivedError, Result, ValidationError};

/// A per-cell derived dataset.
///
/// `compute` must be a pure function of one cell's observation. `Ok(None)`
/// means the cell lacks the inputs and gets no output row.
pub trait DerivedStage: Send + Sync {
    /// Name under which rows and ledger entries are stored.
    fn derived_type(&self) -> &str;

    /// Raw source whose observations feed the stage.
    fn source(&self) -> &str;

    fn compute(&self, observation: &Observation) -> std::result::Result<Option<f64>, ValidationError>;
}

/// Configuration of one degree-day dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegreeDayConfig {
    pub name: String,
    pub source: String,
    pub base: f64,
    #[serde(default)]
    pub upper: Option<f64>,
    pub method: DegreeDayMethod,
    #[serde(default)]
    pub unit: TemperatureUnit,
}

/// Degree days from each cell's min and max temperature.
#[derive(Debug, Clone)]
pub struct DegreeDayStage {
    config: DegreeDayConfig,
}

impl DegreeDayStage {
    pub fn new(config: DegreeDayConfig) -> Self {
        Self { config }
    }
}

impl DerivedStage for DegreeDayStage {
    fn derived_type(&self) -> &str {
        &self.config.name
    }

    fn source(&self) -> &str {
        &self.config.source
    }

    fn compute(&self, observation: &Observation) -> std::result::Result<Option<f64>, ValidationError> {
        let (Some(min), Some(max)) = (observation.min_temp, observation.max_temp) else {
            return Ok(None);
        };
        let unit = self.config.unit;
        calculate_degree_days(
            unit.from_celsius(min),
            unit.from_celsius(max),
            self.config.base,
            self.config.upper,
            self.config.method,
        )
        .map(Some)
    }
}

/// Dates processed by one [`DerivedEngine::run`].
#[derive(Debug, Clone, Default)]
pub struct DeriveSummary {
    pub succeeded: Vec<NaiveDate>,
    pub failed: Vec<(NaiveDate, String)>,
}

/// Runs derived stages for dates that have raw data but no derived rows.
///
/// Progress is tracked in the import ledger under the stage's derived type.
pub struct DerivedEngine {
    ledger: ImportLedger,
    raw: Arc<dyn RawDataStore>,
    derived: Arc<dyn DerivedDataStore>,
    history_days: u32,
    backfill_days: u32,
    workers: usize,
}

impl DerivedEngine {
    pub fn new(
        ledger: ImportLedger,
        raw: Arc<dyn RawDataStore>,
        derived: Arc<dyn DerivedDataStore>,
    ) -> Self {
        Self {
            ledger,
            raw,
            derived,
            history_days: 30,
            backfill_days: 5,
            workers: 2,
        }
    }

    /// How far back to look for raw dates without derived rows.
    pub fn with_history_days(mut self, days: u32) -> Self {
        self.history_days = days;
        self
    }

    /// Window in which dates not marked successful are recomputed.
    pub fn with_backfill_days(mut self, days: u32) -> Self {
        self.backfill_days = days;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Dates the stage still has to compute: missing or unconfirmed derived
    /// dates that have raw data.
    pub async fn pending_dates(&self, stage: &dyn DerivedStage, today: NaiveDate) -> Result<Vec<NaiveDate>> {
        let range = DateRange::trailing(today, self.history_days.max(self.backfill_days));
        let raw_dates = self.raw.observation_dates(stage.source(), range).await?;
        let present = self.derived.derived_dates(stage.derived_type(), range).await?;

        let missing = self
            .ledger
            .missing_dates(stage.derived_type(), range, &present, today, self.backfill_days)
            .await?;

        Ok(missing
            .into_iter()
            .filter(|d| raw_dates.binary_search(d).is_ok())
            .collect())
    }

    /// Compute every pending date. A failing date never stops the others.
    pub async fn run(&self, stage: &Arc<dyn DerivedStage>, today: NaiveDate) -> Result<DeriveSummary> {
        let dates = self.pending_dates(stage.as_ref(), today).await?;
        if dates.is_empty() {
            debug!(derived_type = %stage.derived_type(), "Nothing to derive");
            return Ok(DeriveSummary::default());
        }

        let results: Vec<(NaiveDate, Result<u64>)> = stream::iter(dates)
            .map(|date| async move { (date, self.run_date(stage, date).await) })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut summary = DeriveSummary::default();
        for (date, result) in results {
            match result {
                Ok(_) => summary.succeeded.push(date),
                Err(e) => summary.failed.push((date, e.to_string())),
            }
        }
        summary.succeeded.sort();
        summary.failed.sort_by_key(|(d, _)| *d);

        info!(
            derived_type = %stage.derived_type(),
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "Derived run complete"
        );
        Ok(summary)
    }

    /// Compute one date and replace its rows, recording the outcome in the
    /// ledger. Returns the number of rows written.
    #[instrument(skip(self, stage), fields(derived_type = %stage.derived_type()))]
    pub async fn run_date(&self, stage: &Arc<dyn DerivedStage>, date: NaiveDate) -> Result<u64> {
        let name = stage.derived_type();
        self.ledger.start(name, date).await?;

        match self.compute_date(stage, date).await {
            Ok(written) => {
                self.ledger.succeed(name, date).await?;
                counter!(
                    "agweather_derived_dates_total",
                    "derived_type" => name.to_string(),
                    "outcome" => "success"
                )
                .increment(1);
                info!(date = %date, rows = written, "Derived date");
                Ok(written)
            }
            Err(e) => {
                counter!(
                    "agweather_derived_dates_total",
                    "derived_type" => name.to_string(),
                    "outcome" => e.kind()
                )
                .increment(1);
                self.ledger.fail(name, date, &e.to_string()).await?;
                Err(e)
            }
        }
    }

    async fn compute_date(&self, stage: &Arc<dyn DerivedStage>, date: NaiveDate) -> Result<u64> {
        let raw = self.raw.observations(stage.source(), date).await?;
        if raw.is_empty() {
            return Err(DerivedError::NoRawData {
                source_name: stage.source().to_string(),
                date,
            });
        }

        // CPU-bound, keep it off the async workers
        let task_stage = Arc::clone(stage);
        let rows = tokio::task::spawn_blocking(move || compute_rows(task_stage.as_ref(), date, &raw))
            .await??;
        let written = self
            .derived
            .replace_derived(stage.derived_type(), date, &rows)
            .await?;
        Ok(written)
    }
}

/// Apply a stage to every raw row of a date.
///
/// The first invalid cell aborts the whole date.
pub fn compute_rows(
    stage: &dyn DerivedStage,
    date: NaiveDate,
    raw: &[RawObservationRow],
) -> Result<Vec<DerivedDatumRow>> {
    let computed: Vec<Option<DerivedDatumRow>> = raw
        .par_iter()
        .map(|row| {
            let value = stage
                .compute(&row.values)
                .map_err(|source| DerivedError::Validation {
                    latitude: row.latitude,
                    longitude: row.longitude,
                    source,
                })?;
            Ok(value.map(|value| DerivedDatumRow {
                derived_type: stage.derived_type().to_string(),
                date,
                latitude: row.latitude,
                longitude: row.longitude,
                value,
            }))
        })
        .collect::<Result<_>>()?;

    Ok(computed.into_iter().flatten().collect())
}
