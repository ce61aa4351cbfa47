//! Per (source, date) ingestion: fetch, decode, grid, persist.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use metrics::counter;
use tracing::{debug, info, instrument, warn};

use agweather_common::{DateRange, Extent, Extents};
use storage::{ImportLedger, RawDataStore};

use crate::aggregate::Accumulator;
use crate::config::{SourceConfig, SourceKind};
use crate::coverage::{check_coverage, Coverage};
use crate::decoder::{Decoder, SubprocessDecoder, TextFeedDecoder};
use crate::error::{IngestError, Result};
use crate::fetch::{fetch_with_retry, Fetcher};

/// Summary of one successfully ingested date.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub source: String,
    pub date: NaiveDate,
    pub units_expected: usize,
    pub units_retrieved: usize,
    pub units_decoded: usize,
    pub coverage: Coverage,
    pub skipped_lines: usize,
    pub rows_written: u64,
}

/// Result of a backfill pass over the ledger's days to load.
#[derive(Debug, Clone, Default)]
pub struct BackfillSummary {
    pub succeeded: Vec<NaiveDate>,
    pub failed: Vec<(NaiveDate, String)>,
}

impl BackfillSummary {
    pub fn attempted(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Ingests one configured source.
///
/// Every date is recorded in the ledger: `started` on entry, then
/// `successful` or `unsuccessful` with the error message.
pub struct IngestionPipeline {
    config: SourceConfig,
    extent: Extent,
    cache_dir: PathBuf,
    ledger: ImportLedger,
    store: Arc<dyn RawDataStore>,
    fetcher: Arc<dyn Fetcher>,
    decoder: Arc<dyn Decoder>,
}

impl IngestionPipeline {
    /// Build a pipeline, validating the source and picking the decoder for
    /// its kind.
    pub fn new(
        config: SourceConfig,
        extents: &Extents,
        cache_dir: impl Into<PathBuf>,
        ledger: ImportLedger,
        store: Arc<dyn RawDataStore>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self> {
        config.validate(extents)?;
        let extent = *extents.get(&config.extent)?;

        let decoder: Arc<dyn Decoder> = match (config.kind, &config.decoder) {
            (SourceKind::Grib, Some(decoder)) => Arc::new(SubprocessDecoder::new(decoder)),
            (SourceKind::Grib, None) => {
                return Err(IngestError::Config(format!("{}: grib sources need a decoder", config.name)))
            }
            (SourceKind::TextFeed, _) => Arc::new(TextFeedDecoder),
        };

        Ok(Self {
            config,
            extent,
            cache_dir: cache_dir.into(),
            ledger,
            store,
            fetcher,
            decoder,
        })
    }

    /// Replace the decoder chosen from the source kind.
    pub fn with_decoder(mut self, decoder: Arc<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn source(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// `<cache_dir>/<source>/<YYYYMMDD>`
    pub fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.cache_dir
            .join(&self.config.name)
            .join(date.format("%Y%m%d").to_string())
    }

    /// Ingest one date and record the outcome in the ledger.
    ///
    /// Failures are recorded, not retried; the error is also returned.
    #[instrument(skip(self, today), fields(source = %self.config.name))]
    pub async fn run_date(&self, date: NaiveDate, today: NaiveDate) -> Result<IngestOutcome> {
        self.ledger.start(&self.config.name, date).await?;

        match self.ingest(date, today).await {
            Ok(outcome) => {
                self.ledger.succeed(&self.config.name, date).await?;
                counter!(
                    "agweather_ingest_dates_total",
                    "source" => self.config.name.clone(),
                    "outcome" => "success"
                )
                .increment(1);

                if !self.config.keep_files {
                    self.remove_day_dir(date).await;
                }

                info!(
                    date = %date,
                    retrieved = outcome.units_retrieved,
                    expected = outcome.units_expected,
                    rows = outcome.rows_written,
                    "Ingested date"
                );
                Ok(outcome)
            }
            Err(e) => {
                counter!(
                    "agweather_ingest_dates_total",
                    "source" => self.config.name.clone(),
                    "outcome" => e.kind()
                )
                .increment(1);
                self.ledger
                    .fail(&self.config.name, date, &e.to_string())
                    .await?;
                self.remove_empty_day_dir(date).await;
                Err(e)
            }
        }
    }

    /// Ingest every date the ledger reports as not yet loaded.
    ///
    /// At most `workers` dates run at once. A failing date never stops the
    /// others.
    pub async fn run_backfill(&self, today: NaiveDate, workers: usize) -> Result<BackfillSummary> {
        self.prune_cache(today).await;

        let dates = self
            .ledger
            .days_to_load(&self.config.name, today, self.config.backfill_days)
            .await?;

        if dates.is_empty() {
            debug!(source = %self.config.name, "Nothing to backfill");
            return Ok(BackfillSummary::default());
        }

        info!(source = %self.config.name, dates = dates.len(), "Starting backfill");

        let results: Vec<(NaiveDate, Result<IngestOutcome>)> = stream::iter(dates)
            .map(|date| async move { (date, self.run_date(date, today).await) })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;

        let mut summary = BackfillSummary::default();
        for (date, result) in results {
            match result {
                Ok(_) => summary.succeeded.push(date),
                Err(e) => summary.failed.push((date, e.to_string())),
            }
        }
        summary.succeeded.sort();
        summary.failed.sort_by_key(|(d, _)| *d);

        info!(
            source = %self.config.name,
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            "Backfill complete"
        );
        Ok(summary)
    }

    async fn ingest(&self, date: NaiveDate, today: NaiveDate) -> Result<IngestOutcome> {
        let expected = self.config.units_per_day as usize;
        let dir = self.day_dir(date);
        tokio::fs::create_dir_all(&dir).await?;

        let units = self.fetch_units(date, &dir).await;
        check_coverage(units.len(), expected, date, today, self.config.freshness_days)?;

        // Aggregation must see every unit before reduction, so decode in order
        let mut acc = Accumulator::new(&self.config, &self.extent)?;
        let mut decoded = 0;
        let mut skipped = 0;
        let mut last_error = None;
        for (unit, path) in &units {
            match self.decoder.decode(path, &self.config.selector).await {
                Ok(output) => {
                    acc.extend(&output.readings)?;
                    skipped += output.skipped;
                    decoded += 1;
                }
                Err(e) => {
                    warn!(date = %date, unit = unit, error = %e, "Failed to decode unit");
                    last_error = Some(e);
                }
            }
        }

        if let (0, Some(e)) = (decoded, last_error) {
            return Err(IngestError::Decode(e));
        }

        if skipped > 0 {
            counter!(
                "agweather_decode_skipped_lines_total",
                "source" => self.config.name.clone()
            )
            .increment(skipped as u64);
        }

        let coverage = check_coverage(decoded, expected, date, today, self.config.freshness_days)?;
        if let Coverage::BestEffort { .. } = coverage {
            info!(date = %date, decoded = decoded, expected = expected, "Accepting partial coverage");
        }

        debug!(
            date = %date,
            accepted = acc.accepted(),
            outside = acc.outside(),
            unwanted = acc.unwanted(),
            "Accumulated readings"
        );

        let rows = acc.into_rows(date);
        if rows.is_empty() {
            return Err(IngestError::NoData);
        }

        let written = self
            .store
            .replace_observations(&self.config.name, date, &rows)
            .await?;

        Ok(IngestOutcome {
            source: self.config.name.clone(),
            date,
            units_expected: expected,
            units_retrieved: units.len(),
            units_decoded: decoded,
            coverage,
            skipped_lines: skipped,
            rows_written: written,
        })
    }

    /// Fetch every unit of the day, returning the ones retrieved in unit order.
    async fn fetch_units(&self, date: NaiveDate, dir: &Path) -> Vec<(u32, PathBuf)> {
        let mut units: Vec<(u32, PathBuf)> = stream::iter(0..self.config.units_per_day)
            .map(|unit| async move {
                let url = self.config.unit_url(date, unit);
                let dest = dir.join(self.config.unit_file_name(unit));
                match fetch_with_retry(
                    self.fetcher.as_ref(),
                    &self.config.name,
                    &url,
                    &dest,
                    &self.config.retry,
                )
                .await
                {
                    Ok(path) => Some((unit, path)),
                    Err(e) => {
                        debug!(url = %url, error = %e, "Unit not retrieved");
                        None
                    }
                }
            })
            .buffer_unordered(self.config.parallel_fetches)
            .filter_map(futures::future::ready)
            .collect()
            .await;

        units.sort_by_key(|(unit, _)| *unit);
        units
    }

    /// Remove cached day directories older than the backfill window.
    ///
    /// Those dates are never retried, so their partial units are dead weight.
    pub async fn prune_cache(&self, today: NaiveDate) {
        let oldest = DateRange::trailing(today, self.config.backfill_days).start;
        let source_dir = self.cache_dir.join(&self.config.name);

        let mut entries = match tokio::fs::read_dir(&source_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!(path = %source_dir.display(), error = %e, "Failed to list unit cache");
                return;
            }
        };

        let mut stale = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let date = entry
                        .file_name()
                        .to_str()
                        .and_then(|name| NaiveDate::parse_from_str(name, "%Y%m%d").ok());
                    if let Some(date) = date.filter(|d| *d < oldest) {
                        stale.push(date);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(path = %source_dir.display(), error = %e, "Failed to list unit cache");
                    break;
                }
            }
        }

        for date in stale {
            debug!(source = %self.config.name, date = %date, "Pruning cached units");
            self.remove_day_dir(date).await;
        }
    }

    /// Drop the day directory of a failed date if nothing was fetched into it.
    async fn remove_empty_day_dir(&self, date: NaiveDate) {
        // remove_dir refuses non-empty directories, keeping units for the retry
        if let Err(e) = tokio::fs::remove_dir(self.day_dir(date)).await {
            debug!(date = %date, error = %e, "Kept day directory");
        }
    }

    async fn remove_day_dir(&self, date: NaiveDate) {
        let dir = self.day_dir(date);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!(path = %dir.display(), error = %e, "Failed to remove cached units");
        }
    }
}
