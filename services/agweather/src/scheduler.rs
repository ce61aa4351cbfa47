//! Runs ingestion, derived computation and status checks for the configured
//! sources.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use agweather_common::{DateRange, Extents};
use derived::{DegreeDayStage, DeriveSummary, DerivedEngine, DerivedStage};
use ingestion::{BackfillSummary, Fetcher, IngestOutcome, IngestionPipeline, SourceConfig};
use storage::{ImportLedger, SqliteStore, StatusReport};

use crate::config::AppConfig;
use crate::notify::StatusNotifier;

/// Default number of days covered by the status report.
pub const DEFAULT_STATUS_DAYS: u32 = 5;

pub struct Scheduler {
    config: AppConfig,
    extents: Extents,
    store: Arc<SqliteStore>,
    ledger: ImportLedger,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn StatusNotifier>,
}

impl Scheduler {
    pub fn new(
        config: AppConfig,
        store: Arc<SqliteStore>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn StatusNotifier>,
    ) -> Result<Self> {
        let extents = config.extents()?;
        let ledger = ImportLedger::new(store.clone());
        Ok(Self {
            config,
            extents,
            store,
            ledger,
            fetcher,
            notifier,
        })
    }

    fn pipeline(&self, source: &SourceConfig) -> Result<IngestionPipeline> {
        let pipeline = IngestionPipeline::new(
            source.clone(),
            &self.extents,
            &self.config.cache_dir,
            self.ledger.clone(),
            self.store.clone(),
            self.fetcher.clone(),
        )?;
        Ok(pipeline)
    }

    fn source(&self, name: &str) -> Result<&SourceConfig> {
        self.config
            .source(name)
            .ok_or_else(|| anyhow!("unknown source '{}'", name))
    }

    fn engine(&self) -> DerivedEngine {
        let backfill_days = self
            .config
            .sources
            .iter()
            .map(|s| s.backfill_days)
            .max()
            .unwrap_or(5);

        DerivedEngine::new(self.ledger.clone(), self.store.clone(), self.store.clone())
            .with_history_days(self.config.derived_history_days)
            .with_backfill_days(backfill_days)
            .with_workers(self.config.workers)
    }

    /// Ingest then derive, then check and report status.
    pub async fn run(&self, today: NaiveDate) -> Result<StatusReport> {
        let run_id = Uuid::new_v4();
        async {
            info!(today = %today, "Starting daily run");
            self.ingest_all(today).await;
            self.derive_all(today).await;
            self.check_status(today, self.status_days()).await
        }
        .instrument(info_span!("run", run_id = %run_id))
        .await
    }

    fn status_days(&self) -> u32 {
        self.config
            .sources
            .iter()
            .map(|s| s.backfill_days)
            .max()
            .unwrap_or(DEFAULT_STATUS_DAYS)
    }

    /// Backfill every source. Failures are logged and the next source runs.
    pub async fn ingest_all(&self, today: NaiveDate) {
        for source in &self.config.sources {
            if let Err(e) = self.ingest_source(&source.name, today).await {
                error!(source = %source.name, error = %e, "Source ingestion failed");
            }
        }
    }

    pub async fn ingest_source(&self, name: &str, today: NaiveDate) -> Result<BackfillSummary> {
        let pipeline = self.pipeline(self.source(name)?)?;
        let summary = pipeline
            .run_backfill(today, self.config.workers)
            .await
            .with_context(|| format!("backfill of '{}' failed", name))?;
        Ok(summary)
    }

    /// Ingest one explicit date, regardless of its ledger state.
    pub async fn ingest_date(&self, name: &str, date: NaiveDate, today: NaiveDate) -> Result<IngestOutcome> {
        let pipeline = self.pipeline(self.source(name)?)?;
        Ok(pipeline.run_date(date, today).await?)
    }

    /// Run every degree-day dataset. Failures are logged and the next runs.
    pub async fn derive_all(&self, today: NaiveDate) {
        for dd in &self.config.degree_days {
            if let Err(e) = self.derive(&dd.name, today).await {
                error!(derived_type = %dd.name, error = %e, "Derived computation failed");
            }
        }
    }

    pub async fn derive(&self, name: &str, today: NaiveDate) -> Result<DeriveSummary> {
        let config = self
            .config
            .degree_days
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| anyhow!("unknown derived dataset '{}'", name))?;

        let stage: Arc<dyn DerivedStage> = Arc::new(DegreeDayStage::new(config.clone()));
        Ok(self.engine().run(&stage, today).await?)
    }

    /// Build the status report for the `days` before today and notify when
    /// it contains problems.
    pub async fn check_status(&self, today: NaiveDate, days: u32) -> Result<StatusReport> {
        let report = self
            .ledger
            .check_statuses(DateRange::trailing(today, days))
            .await?;

        if report.has_problems() {
            self.notifier.notify(&report).await?;
        } else {
            info!(days = days, "No import problems");
        }
        Ok(report)
    }
}
