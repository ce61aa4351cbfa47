//! Import ledger: per (source, date) ingestion state and backfill planning.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use agweather_common::DateRange;

use crate::error::Result;
use crate::repository::{ImportRecord, ImportStatus, LedgerStore};

/// Records ingestion attempts and answers which dates still need work.
///
/// Every transition is a last-write-wins upsert, so a date can be started
/// again after it succeeded or failed.
#[derive(Clone)]
pub struct ImportLedger {
    store: Arc<dyn LedgerStore>,
}

impl ImportLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn start(&self, source: &str, date: NaiveDate) -> Result<()> {
        self.store
            .upsert_status(source, date, ImportStatus::Started, None)
            .await
    }

    pub async fn succeed(&self, source: &str, date: NaiveDate) -> Result<()> {
        self.store
            .upsert_status(source, date, ImportStatus::Successful, None)
            .await
    }

    pub async fn fail(&self, source: &str, date: NaiveDate, message: &str) -> Result<()> {
        warn!(source = %source, date = %date, message = %message, "Import marked unsuccessful");
        self.store
            .upsert_status(source, date, ImportStatus::Unsuccessful, Some(message))
            .await
    }

    pub async fn status(&self, source: &str, date: NaiveDate) -> Result<Option<ImportRecord>> {
        self.store.record(source, date).await
    }

    /// Dates in `[today - window_days, yesterday]` not yet marked successful.
    ///
    /// Failed, started and never-attempted dates are all returned.
    pub async fn days_to_load(
        &self,
        source: &str,
        today: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<NaiveDate>> {
        let window = DateRange::trailing(today, window_days);
        let done: BTreeSet<NaiveDate> = self
            .store
            .dates_with_status(source, window, ImportStatus::Successful)
            .await?
            .into_iter()
            .collect();

        let dates: Vec<NaiveDate> = window.days().filter(|d| !done.contains(d)).collect();
        debug!(source = %source, count = dates.len(), "Computed days to load");
        Ok(dates)
    }

    /// Dates in `range` absent from `present`, unioned with [`Self::days_to_load`].
    ///
    /// `present` is the distinct date set of the target dataset. The result is
    /// sorted and free of duplicates.
    pub async fn missing_dates(
        &self,
        source: &str,
        range: DateRange,
        present: &[NaiveDate],
        today: NaiveDate,
        window_days: u32,
    ) -> Result<Vec<NaiveDate>> {
        let present: BTreeSet<NaiveDate> = present.iter().copied().collect();
        let mut missing: BTreeSet<NaiveDate> =
            range.days().filter(|d| !present.contains(d)).collect();

        missing.extend(self.days_to_load(source, today, window_days).await?);
        Ok(missing.into_iter().collect())
    }

    /// Summarise every source's outcome per date in `range`.
    pub async fn check_statuses(&self, range: DateRange) -> Result<StatusReport> {
        let records = self.store.records_between(range).await?;

        let mut by_date: BTreeMap<NaiveDate, Vec<ImportRecord>> = BTreeMap::new();
        for record in records {
            by_date.entry(record.date).or_default().push(record);
        }

        let days = range
            .days()
            .map(|date| {
                let state = match by_date.remove(&date) {
                    None => DayState::NotAttempted,
                    Some(records) => {
                        let problems: Vec<SourceProblem> = records
                            .into_iter()
                            .filter(|r| r.status != ImportStatus::Successful)
                            .map(|r| SourceProblem {
                                source: r.source,
                                status: r.status,
                                message: r.message,
                            })
                            .collect();
                        if problems.is_empty() {
                            DayState::Ok
                        } else {
                            DayState::Problem(problems)
                        }
                    }
                };
                DayStatus { date, state }
            })
            .collect();

        Ok(StatusReport { range, days })
    }
}

/// One source that did not finish cleanly on a date.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceProblem {
    pub source: String,
    pub status: ImportStatus,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "problems", rename_all = "snake_case")]
pub enum DayState {
    NotAttempted,
    Ok,
    /// Some source is unsuccessful or still `started` (a crashed run).
    Problem(Vec<SourceProblem>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayStatus {
    pub date: NaiveDate,
    pub state: DayState,
}

/// Per-date report consumed by the notification layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub range: DateRange,
    pub days: Vec<DayStatus>,
}

impl StatusReport {
    pub fn has_problems(&self) -> bool {
        self.days
            .iter()
            .any(|d| matches!(d.state, DayState::Problem(_)))
    }

    pub fn problem_days(&self) -> impl Iterator<Item = &DayStatus> {
        self.days
            .iter()
            .filter(|d| matches!(d.state, DayState::Problem(_)))
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for day in &self.days {
            match &day.state {
                DayState::NotAttempted => writeln!(f, "{}: not attempted", day.date)?,
                DayState::Ok => writeln!(f, "{}: OK", day.date)?,
                DayState::Problem(problems) => {
                    writeln!(f, "{}: PROBLEM", day.date)?;
                    for p in problems {
                        match &p.message {
                            Some(msg) => writeln!(f, "  {}: {} ({})", p.source, p.status.as_str(), msg)?,
                            None => writeln!(f, "  {}: {}", p.source, p.status.as_str())?,
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn problem_report() -> StatusReport {
        let d1 = NaiveDate::from_ymd_opt(2024, 6, 13).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        StatusReport {
            range: DateRange::new(d1, d2),
            days: vec![
                DayStatus {
                    date: d1,
                    state: DayState::Ok,
                },
                DayStatus {
                    date: d2,
                    state: DayState::Problem(vec![SourceProblem {
                        source: "weather".into(),
                        status: ImportStatus::Unsuccessful,
                        message: Some("no data retrieved".into()),
                    }]),
                },
            ],
        }
    }

    #[test]
    fn test_report_rendering() {
        let rendered = problem_report().to_string();
        assert_eq!(
            rendered,
            "2024-06-13: OK\n2024-06-14: PROBLEM\n  weather: unsuccessful (no data retrieved)\n"
        );
    }

    #[test]
    fn test_report_has_problems() {
        let report = problem_report();
        assert!(report.has_problems());
        assert_eq!(report.problem_days().count(), 1);
    }
}
