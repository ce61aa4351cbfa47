//! Common test utilities for derived engine tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use agweather_common::{Extent, Extents, Field, Observation};
use ingestion::decoder::{parse_decoder_line, parse_lines};
use ingestion::{
    Convert, DecodeError, DecodedUnit, Decoder, DecoderConfig, FetchError, Fetcher, FieldOutput,
    FieldRule, IngestionPipeline, Reducer, RetryPolicy, SourceConfig, SourceKind,
};
use storage::{ImportLedger, RawDataStore, RawObservationRow, SqliteStore};

/// Writes the same decoder output for every unit.
pub struct StaticFetcher(pub String);

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<(), FetchError> {
        tokio::fs::write(dest, &self.0).await?;
        Ok(())
    }
}

pub struct FileLinesDecoder;

#[async_trait]
impl Decoder for FileLinesDecoder {
    async fn decode(&self, path: &Path, _selector: &str) -> Result<DecodedUnit, DecodeError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DecodeError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(parse_lines(&text, parse_decoder_line))
    }
}

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub ledger: ImportLedger,
    pub cache: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(SqliteStore::open_memory().await.unwrap());
        let ledger = ImportLedger::new(store.clone());
        Self {
            store,
            ledger,
            cache: test_utils::temp_cache_dir(),
        }
    }

    /// Hourly "weather" source over the tiny extent whose units all carry `body`.
    pub fn weather_pipeline(&self, body: String) -> IngestionPipeline {
        let (a, b, c, d) = test_utils::extent::TINY;
        let mut extents = BTreeMap::new();
        extents.insert("full".to_string(), Extent::new(a, b, c, d).unwrap());
        let extents = Extents::from_map(extents).unwrap();

        let config = SourceConfig {
            name: "weather".into(),
            kind: SourceKind::Grib,
            url_template: "mock://{date}/{hour}".into(),
            units_per_day: 24,
            extent: "full".into(),
            step: 1.0,
            selector: "TMP".into(),
            fields: vec![FieldRule {
                tag: "TMP".into(),
                convert: Convert::None,
                outputs: vec![
                    FieldOutput {
                        field: Field::MinTemp,
                        reduce: Reducer::Min,
                    },
                    FieldOutput {
                        field: Field::MaxTemp,
                        reduce: Reducer::Max,
                    },
                ],
            }],
            backfill_days: 5,
            freshness_days: 2,
            retry: RetryPolicy {
                attempts: 1,
                delay_secs: 0,
            },
            decoder: Some(DecoderConfig {
                program: "unused".into(),
                args: vec![],
                timeout_secs: 1,
            }),
            keep_files: false,
            parallel_fetches: 4,
        };

        IngestionPipeline::new(
            config,
            &extents,
            self.cache.path(),
            self.ledger.clone(),
            self.store.clone(),
            Arc::new(StaticFetcher(body)),
        )
        .unwrap()
        .with_decoder(Arc::new(FileLinesDecoder))
    }

    /// Store raw rows for `date` directly, bypassing ingestion.
    pub async fn put_raw(&self, date: NaiveDate, cells: &[(f64, f64, Option<f64>, Option<f64>)]) {
        let rows: Vec<RawObservationRow> = cells
            .iter()
            .map(|&(lat, long, min, max)| RawObservationRow {
                source: "weather".into(),
                date,
                latitude: lat,
                longitude: long,
                values: Observation {
                    min_temp: min,
                    max_temp: max,
                    ..Default::default()
                },
            })
            .collect();
        self.store
            .replace_observations("weather", date, &rows)
            .await
            .unwrap();
    }
}
