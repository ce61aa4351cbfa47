//! Common test utilities for ingestion tests
//!
//! Provides:
//! - A fetcher that serves canned unit contents and can drop units
//! - A decoder that reads decoder-format lines straight from the unit file
//! - A pipeline builder over an in-memory store

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use agweather_common::{Extent, Extents, Field};
use ingestion::decoder::{parse_decoder_line, parse_lines};
use ingestion::{
    Convert, DecodeError, DecodedUnit, Decoder, FetchError, Fetcher, FieldOutput, FieldRule,
    IngestionPipeline, Reducer, RetryPolicy, SourceConfig, SourceKind,
};
use storage::{ImportLedger, SqliteStore};

/// Serves the same body for every unit URL except those in `missing`.
///
/// Unit URLs are `mock://<date>/<unit>`.
pub struct MockFetcher {
    body: String,
    missing: HashSet<u32>,
    pub calls: AtomicUsize,
}

impl MockFetcher {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            missing: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn missing_units(mut self, units: impl IntoIterator<Item = u32>) -> Self {
        self.missing.extend(units);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let unit: u32 = url
            .rsplit('/')
            .next()
            .and_then(|u| u.parse().ok())
            .ok_or_else(|| FetchError::NotFound(url.to_string()))?;

        if self.missing.contains(&unit) {
            return Err(FetchError::NotFound(url.to_string()));
        }
        tokio::fs::write(dest, &self.body).await?;
        Ok(())
    }
}

/// Parses the unit file as decoder output without spawning a process.
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

/// Always fails, as a crashed decoder process would.
pub struct BrokenDecoder;

#[async_trait]
impl Decoder for BrokenDecoder {
    async fn decode(&self, _path: &Path, _selector: &str) -> Result<DecodedUnit, DecodeError> {
        Err(DecodeError::Exit {
            status: "exit status: 1".into(),
            stderr: "corrupt message".into(),
        })
    }
}

pub fn tiny_extents() -> Extents {
    let (a, b, c, d) = test_utils::extent::TINY;
    let mut map = BTreeMap::new();
    map.insert("full".to_string(), Extent::new(a, b, c, d).unwrap());
    Extents::from_map(map).unwrap()
}

/// Hourly source over the tiny extent at 1 degree, temperatures in Celsius.
pub fn weather_source() -> SourceConfig {
    SourceConfig {
        name: "weather".into(),
        kind: SourceKind::Grib,
        url_template: "mock://{date}/{unit}".into(),
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
                FieldOutput {
                    field: Field::AvgTemp,
                    reduce: Reducer::Mean,
                },
            ],
        }],
        backfill_days: 5,
        freshness_days: 2,
        retry: RetryPolicy {
            attempts: 3,
            delay_secs: 0,
        },
        decoder: Some(ingestion::DecoderConfig {
            program: "unused".into(),
            args: vec![],
            timeout_secs: 1,
        }),
        keep_files: false,
        parallel_fetches: 4,
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

    pub fn pipeline(
        &self,
        config: SourceConfig,
        fetcher: Arc<dyn Fetcher>,
        decoder: Arc<dyn Decoder>,
    ) -> IngestionPipeline {
        IngestionPipeline::new(
            config,
            &tiny_extents(),
            self.cache.path(),
            self.ledger.clone(),
            self.store.clone(),
            fetcher,
        )
        .unwrap()
        .with_decoder(decoder)
    }
}
