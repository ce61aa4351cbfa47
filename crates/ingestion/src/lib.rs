//! Weather observation ingestion.
//!
//! Turns a day of remote unit files into one row per grid cell:
//!
//! - Fetch every expected unit (HTTP or local file), reusing cached files
//!   and retrying transient failures
//! - Apply the coverage policy to decide whether the day is usable
//! - Decode units with an external process or the plain-text feed reader
//! - Snap readings onto a [`agweather_common::SpatialGrid`] and reduce each
//!   cell to summary values
//! - Replace the day's rows atomically and record the outcome in the
//!   [`storage::ImportLedger`]

pub mod aggregate;
pub mod config;
pub mod coverage;
pub mod decoder;
pub mod error;
pub mod fetch;
mod pipeline;

// Re-exports
pub use aggregate::{normalize_longitude, Accumulator};
pub use config::{
    Convert, DecoderConfig, FieldOutput, FieldRule, Reducer, RetryPolicy, SourceConfig, SourceKind,
};
pub use coverage::{check_coverage, Coverage};
pub use decoder::{DecodedUnit, Decoder, Reading, SubprocessDecoder, TextFeedDecoder};
pub use error::{DecodeError, FetchError, IngestError, Result};
pub use fetch::{fetch_with_retry, FileFetcher, Fetcher, HttpFetcher, SchemeFetcher};
pub use pipeline::{BackfillSummary, IngestOutcome, IngestionPipeline};
