//! Per-source ingestion configuration.
//!
//! Sources are declared in the service's YAML file; each entry becomes a
//! [`SourceConfig`].

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use agweather_common::{Extents, Field};

use crate::error::{IngestError, Result};

/// How a source's unit files are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Binary grid files read through the external decoder process.
    Grib,
    /// Plain-text `value latitude longitude` feed read in-process.
    TextFeed,
}

/// One configured data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    /// URL with `{date}` (YYYYMMDD), `{hour}` (HH) and `{unit}` placeholders.
    pub url_template: String,
    #[serde(default = "default_units_per_day")]
    pub units_per_day: u32,
    /// Name of a configured extent.
    pub extent: String,
    #[serde(default = "default_step")]
    pub step: f64,
    /// Field selector handed to the decoder; tags text-feed values.
    #[serde(default)]
    pub selector: String,
    pub fields: Vec<FieldRule>,
    #[serde(default = "default_backfill_days")]
    pub backfill_days: u32,
    #[serde(default = "default_freshness_days")]
    pub freshness_days: u32,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub decoder: Option<DecoderConfig>,
    #[serde(default)]
    pub keep_files: bool,
    #[serde(default = "default_parallel_fetches")]
    pub parallel_fetches: usize,
}

fn default_units_per_day() -> u32 {
    24
}

fn default_step() -> f64 {
    0.1
}

fn default_backfill_days() -> u32 {
    5
}

fn default_freshness_days() -> u32 {
    2
}

fn default_parallel_fetches() -> usize {
    4
}

impl SourceConfig {
    /// URL of unit `unit` (0-based) for `date`.
    pub fn unit_url(&self, date: NaiveDate, unit: u32) -> String {
        self.url_template
            .replace("{date}", &date.format("%Y%m%d").to_string())
            .replace("{hour}", &format!("{:02}", unit))
            .replace("{unit}", &unit.to_string())
    }

    /// Cache file name for a unit, keeping the remote file's extension.
    pub fn unit_file_name(&self, unit: u32) -> String {
        let url = self.url_template.split(['?', '#']).next().unwrap_or_default();
        let last = url.rsplit('/').next().unwrap_or_default();
        match last.rsplit_once('.') {
            Some((_, ext)) if !ext.is_empty() && !ext.contains('{') => {
                format!("unit_{:02}.{}", unit, ext)
            }
            _ => format!("unit_{:02}", unit),
        }
    }

    /// Rules for a decoder field tag, if the tag is wanted.
    pub fn rule_for(&self, tag: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|r| r.tag == tag)
    }

    pub fn validate(&self, extents: &Extents) -> Result<()> {
        let invalid = |msg: String| Err(IngestError::Config(format!("{}: {}", self.name, msg)));

        if self.name.trim().is_empty() {
            return Err(IngestError::Config("source name is empty".into()));
        }
        if self.units_per_day == 0 {
            return invalid("units_per_day must be at least 1".into());
        }
        if !(self.step > 0.0) {
            return invalid(format!("step must be positive, got {}", self.step));
        }
        if self.fields.is_empty() || self.fields.iter().any(|r| r.outputs.is_empty()) {
            return invalid("every field rule needs at least one output".into());
        }
        if self.retry.attempts == 0 {
            return invalid("retry.attempts must be at least 1".into());
        }
        if self.parallel_fetches == 0 {
            return invalid("parallel_fetches must be at least 1".into());
        }
        if self.kind == SourceKind::Grib && self.decoder.is_none() {
            return invalid("grib sources need a decoder".into());
        }
        if self.kind == SourceKind::TextFeed && self.rule_for(&self.selector).is_none() {
            return invalid(format!("no field rule for selector '{}'", self.selector));
        }
        extents.get(&self.extent)?;
        Ok(())
    }
}

/// Maps one decoder field tag onto stored measurements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldRule {
    pub tag: String,
    #[serde(default)]
    pub convert: Convert,
    pub outputs: Vec<FieldOutput>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOutput {
    pub field: Field,
    pub reduce: Reducer,
}

/// Unit conversion applied to every reading before accumulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convert {
    #[default]
    None,
    KelvinToCelsius,
}

impl Convert {
    pub fn apply(&self, value: f64) -> f64 {
        match self {
            Self::None => value,
            Self::KelvinToCelsius => value - 273.15,
        }
    }
}

/// Reduction of a cell's accumulated readings to one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    Mean,
    Min,
    Max,
}

impl Reducer {
    /// `None` for an empty slice.
    pub fn reduce(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let value = match self {
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        Some(value)
    }
}

/// Fixed-delay retry for transient fetch failures.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

/// External decoder invocation.
///
/// `args` may contain `{path}` and `{selector}` placeholders.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    pub program: String,
    #[serde(default = "default_decoder_args")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_decoder_args() -> Vec<String> {
    vec!["{path}".to_string(), "{selector}".to_string()]
}

fn default_timeout_secs() -> u64 {
    60
}
