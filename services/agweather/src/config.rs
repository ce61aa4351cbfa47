//! Service configuration loaded from YAML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use agweather_common::{Extent, Extents};
use derived::DegreeDayConfig;
use ingestion::SourceConfig;

/// Root configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// `sqlite:` URL; `DATABASE_URL` takes precedence.
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Dates processed concurrently per source or derived type.
    #[serde(default = "default_workers")]
    pub workers: usize,
    pub extents: BTreeMap<String, Extent>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub degree_days: Vec<DegreeDayConfig>,
    #[serde(default = "default_derived_history_days")]
    pub derived_history_days: u32,
}

fn default_database_url() -> String {
    "sqlite://data/agweather.db".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/agweather-cache")
}

fn default_workers() -> usize {
    2
}

fn default_derived_history_days() -> u32 {
    30
}

impl AppConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            debug!("Using DATABASE_URL from environment");
            config.database_url = url;
        }

        info!(
            path = %path.display(),
            sources = config.sources.len(),
            degree_days = config.degree_days.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Named extents, checked for nesting inside `full`.
    pub fn extents(&self) -> Result<Extents> {
        Ok(Extents::from_map(self.extents.clone())?)
    }

    pub fn validate(&self) -> Result<()> {
        let extents = self.extents()?;
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }

        let mut names = std::collections::HashSet::new();
        for source in &self.sources {
            source.validate(&extents)?;
            if !names.insert(source.name.as_str()) {
                bail!("duplicate source name '{}'", source.name);
            }
        }

        for dd in &self.degree_days {
            if !self.sources.iter().any(|s| s.name == dd.source) {
                bail!("degree-day '{}' reads unknown source '{}'", dd.name, dd.source);
            }
            if !names.insert(dd.name.as_str()) {
                bail!("degree-day name '{}' clashes with another dataset", dd.name);
            }
            if let Some(upper) = dd.upper {
                if dd.base > upper {
                    bail!("degree-day '{}': base {} is above upper {}", dd.name, dd.base, upper);
                }
            }
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name == name)
    }
}
