//! Aggregator configuration
//!
//! Loaded from a JSON file; every field has a default so an empty object
//! (or no file at all) yields a runnable configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::InstrumentName;
use types::numeric::parse_decimal;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Year and month selecting the records of the monthly mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthConfig {
    pub year: i32,
    pub month: u32,
}

impl Default for MonthConfig {
    fn default() -> Self {
        Self { year: 2014, month: 11 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Line source. Default: "data/example_input.txt".
    #[serde(default = "default_input_path")]
    pub input_path: PathBuf,

    /// Destination of enriched records. Default: "multiplied.txt".
    #[serde(default = "default_output_path")]
    pub output_path: PathBuf,

    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Records dated after this are ignored. Default: 2014-12-19.
    #[serde(default = "default_as_of")]
    pub as_of: NaiveDate,

    /// Multiplier cache TTL in milliseconds. Default: 5000.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    /// Newest records summed for the "other instruments" figure. Default: 10.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// The three instruments with a dedicated aggregation.
    #[serde(default = "default_instruments")]
    pub instruments: [String; 3],

    #[serde(default)]
    pub mean_month: MonthConfig,

    /// Instrument name to decimal multiplier, seeding the in-memory store.
    #[serde(default)]
    pub multipliers: BTreeMap<String, String>,
}

fn default_input_path() -> PathBuf {
    PathBuf::from("data/example_input.txt")
}

fn default_output_path() -> PathBuf {
    PathBuf::from("multiplied.txt")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2014, 12, 19).unwrap_or_default()
}

fn default_cache_ttl_ms() -> u64 {
    5000
}

fn default_top_k() -> usize {
    10
}

fn default_instruments() -> [String; 3] {
    [
        "INSTRUMENT1".to_string(),
        "INSTRUMENT2".to_string(),
        "INSTRUMENT3".to_string(),
    ]
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_path: default_output_path(),
            log_level: default_log_level(),
            as_of: default_as_of(),
            cache_ttl_ms: default_cache_ttl_ms(),
            top_k: default_top_k(),
            instruments: default_instruments(),
            mean_month: MonthConfig::default(),
            multipliers: BTreeMap::new(),
        }
    }
}

impl AggregatorConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be positive".to_string()));
        }
        if self.cache_ttl_ms == 0 {
            return Err(ConfigError::Invalid("cache_ttl_ms must be positive".to_string()));
        }
        for name in &self.instruments {
            if InstrumentName::try_new(name.as_str()).is_none() {
                return Err(ConfigError::Invalid(format!("invalid instrument name {name:?}")));
            }
        }
        if !(1..=12).contains(&self.mean_month.month) {
            return Err(ConfigError::Invalid(format!(
                "mean_month.month must be 1-12, got {}",
                self.mean_month.month
            )));
        }
        self.multipliers()?;
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    /// Parsed multiplier table.
    pub fn multipliers(&self) -> Result<Vec<(String, Decimal)>, ConfigError> {
        self.multipliers
            .iter()
            .map(|(name, value)| {
                parse_decimal(value)
                    .map(|m| (name.clone(), m))
                    .map_err(|err| ConfigError::Invalid(format!("multiplier for {name}: {err}")))
            })
            .collect()
    }
}
