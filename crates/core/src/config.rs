//! Configuration structures for the balancing acceptance pipeline.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Placeholder substituted with the calendar year in `DataConfig::raw_file_pattern`.
pub const YEAR_PLACEHOLDER: &str = "{year}";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Raw data and cache locations.
    pub data: DataConfig,
    /// Asset benchmark configuration.
    pub benchmark: BenchmarkConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse a configuration from TOML text. Missing sections use defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if !self.data.raw_file_pattern.contains(YEAR_PLACEHOLDER) {
            return Err(Error::config(format!(
                "data.raw_file_pattern must contain {YEAR_PLACEHOLDER}: {}",
                self.data.raw_file_pattern
            )));
        }
        if !(self.benchmark.tolerance_mwh.is_finite() && self.benchmark.tolerance_mwh >= 0.0) {
            return Err(Error::config(format!(
                "benchmark.tolerance_mwh must be a non-negative number, got {}",
                self.benchmark.tolerance_mwh
            )));
        }
        Ok(())
    }
}

/// Raw data and aggregate cache locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding one raw acceptance CSV per year.
    pub raw_dir: PathBuf,
    /// File name of a year's raw CSV; `{year}` is replaced by the year.
    pub raw_file_pattern: String,
    /// Directory holding the per-year aggregate cache files.
    pub cache_dir: PathBuf,
    /// Fuel label used when a record carries no fuel type.
    pub unknown_fuel_label: String,
}

impl DataConfig {
    /// Path of the raw CSV for a year.
    pub fn raw_file(&self, year: i32) -> PathBuf {
        self.raw_dir
            .join(self.raw_file_pattern.replace(YEAR_PLACEHOLDER, &year.to_string()))
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            raw_file_pattern: "acceptances_{year}.csv".to_string(),
            cache_dir: PathBuf::from("data/cache"),
            unknown_fuel_label: "UNKNOWN".to_string(),
        }
    }
}

/// How revenue is priced for an asset that both bids and offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BothRevenuePolicy {
    /// Both prices are required; revenue uses their mean.
    #[default]
    Strict,
    /// Either price may be missing; only the priced leg runs and its price is used.
    AvailablePrice,
}

/// Asset benchmark configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Absolute tolerance (MWh) when testing the dispatched prefix against the requirement.
    pub tolerance_mwh: f64,
    /// Number of parallel workers for region evaluation (0 = auto, 1 = sequential).
    pub workers: u32,
    /// Revenue pricing for `both` assets.
    pub both_revenue: BothRevenuePolicy,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            tolerance_mwh: 1e-4,
            workers: 0,
            both_revenue: BothRevenuePolicy::Strict,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive; `RUST_LOG` takes precedence.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.benchmark.tolerance_mwh, 1e-4);
        assert_eq!(config.benchmark.both_revenue, BothRevenuePolicy::Strict);
        assert_eq!(config.data.unknown_fuel_label, "UNKNOWN");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_raw_file_substitutes_year() {
        let config = DataConfig::default();
        assert_eq!(
            config.raw_file(2024),
            PathBuf::from("data/raw").join("acceptances_2024.csv")
        );
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml_str(
            r#"
            [benchmark]
            workers = 1
            both_revenue = "available_price"
            "#,
        )
        .unwrap();

        assert_eq!(config.benchmark.workers, 1);
        assert_eq!(config.benchmark.both_revenue, BothRevenuePolicy::AvailablePrice);
        assert_eq!(config.benchmark.tolerance_mwh, 1e-4);
        assert_eq!(config.logging.filter, "info");
    }

    #[test]
    fn test_pattern_without_year_rejected() {
        let err = Config::from_toml_str(
            r#"
            [data]
            raw_file_pattern = "acceptances.csv"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let err = Config::from_toml_str("[benchmark]\ntolerance_mwh = -1.0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
