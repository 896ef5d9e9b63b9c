//! Run configuration
//!
//! Every batch binary reads one `ScanConfig`. Values come from, in order:
//! built-in defaults, the JSON file named by `SPELEO_CONFIG` (if set), then
//! the `DATA_DIR` / `OUTPUT_DIR` environment variables.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::anomaly::ScreeningParams;
use crate::ionex::BoundingBox;
use crate::proxy::Proxy;

pub const CONFIG_ENV: &str = "SPELEO_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// SISAL v3 CSV snapshot directory
    pub data_dir: PathBuf,
    /// Where CSV reports and the run manifest go
    pub output_dir: PathBuf,
    pub proxies: Vec<Proxy>,
    /// Entities with fewer dated samples are dropped
    pub min_samples: usize,

    /// PELT penalty
    pub penalty: f64,
    /// PELT minimum segment length, samples
    pub min_segment: usize,
    pub recovery_threshold: f64,
    pub recovery_cap: usize,

    /// Event window is year ± this, years
    pub window_half_width: f64,
    pub significance_draws: usize,
    pub seed: u64,

    pub catalog_path: Option<PathBuf>,
    /// Catalog events below this magnitude are ignored
    pub min_magnitude: f64,
    pub screening: ScreeningParams,

    pub ionex_path: Option<PathBuf>,
    pub ionex_region: Option<BoundingBox>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/sisal_v3"),
            output_dir: PathBuf::from("output"),
            proxies: vec![Proxy::D18O, Proxy::D13C],
            min_samples: 20,
            penalty: 3.0,
            min_segment: 5,
            recovery_threshold: crate::changepoint::DEFAULT_RECOVERY_THRESHOLD,
            recovery_cap: crate::changepoint::DEFAULT_RECOVERY_CAP,
            window_half_width: 25.0,
            significance_draws: 1000,
            seed: 42,
            catalog_path: None,
            min_magnitude: 6.0,
            screening: ScreeningParams::default(),
            ionex_path: None,
            ionex_region: None,
        }
    }
}

impl ScanConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overlaid with `SPELEO_CONFIG`, `DATA_DIR` and `OUTPUT_DIR`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(dir) = std::env::var("DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        config.validate()?;

        tracing::info!("Configuration:");
        tracing::info!("  DATA_DIR: {}", config.data_dir.display());
        tracing::info!("  OUTPUT_DIR: {}", config.output_dir.display());
        tracing::info!("  Proxies: {:?}", config.proxies);

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid { field, reason: reason.into() })
        }

        if !(self.penalty.is_finite() && self.penalty >= 0.0) {
            return invalid("penalty", format!("must be a non-negative number, got {}", self.penalty));
        }
        if self.min_segment == 0 {
            return invalid("min_segment", "must be at least 1");
        }
        if !(self.window_half_width > 0.0) {
            return invalid("window_half_width", "must be positive");
        }
        if !(self.recovery_threshold > 0.0) {
            return invalid("recovery_threshold", "must be positive");
        }
        if !(self.screening.threshold > 0.0) {
            return invalid("screening.threshold", "must be positive");
        }
        if !(self.screening.radius_km > 0.0) {
            return invalid("screening.radius_km", "must be positive");
        }
        if self.screening.tolerance_years < 0.0 {
            return invalid("screening.tolerance_years", "must not be negative");
        }
        if self.proxies.is_empty() {
            return invalid("proxies", "at least one proxy is required");
        }
        Ok(())
    }
}
