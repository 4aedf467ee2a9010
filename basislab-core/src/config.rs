//! TOML run configuration for a spread computation.
//!
//! ```toml
//! maturity = "2021-09-24T23:59:59"
//! folder = "archive"
//!
//! [spot]
//! symbol = "BTCUSDT"
//! trading_type = "spot"
//! interval = "1h"
//! start_date = "2021-06-26"
//! end_date = "2021-09-24"
//!
//! [derivative]
//! symbol = "BTCUSDT_210924"
//! trading_type = "um"
//! interval = "1h"
//! start_date = "2021-06-26"
//! end_date = "2021-09-24"
//! ```

use crate::data::request::{ArchiveRequest, DataKind, RequestError, RequestParams};
use crate::spread::{Compounding, SpreadCalculator};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Request(#[from] RequestError),
}

/// Both legs of a spread run plus the contract maturity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadConfig {
    /// Contract expiry, UTC.
    pub maturity: NaiveDateTime,
    #[serde(default)]
    pub compounding: Compounding,
    /// Cache root used by legs that do not set their own `dir`.
    #[serde(default)]
    pub folder: Option<PathBuf>,
    /// Where to write the joined series as CSV.
    #[serde(default)]
    pub output: Option<PathBuf>,
    pub spot: RequestParams,
    pub derivative: RequestParams,
}

impl SpreadConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Both legs must be klines of the same interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (leg, params) in [("spot", &self.spot), ("derivative", &self.derivative)] {
            if params.mkt_data_type != DataKind::Klines {
                return Err(ConfigError::Invalid(format!(
                    "{leg} leg must be klines, got {}",
                    params.mkt_data_type
                )));
            }
        }
        if self.spot.interval != self.derivative.interval {
            return Err(ConfigError::Invalid(
                "spot and derivative intervals differ".into(),
            ));
        }
        Ok(())
    }

    /// Resolve both legs into archive requests.
    pub fn requests(&self) -> Result<(ArchiveRequest, ArchiveRequest), ConfigError> {
        let resolve = |params: &RequestParams| {
            let mut params = params.clone();
            if params.dir.is_none() {
                params.dir = self.folder.clone();
            }
            ArchiveRequest::from_params(params)
        };
        Ok((resolve(&self.spot)?, resolve(&self.derivative)?))
    }

    pub fn calculator(&self) -> SpreadCalculator {
        SpreadCalculator::new(self.maturity).with_compounding(self.compounding)
    }
}
