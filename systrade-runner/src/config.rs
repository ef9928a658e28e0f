//! Serializable simulation configuration.
//!
//! A simulation is described by one TOML file:
//!
//! ```toml
//! prices = "prices.csv"
//! start = "2019-07-10T09:30:00Z"
//! end = "2019-07-10T16:00:00Z"
//! interest_rate = 0.02
//! initial_cash = 10000.0
//!
//! [initial_holdings]
//! AAPL = 10
//!
//! [broker]
//! slippage_secs = 60
//! transaction_cost = 1.0
//! spread_pct = 0.1
//!
//! [[orders]]
//! type = "buy_market"
//! time = "2019-07-10T09:30:00Z"
//! ticker = "AAPL"
//! quantity = 5
//!
//! [[cancels]]
//! time = "2019-07-10T10:00:00Z"
//! order = 0
//! ```
//!
//! Times are RFC 3339 strings. A relative `prices` path is resolved against
//! the directory of the config file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use systrade_core::broker::{BrokerError, BrokerSettings};
use systrade_core::domain::{OrderRequest, Timestamp};
use systrade_core::engine::AccountConfig;
use systrade_core::ledger::Holdings;
use thiserror::Error;

/// Unique identifier for a simulation run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid broker settings: {0}")]
    Broker(#[from] BrokerError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Cancel the `order`-th entry of `[[orders]]` at `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCancel {
    pub time: Timestamp,
    /// Zero-based index into the config's order list.
    pub order: usize,
}

/// Everything needed to reproduce one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Price CSV: a `time` column followed by one column per ticker.
    pub prices: PathBuf,

    /// Account window start (inclusive).
    pub start: Timestamp,

    /// Account window end (inclusive).
    pub end: Timestamp,

    #[serde(default)]
    pub interest_rate: f64,

    #[serde(default)]
    pub initial_cash: f64,

    #[serde(default)]
    pub initial_holdings: Holdings,

    #[serde(default)]
    pub broker: BrokerSettings,

    #[serde(default)]
    pub orders: Vec<OrderRequest>,

    #[serde(default)]
    pub cancels: Vec<ScheduledCancel>,
}

impl SimulationConfig {
    /// Parse from a TOML string. Relative paths stay as written.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file, resolving `prices` against its directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        if config.prices.is_relative() {
            if let Some(dir) = path.parent() {
                config.prices = dir.join(&config.prices);
            }
        }
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(format!("serialize: {e}")))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start > self.end {
            return Err(ConfigError::Invalid(format!(
                "start {} is after end {}",
                self.start, self.end
            )));
        }
        if !self.interest_rate.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "interest_rate must be finite, got {}",
                self.interest_rate
            )));
        }
        if !self.initial_cash.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "initial_cash must be finite, got {}",
                self.initial_cash
            )));
        }
        self.broker.validate()?;
        if let Some((i, _)) = self.orders.iter().enumerate().find(|(_, o)| o.quantity == 0) {
            return Err(ConfigError::Invalid(format!("order {i} has zero quantity")));
        }
        if let Some((i, o)) = self.orders.iter().enumerate().find(|(_, o)| o.time < self.start) {
            return Err(ConfigError::Invalid(format!(
                "order {i} is scheduled at {}, before the window start {}",
                o.time, self.start
            )));
        }
        if let Some(c) = self.cancels.iter().find(|c| c.order >= self.orders.len()) {
            return Err(ConfigError::Invalid(format!(
                "cancel at {} refers to order {}, but only {} orders are configured",
                c.time,
                c.order,
                self.orders.len()
            )));
        }
        Ok(())
    }

    /// Opening conditions for the account.
    pub fn account_config(&self) -> AccountConfig {
        AccountConfig {
            interest_rate: self.interest_rate,
            initial_cash: self.initial_cash,
            initial_holdings: self.initial_holdings.clone(),
        }
    }

    /// Deterministic BLAKE3 hash of the canonical JSON form of this config.
    ///
    /// Two runs with identical configs share a RunId. The price data itself
    /// is hashed separately by the data loader.
    pub fn run_id(&self) -> Result<RunId, ConfigError> {
        let json = serde_json::to_string(self)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}
