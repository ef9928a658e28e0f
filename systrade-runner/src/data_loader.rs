//! Price loading for the runner.
//!
//! Prices come from a wide CSV: a `time` column followed by one column per
//! ticker.
//!
//! ```text
//! time,tick0,tick1
//! 2019-07-10T09:30:00Z,10.0,20.0
//! 2019-07-10T09:31:00Z,10.5,19.5
//! ```
//!
//! Times are RFC 3339, or a bare `YYYY-MM-DD` date taken as midnight UTC.
//! Rows must be in strictly increasing time order and every price must be a
//! finite number. Every loaded table gets a BLAKE3 dataset hash so a run can
//! be traced back to the exact data it used.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use systrade_core::broker::{BrokerError, BrokerSettings, PaperBroker, PriceTable};
use systrade_core::domain::{Ticker, Timestamp};
use thiserror::Error;
use tracing::debug;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open price file {path}: {source}")]
    Open { path: PathBuf, source: csv::Error },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("price file has no 'time' column as its first header")]
    MissingTimeColumn,

    #[error("price file has no ticker columns")]
    NoTickers,

    #[error("row {row}: cannot parse time '{value}'")]
    BadTime { row: usize, value: String },

    #[error("row {row}: cannot parse price '{value}' for {ticker}")]
    BadPrice {
        row: usize,
        ticker: Ticker,
        value: String,
    },

    #[error("price table rejected: {0}")]
    Table(#[from] BrokerError),
}

pub const TIME_COLUMN: &str = "time";

/// A loaded price table and its provenance hash.
#[derive(Debug, Clone)]
pub struct LoadedPrices {
    pub table: PriceTable,
    /// BLAKE3 over times and prices in ticker order.
    pub dataset_hash: String,
}

impl LoadedPrices {
    /// Wrap the table in a paper broker with the given friction settings.
    pub fn into_broker(self, settings: BrokerSettings) -> Result<(PaperBroker, String), LoadError> {
        let broker = PaperBroker::new(self.table, settings)?;
        Ok((broker, self.dataset_hash))
    }
}

/// Load a price CSV from disk.
pub fn load_prices(path: &Path) -> Result<LoadedPrices, LoadError> {
    let reader = csv::Reader::from_path(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = parse_prices(reader)?;
    debug!(
        path = %path.display(),
        rows = loaded.table.len(),
        hash = %loaded.dataset_hash,
        "prices loaded"
    );
    Ok(loaded)
}

/// Parse a price CSV from any reader.
pub fn read_prices<R: Read>(input: R) -> Result<LoadedPrices, LoadError> {
    parse_prices(csv::Reader::from_reader(input))
}

fn parse_prices<R: Read>(mut reader: csv::Reader<R>) -> Result<LoadedPrices, LoadError> {
    let headers = reader.headers()?.clone();
    let mut columns_iter = headers.iter();
    if columns_iter.next().map(str::trim) != Some(TIME_COLUMN) {
        return Err(LoadError::MissingTimeColumn);
    }
    let tickers: Vec<Ticker> = columns_iter.map(|h| h.trim().to_string()).collect();
    if tickers.is_empty() {
        return Err(LoadError::NoTickers);
    }

    let mut times = Vec::new();
    let mut prices: Vec<Vec<f64>> = vec![Vec::new(); tickers.len()];
    for (i, record) in reader.records().enumerate() {
        let record = record?;
        let row = i + 1;
        let raw_time = record.get(0).unwrap_or_default();
        times.push(parse_time(raw_time).ok_or_else(|| LoadError::BadTime {
            row,
            value: raw_time.to_string(),
        })?);
        for (col, ticker) in tickers.iter().enumerate() {
            let raw = record.get(col + 1).unwrap_or_default().trim();
            let price = raw
                .parse::<f64>()
                .ok()
                .filter(|p| p.is_finite())
                .ok_or_else(|| LoadError::BadPrice {
                    row,
                    ticker: ticker.clone(),
                    value: raw.to_string(),
                })?;
            prices[col].push(price);
        }
    }

    let columns: BTreeMap<Ticker, Vec<f64>> = tickers.into_iter().zip(prices).collect();
    let dataset_hash = compute_dataset_hash(&times, &columns);
    let table = PriceTable::new(times, columns)?;
    Ok(LoadedPrices {
        table,
        dataset_hash,
    })
}

fn parse_time(raw: &str) -> Option<Timestamp> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Deterministic BLAKE3 hash over the time index and every column in
/// ticker order.
fn compute_dataset_hash(times: &[Timestamp], columns: &BTreeMap<Ticker, Vec<f64>>) -> String {
    let mut hasher = blake3::Hasher::new();
    for t in times {
        hasher.update(&t.timestamp_millis().to_le_bytes());
    }
    for (ticker, prices) in columns {
        hasher.update(ticker.as_bytes());
        for p in prices {
            hasher.update(&p.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}
