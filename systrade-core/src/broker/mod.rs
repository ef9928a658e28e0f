//! Broker trait and structured error types.
//!
//! The `Broker` trait is the engine's only view of market data. Orders ask it
//! for quotes at placement time, the portfolio asks it for unslipped prices at
//! valuation time, and the caller asks it for the time index that drives the
//! account loop. Implementations must be pure read oracles: the same request
//! always yields the same answer for the duration of a run.

pub mod paper;

pub use paper::{BrokerSettings, PaperBroker, PriceTable};

use crate::domain::{Ticker, Timestamp};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Price, fee and settlement time resolved for one side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub fee: f64,
    pub settlement_time: Timestamp,
}

/// Errors a broker can report.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BrokerError {
    #[error("ticker '{0}' is not available from this broker")]
    UnknownTicker(Ticker),

    #[error("requested time {requested} is later than the last available time {latest}")]
    TimeAfterData {
        requested: Timestamp,
        latest: Timestamp,
    },

    #[error("requested window [{start}, {end}] exceeds available data [{first}, {last}]")]
    WindowOutOfRange {
        start: Timestamp,
        end: Timestamp,
        first: Timestamp,
        last: Timestamp,
    },

    #[error("invalid price table: {0}")]
    InvalidTable(String),

    #[error("invalid broker setting: {0}")]
    InvalidSetting(String),
}

/// Read-only market data and pricing contract consumed by the engine.
pub trait Broker {
    /// First and last times for which the broker has data.
    fn first_last_times(&self) -> (Timestamp, Timestamp);

    /// Every ticker this broker can price.
    fn tickers(&self) -> Vec<Ticker>;

    /// Quote for buying `ticker` when the request is made at `time`.
    fn buy_price(&self, ticker: &str, time: Timestamp) -> Result<Quote, BrokerError>;

    /// Quote for selling `ticker` when the request is made at `time`.
    fn sell_price(&self, ticker: &str, time: Timestamp) -> Result<Quote, BrokerError>;

    /// Reference price with no fee, spread or slippage. Used for valuation only.
    fn unslipped_price(&self, ticker: &str, time: Timestamp) -> Result<f64, BrokerError>;

    /// Time-ordered `(time, price)` points for `ticker` from `from` onwards.
    fn future_prices(
        &self,
        ticker: &str,
        from: Timestamp,
    ) -> Result<Vec<(Timestamp, f64)>, BrokerError>;

    /// Time-ordered index of data points in `[t0, t1]`.
    fn time_index_between(
        &self,
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<Vec<Timestamp>, BrokerError>;
}
