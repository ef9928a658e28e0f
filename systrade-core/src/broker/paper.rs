//! In-memory paper broker over a historical price table.
//!
//! Prices live in a [`PriceTable`]: one strictly increasing time index and one
//! price column per ticker. Requests at times between rows snap forward to the
//! next available row. Buy and sell quotes apply, in order:
//! 1. Slippage: the request time is delayed by a fixed duration
//! 2. Spread: buys pay `p * (1 + s/200)`, sells receive `p * (1 - s/200)`
//! 3. A flat transaction fee per trade

use super::{Broker, BrokerError, Quote};
use crate::domain::{Ticker, Timestamp};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Time-indexed price columns, one per ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTable {
    times: Vec<Timestamp>,
    columns: BTreeMap<Ticker, Vec<f64>>,
}

impl PriceTable {
    /// Build a table, checking that times strictly increase and every column
    /// has one finite price per time.
    pub fn new(
        times: Vec<Timestamp>,
        columns: BTreeMap<Ticker, Vec<f64>>,
    ) -> Result<Self, BrokerError> {
        if times.is_empty() {
            return Err(BrokerError::InvalidTable("time index is empty".into()));
        }
        if let Some(w) = times.windows(2).find(|w| w[0] >= w[1]) {
            return Err(BrokerError::InvalidTable(format!(
                "time index is not strictly increasing at {}",
                w[1]
            )));
        }
        for (ticker, prices) in &columns {
            if prices.len() != times.len() {
                return Err(BrokerError::InvalidTable(format!(
                    "column '{ticker}' has {} prices for {} times",
                    prices.len(),
                    times.len()
                )));
            }
            if let Some((i, p)) = prices.iter().enumerate().find(|(_, p)| !p.is_finite()) {
                return Err(BrokerError::InvalidTable(format!(
                    "column '{ticker}' has non-finite price {p} at {}",
                    times[i]
                )));
            }
        }
        Ok(Self { times, columns })
    }

    pub fn times(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn tickers(&self) -> impl Iterator<Item = &Ticker> {
        self.columns.keys()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    fn column(&self, ticker: &str) -> Result<&[f64], BrokerError> {
        self.columns
            .get(ticker)
            .map(Vec::as_slice)
            .ok_or_else(|| BrokerError::UnknownTicker(ticker.to_string()))
    }

    /// Index of the first row at or after `time`.
    fn next_index(&self, time: Timestamp) -> Result<usize, BrokerError> {
        let idx = self.times.partition_point(|t| *t < time);
        if idx == self.times.len() {
            return Err(BrokerError::TimeAfterData {
                requested: time,
                latest: self.times[self.times.len() - 1],
            });
        }
        Ok(idx)
    }
}

/// Friction settings for a [`PaperBroker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Delay between an order request and the price it executes at.
    pub slippage_secs: i64,
    /// Flat fee charged per trade.
    pub transaction_cost: f64,
    /// Full bid/ask spread as a percentage of price, on [0, 100].
    pub spread_pct: f64,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            slippage_secs: 0,
            transaction_cost: 0.0,
            spread_pct: 0.0,
        }
    }
}

impl BrokerSettings {
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.slippage_secs < 0 {
            return Err(BrokerError::InvalidSetting(format!(
                "slippage_secs cannot be negative, got {}",
                self.slippage_secs
            )));
        }
        self.slippage()?;
        if !self.transaction_cost.is_finite() || self.transaction_cost < 0.0 {
            return Err(BrokerError::InvalidSetting(format!(
                "transaction_cost must be >= 0, got {}",
                self.transaction_cost
            )));
        }
        if !(0.0..=100.0).contains(&self.spread_pct) {
            return Err(BrokerError::InvalidSetting(format!(
                "spread_pct must be on [0, 100], got {}",
                self.spread_pct
            )));
        }
        Ok(())
    }

    pub fn slippage(&self) -> Result<Duration, BrokerError> {
        Duration::try_seconds(self.slippage_secs).ok_or_else(|| {
            BrokerError::InvalidSetting(format!(
                "slippage_secs {} is out of range",
                self.slippage_secs
            ))
        })
    }
}

/// Paper trading broker backed by a [`PriceTable`].
#[derive(Debug, Clone)]
pub struct PaperBroker {
    table: PriceTable,
    settings: BrokerSettings,
}

impl PaperBroker {
    pub fn new(table: PriceTable, settings: BrokerSettings) -> Result<Self, BrokerError> {
        settings.validate()?;
        Ok(Self { table, settings })
    }

    /// Frictionless broker: no slippage, fee or spread.
    pub fn frictionless(table: PriceTable) -> Self {
        Self {
            table,
            settings: BrokerSettings::default(),
        }
    }

    pub fn settings(&self) -> &BrokerSettings {
        &self.settings
    }

    pub fn table(&self) -> &PriceTable {
        &self.table
    }

    /// First available time at or after `time`.
    pub fn next_extant_time(&self, time: Timestamp) -> Result<Timestamp, BrokerError> {
        let idx = self.table.next_index(time)?;
        Ok(self.table.times[idx])
    }

    /// Prices for `ticker` on `[from, to]`.
    pub fn prices_between(
        &self,
        ticker: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<(Timestamp, f64)>, BrokerError> {
        let column = self.table.column(ticker)?;
        Ok(self
            .table
            .times
            .iter()
            .zip(column)
            .filter(|(t, _)| **t >= from && **t <= to)
            .map(|(t, p)| (*t, *p))
            .collect())
    }

    /// Slipped mid price, the fee, and the time the price was taken from.
    fn slipped_price(&self, ticker: &str, time: Timestamp) -> Result<Quote, BrokerError> {
        let column = self.table.column(ticker)?;
        let slipped = time
            .checked_add_signed(self.settings.slippage()?)
            .ok_or_else(|| BrokerError::TimeAfterData {
                requested: time,
                latest: self.table.times[self.table.times.len() - 1],
            })?;
        let idx = self.table.next_index(slipped)?;
        Ok(Quote {
            price: column[idx],
            fee: self.settings.transaction_cost,
            settlement_time: self.table.times[idx],
        })
    }

    fn half_spread(&self) -> f64 {
        self.settings.spread_pct / 200.0
    }
}

impl Broker for PaperBroker {
    fn first_last_times(&self) -> (Timestamp, Timestamp) {
        let times = self.table.times();
        (times[0], times[times.len() - 1])
    }

    fn tickers(&self) -> Vec<Ticker> {
        self.table.tickers().cloned().collect()
    }

    fn buy_price(&self, ticker: &str, time: Timestamp) -> Result<Quote, BrokerError> {
        let mut quote = self.slipped_price(ticker, time)?;
        quote.price *= 1.0 + self.half_spread();
        Ok(quote)
    }

    fn sell_price(&self, ticker: &str, time: Timestamp) -> Result<Quote, BrokerError> {
        let mut quote = self.slipped_price(ticker, time)?;
        quote.price *= 1.0 - self.half_spread();
        Ok(quote)
    }

    fn unslipped_price(&self, ticker: &str, time: Timestamp) -> Result<f64, BrokerError> {
        let column = self.table.column(ticker)?;
        let idx = self.table.next_index(time)?;
        Ok(column[idx])
    }

    fn future_prices(
        &self,
        ticker: &str,
        from: Timestamp,
    ) -> Result<Vec<(Timestamp, f64)>, BrokerError> {
        let column = self.table.column(ticker)?;
        let start = self.table.times.partition_point(|t| *t < from);
        Ok(self.table.times[start..]
            .iter()
            .zip(&column[start..])
            .map(|(t, p)| (*t, *p))
            .collect())
    }

    fn time_index_between(
        &self,
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<Vec<Timestamp>, BrokerError> {
        let (first, last) = self.first_last_times();
        if t0 < first || t1 > last {
            return Err(BrokerError::WindowOutOfRange {
                start: t0,
                end: t1,
                first,
                last,
            });
        }
        Ok(self
            .table
            .times
            .iter()
            .copied()
            .filter(|t| *t >= t0 && *t <= t1)
            .collect())
    }
}
