//! Append-only per-instrument holdings ledger.
//!
//! Every mutation appends one `(time, ticker, quantity)` row; rows are never
//! coalesced or edited. Holdings at time T are the per-ticker sum of all rows
//! with `time <= T`. The ticker universe is fixed at construction.

use crate::domain::{Ticker, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Per-ticker share counts.
pub type Holdings = BTreeMap<Ticker, i64>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ticker '{0}' was not registered with this ledger")]
    UnknownTicker(Ticker),

    #[error("quantity {0} does not fit in a signed ledger adjustment")]
    QuantityOverflow(u64),
}

/// One ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub time: Timestamp,
    pub ticker: Ticker,
    pub quantity: i64,
}

/// Holdings ledger over a fixed set of tickers.
#[derive(Debug, Clone)]
pub struct Ledger {
    time0: Timestamp,
    tickers: BTreeSet<Ticker>,
    adjustments: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn new<I, S>(tickers: I, time0: Timestamp) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Ticker>,
    {
        Self {
            time0,
            tickers: tickers.into_iter().map(Into::into).collect(),
            adjustments: Vec::new(),
        }
    }

    /// Ledger seeded with opening holdings, booked as rows at `time0`.
    ///
    /// Tickers registered but absent from `initial` start at zero.
    pub fn with_initial<I, S>(
        tickers: I,
        time0: Timestamp,
        initial: &Holdings,
    ) -> Result<Self, LedgerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Ticker>,
    {
        let mut ledger = Self::new(tickers, time0);
        for (ticker, &quantity) in initial {
            ledger.add(time0, ticker, quantity)?;
        }
        Ok(ledger)
    }

    /// Append one adjustment.
    pub fn add(&mut self, time: Timestamp, ticker: &str, quantity: i64) -> Result<(), LedgerError> {
        self.check_ticker(ticker)?;
        self.adjustments.push(LedgerEntry {
            time,
            ticker: ticker.to_string(),
            quantity,
        });
        Ok(())
    }

    pub fn check_ticker(&self, ticker: &str) -> Result<(), LedgerError> {
        if self.tickers.contains(ticker) {
            Ok(())
        } else {
            Err(LedgerError::UnknownTicker(ticker.to_string()))
        }
    }

    /// Holdings for every registered ticker as of `time`.
    pub fn holdings_at(&self, time: Timestamp) -> Holdings {
        let mut holdings: Holdings = self.tickers.iter().map(|t| (t.clone(), 0)).collect();
        for entry in self.adjustments.iter().filter(|e| e.time <= time) {
            if let Some(q) = holdings.get_mut(&entry.ticker) {
                *q += entry.quantity;
            }
        }
        holdings
    }

    /// Holding of a single ticker as of `time`.
    pub fn holding_at(&self, time: Timestamp, ticker: &str) -> Result<i64, LedgerError> {
        self.check_ticker(ticker)?;
        Ok(self
            .adjustments
            .iter()
            .filter(|e| e.time <= time && e.ticker == ticker)
            .map(|e| e.quantity)
            .sum())
    }

    pub fn time0(&self) -> Timestamp {
        self.time0
    }

    pub fn tickers(&self) -> impl Iterator<Item = &Ticker> {
        self.tickers.iter()
    }

    pub fn adjustments(&self) -> &[LedgerEntry] {
        &self.adjustments
    }

    pub fn len(&self) -> usize {
        self.adjustments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjustments.is_empty()
    }
}
