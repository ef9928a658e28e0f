//! Portfolio state: one holdings ledger plus cash and fee accounts.
//!
//! Trades only append: a buy or sell adds one ledger row, one cash flow and
//! one fee flow. Reads go through caches that `refresh_to` pulls forward:
//! - `current_stock`: holdings as of the last refresh
//! - the cash and fee accounts' fast-path views
//!
//! Valuation multiplies the *cached* holdings by the broker's unslipped price.
//! If the cache was not refreshed since the last trade, valuation uses the old
//! quantities. The account loop always refreshes before it snapshots.

use crate::broker::{Broker, BrokerError};
use crate::domain::{Ticker, Timestamp};
use crate::ledger::{CashAccount, CashError, Holdings, Ledger, LedgerError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("cash error: {0}")]
    Cash(#[from] CashError),

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("trade price and fee must be finite, got price {price} fee {fee}")]
    NonFiniteTrade { price: f64, fee: f64 },
}

/// Cash, fees and stock value at one time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSnapshot {
    pub time: Timestamp,
    pub cash: f64,
    pub fees: f64,
    pub stock: f64,
}

impl AssetSnapshot {
    /// Cash + fees + stock value.
    pub fn total(&self) -> f64 {
        self.cash + self.fees + self.stock
    }
}

/// Per-ticker holdings at one time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingsSnapshot {
    pub time: Timestamp,
    pub holdings: Holdings,
}

/// Holdings ledger, cash and fee accounts, and their snapshot history.
#[derive(Debug, Clone)]
pub struct PortfolioState {
    stocks: Ledger,
    cash: CashAccount,
    fees: CashAccount,
    current_stock: Holdings,
    asset_history: Vec<AssetSnapshot>,
    stock_history: Vec<HoldingsSnapshot>,
}

impl PortfolioState {
    /// Empty portfolio: no shares, no cash.
    pub fn new<I, S>(tickers: I, time0: Timestamp, interest_rate: f64) -> Result<Self, PortfolioError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Ticker>,
    {
        Self::with_initial(tickers, time0, interest_rate, 0.0, &Holdings::new())
    }

    /// Portfolio opening with `initial_cash` and `initial_holdings` at `time0`.
    pub fn with_initial<I, S>(
        tickers: I,
        time0: Timestamp,
        interest_rate: f64,
        initial_cash: f64,
        initial_holdings: &Holdings,
    ) -> Result<Self, PortfolioError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Ticker>,
    {
        let stocks = Ledger::with_initial(tickers, time0, initial_holdings)?;
        let current_stock = stocks.holdings_at(time0);
        Ok(Self {
            stocks,
            cash: CashAccount::new(interest_rate, time0, initial_cash)?,
            fees: CashAccount::new(interest_rate, time0, 0.0)?,
            current_stock,
            asset_history: Vec::new(),
            stock_history: Vec::new(),
        })
    }

    // ── Trades ─────────────────────────────────────────────────────────

    pub fn buy(
        &mut self,
        time: Timestamp,
        ticker: &str,
        quantity: u64,
        price: f64,
        fee: f64,
    ) -> Result<(), PortfolioError> {
        self.trade(time, ticker, quantity, 1, price, fee)
    }

    pub fn sell(
        &mut self,
        time: Timestamp,
        ticker: &str,
        quantity: u64,
        price: f64,
        fee: f64,
    ) -> Result<(), PortfolioError> {
        self.trade(time, ticker, quantity, -1, price, fee)
    }

    /// Validate everything first so the three appends land together or not at all.
    fn trade(
        &mut self,
        time: Timestamp,
        ticker: &str,
        quantity: u64,
        sign: i64,
        price: f64,
        fee: f64,
    ) -> Result<(), PortfolioError> {
        self.stocks.check_ticker(ticker)?;
        self.cash.check_time(time)?;
        if !price.is_finite() || !fee.is_finite() {
            return Err(PortfolioError::NonFiniteTrade { price, fee });
        }
        let shares = i64::try_from(quantity).map_err(|_| LedgerError::QuantityOverflow(quantity))?;

        self.stocks.add(time, ticker, sign * shares)?;
        self.cash.add(-(sign as f64) * price * quantity as f64, time)?;
        self.fees.add(-fee, time)?;
        Ok(())
    }

    // ── Caches ─────────────────────────────────────────────────────────

    /// Pull holdings, cash and fee caches forward to `time`.
    pub fn refresh_to(&mut self, time: Timestamp) {
        self.refresh_stock_to(time);
        self.refresh_cash_to(time);
        self.refresh_fees_to(time);
    }

    pub fn refresh_stock_to(&mut self, time: Timestamp) {
        self.current_stock = self.stocks.holdings_at(time);
    }

    pub fn refresh_cash_to(&mut self, time: Timestamp) {
        self.cash.refresh_view(time);
    }

    pub fn refresh_fees_to(&mut self, time: Timestamp) {
        self.fees.refresh_view(time);
    }

    /// Holdings as of the last refresh.
    pub fn current_stock(&self) -> &Holdings {
        &self.current_stock
    }

    /// Cash balance at `time` from the refreshed view.
    pub fn cash_at(&self, time: Timestamp) -> Result<f64, CashError> {
        self.cash.balance_fast(time)
    }

    /// Accumulated (negative) fees at `time` from the refreshed view.
    pub fn fees_at(&self, time: Timestamp) -> Result<f64, CashError> {
        self.fees.balance_fast(time)
    }

    // ── Valuation ──────────────────────────────────────────────────────

    /// Market value of the cached holdings at `time`, at unslipped prices.
    pub fn valuation_at<B: Broker + ?Sized>(
        &self,
        broker: &B,
        time: Timestamp,
    ) -> Result<f64, BrokerError> {
        let mut value = 0.0;
        for (ticker, &quantity) in &self.current_stock {
            if quantity != 0 {
                value += quantity as f64 * broker.unslipped_price(ticker, time)?;
            }
        }
        Ok(value)
    }

    /// Append one row to the asset history and one to the stock history.
    pub fn snapshot<B: Broker + ?Sized>(
        &mut self,
        broker: &B,
        time: Timestamp,
    ) -> Result<(), PortfolioError> {
        let snapshot = AssetSnapshot {
            time,
            cash: self.cash_at(time)?,
            fees: self.fees_at(time)?,
            stock: self.valuation_at(broker, time)?,
        };
        self.asset_history.push(snapshot);
        self.stock_history.push(HoldingsSnapshot {
            time,
            holdings: self.current_stock.clone(),
        });
        Ok(())
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn asset_history(&self) -> &[AssetSnapshot] {
        &self.asset_history
    }

    pub fn stock_history(&self) -> &[HoldingsSnapshot] {
        &self.stock_history
    }

    pub fn stocks(&self) -> &Ledger {
        &self.stocks
    }

    pub fn cash_account(&self) -> &CashAccount {
        &self.cash
    }

    pub fn fee_account(&self) -> &CashAccount {
        &self.fees
    }
}
