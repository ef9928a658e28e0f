//! Account: drives the discrete time-step settlement loop.
//!
//! An account owns its portfolio state and order registry and borrows a
//! broker. Construction validates the simulation window against the broker's
//! data range. After that the caller alternates between placing orders and
//! advancing time with [`Account::update_to`]:
//!
//! 1. Settle every open order whose settlement time is at or before `t`
//! 2. Refresh the portfolio caches to `t`
//! 3. Append one portfolio snapshot for `t`
//!
//! Time never rewinds: `update_to(t)` with `t <= last_time_checked` does
//! nothing.

use crate::broker::{Broker, BrokerError, Quote};
use crate::domain::{OrderId, OrderKind, OrderRequest, Ticker, Timestamp};
use crate::engine::portfolio::{AssetSnapshot, HoldingsSnapshot, PortfolioError, PortfolioState};
use crate::engine::registry::{OrderInfoMap, OrderRegistry, RegistryError};
use crate::ledger::Holdings;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("account window is inverted: start {start} is after end {end}")]
    WindowInverted { start: Timestamp, end: Timestamp },

    #[error("account window [{start}, {end}] exceeds broker data [{first}, {last}]")]
    WindowOutOfRange {
        start: Timestamp,
        end: Timestamp,
        first: Timestamp,
        last: Timestamp,
    },

    #[error("requested range [{from}, {to}] is outside the account window [{start}, {end}]")]
    OutsideWindow {
        from: Timestamp,
        to: Timestamp,
        start: Timestamp,
        end: Timestamp,
    },

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("portfolio error: {0}")]
    Portfolio(#[from] PortfolioError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// Opening conditions for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Annualized, continuously compounded rate on cash and fees.
    pub interest_rate: f64,
    pub initial_cash: f64,
    pub initial_holdings: Holdings,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            interest_rate: 0.0,
            initial_cash: 0.0,
            initial_holdings: Holdings::new(),
        }
    }
}

/// Account for historical trading against a borrowed broker.
pub struct Account<'b, B: Broker + ?Sized> {
    broker: &'b B,
    time0: Timestamp,
    time1: Timestamp,
    times: Vec<Timestamp>,
    portfolio: PortfolioState,
    registry: OrderRegistry,
    total_trades: usize,
    last_time_checked: Option<Timestamp>,
}

impl<'b, B: Broker + ?Sized> Account<'b, B> {
    /// Account with no cash, no holdings and zero interest.
    pub fn new(broker: &'b B, time0: Timestamp, time1: Timestamp) -> Result<Self, AccountError> {
        Self::with_config(broker, time0, time1, &AccountConfig::default())
    }

    pub fn with_config(
        broker: &'b B,
        time0: Timestamp,
        time1: Timestamp,
        config: &AccountConfig,
    ) -> Result<Self, AccountError> {
        if time0 > time1 {
            return Err(AccountError::WindowInverted {
                start: time0,
                end: time1,
            });
        }
        let (first, last) = broker.first_last_times();
        if time0 < first || time1 > last {
            return Err(AccountError::WindowOutOfRange {
                start: time0,
                end: time1,
                first,
                last,
            });
        }

        let times = broker.time_index_between(time0, time1)?;
        let portfolio = PortfolioState::with_initial(
            broker.tickers(),
            time0,
            config.interest_rate,
            config.initial_cash,
            &config.initial_holdings,
        )?;

        Ok(Self {
            broker,
            time0,
            time1,
            times,
            portfolio,
            registry: OrderRegistry::new(),
            total_trades: 0,
            last_time_checked: None,
        })
    }

    // ── Orders ─────────────────────────────────────────────────────────

    /// Place an order. Price, fee and settlement time are fixed now.
    pub fn place_order(&mut self, request: &OrderRequest) -> Result<OrderId, AccountError> {
        Ok(self.registry.place(request, self.broker)?)
    }

    /// Convenience wrapper over [`Self::place_order`].
    pub fn place_historical_order(
        &mut self,
        kind: OrderKind,
        time: Timestamp,
        ticker: impl Into<Ticker>,
        quantity: u64,
        limit: Option<f64>,
    ) -> Result<OrderId, AccountError> {
        let mut request = OrderRequest::new(kind, time, ticker, quantity);
        request.limit = limit;
        self.place_order(&request)
    }

    /// Cancel an open order. Unknown or already settled IDs log a warning and
    /// leave the account untouched. Returns whether an order was cancelled.
    pub fn cancel_order(&mut self, id: OrderId) -> bool {
        match self.registry.cancel(id) {
            Ok(()) => {
                debug!(%id, "order cancelled");
                true
            }
            Err(e) => {
                warn!(%id, error = %e, "cannot cancel order, not a valid open order");
                false
            }
        }
    }

    // ── Time stepping ──────────────────────────────────────────────────

    /// Advance the account to `time`: settle due orders, refresh, snapshot.
    pub fn update_to(&mut self, time: Timestamp) -> Result<(), AccountError> {
        if self.last_time_checked.is_some_and(|last| time <= last) {
            return Ok(());
        }

        for id in self.registry.due_orders(time) {
            self.registry.execute(id, &mut self.portfolio)?;
            self.total_trades += 1;
            debug!(%id, %time, "order settled");
        }

        self.portfolio.refresh_to(time);
        self.portfolio.snapshot(self.broker, time)?;
        self.last_time_checked = Some(time);
        Ok(())
    }

    // ── Broker pass-throughs ───────────────────────────────────────────

    /// Prices for `ticker` on `[from, to]`, which must lie inside the window.
    pub fn price_history(
        &self,
        ticker: &str,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<(Timestamp, f64)>, AccountError> {
        if from < self.time0 || to > self.time1 {
            return Err(AccountError::OutsideWindow {
                from,
                to,
                start: self.time0,
                end: self.time1,
            });
        }
        Ok(self
            .broker
            .future_prices(ticker, from)?
            .into_iter()
            .take_while(|(t, _)| *t <= to)
            .collect())
    }

    pub fn unslipped_price(&self, ticker: &str, time: Timestamp) -> Result<f64, AccountError> {
        Ok(self.broker.unslipped_price(ticker, time)?)
    }

    pub fn buy_price(&self, ticker: &str, time: Timestamp) -> Result<Quote, AccountError> {
        Ok(self.broker.buy_price(ticker, time)?)
    }

    pub fn sell_price(&self, ticker: &str, time: Timestamp) -> Result<Quote, AccountError> {
        Ok(self.broker.sell_price(ticker, time)?)
    }

    // ── Queries ────────────────────────────────────────────────────────

    /// Time-ordered `(time, cash, fees, stock)` rows, one per update.
    pub fn portfolio_history(&self) -> &[AssetSnapshot] {
        self.portfolio.asset_history()
    }

    /// Time-ordered per-ticker holdings, one per update.
    pub fn holdings_history(&self) -> &[HoldingsSnapshot] {
        self.portfolio.stock_history()
    }

    pub fn open_orders_info(&self) -> OrderInfoMap {
        self.registry.open_orders_info()
    }

    pub fn fulfilled_orders_info(&self) -> OrderInfoMap {
        self.registry.fulfilled_orders_info()
    }

    pub fn cancelled_orders_info(&self) -> OrderInfoMap {
        self.registry.cancelled_orders_info()
    }

    pub fn all_orders_info(&self) -> Result<OrderInfoMap, AccountError> {
        Ok(self.registry.all_orders_info()?)
    }

    pub fn is_fulfilled(&self, id: OrderId) -> bool {
        self.registry.is_fulfilled(id)
    }

    pub fn total_trades(&self) -> usize {
        self.total_trades
    }

    pub fn last_time_checked(&self) -> Option<Timestamp> {
        self.last_time_checked
    }

    /// The broker's time index over the account window.
    pub fn times(&self) -> &[Timestamp] {
        &self.times
    }

    pub fn window(&self) -> (Timestamp, Timestamp) {
        (self.time0, self.time1)
    }

    pub fn portfolio(&self) -> &PortfolioState {
        &self.portfolio
    }

    pub fn registry(&self) -> &OrderRegistry {
        &self.registry
    }

    pub fn broker(&self) -> &'b B {
        self.broker
    }
}
