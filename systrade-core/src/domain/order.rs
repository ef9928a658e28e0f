//! Order kinds, placement requests, and the two-phase order lifecycle.
//!
//! An order is created from an [`OrderRequest`], placed against a broker
//! (which fixes its price, fee and settlement time once), and executed against
//! a portfolio exactly once:
//!
//! ```text
//! Created ──place──▶ Placed ──execute──▶ Fulfilled
//!    │
//!    └──place (limit never crossed)──▶ Resting
//! ```
//!
//! A resting limit order has no settlement time and is never due; it stays
//! open until cancelled.

use super::{Ticker, Timestamp};
use crate::broker::{Broker, BrokerError, Quote};
use crate::engine::portfolio::{PortfolioError, PortfolioState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from order construction and lifecycle transitions.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order quantity must be > 0")]
    NonPositiveQuantity,

    #[error("{0} order requires a limit price")]
    MissingLimit(OrderKind),

    #[error("limit price must be a positive finite number, got {0}")]
    InvalidLimit(f64),

    #[error("{0} orders are not yet available")]
    NotImplemented(OrderKind),

    #[error("unknown order type '{0}'")]
    UnknownType(String),

    #[error("order on {ticker} placed at {time_placed} was executed before being placed")]
    NotPlaced {
        ticker: Ticker,
        time_placed: Timestamp,
    },

    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("portfolio error: {0}")]
    Portfolio(#[from] PortfolioError),
}

/// Buy or sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(&self) -> i64 {
        match self {
            OrderSide::Buy => 1,
            OrderSide::Sell => -1,
        }
    }
}

/// What kind of order. Stop and stop-limit kinds are reserved and rejected at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    BuyMarket,
    SellMarket,
    BuyLimit,
    SellLimit,
    BuyStop,
    SellStop,
    BuyStopLimit,
    SellStopLimit,
}

impl OrderKind {
    pub const ALL: [OrderKind; 8] = [
        OrderKind::BuyMarket,
        OrderKind::SellMarket,
        OrderKind::BuyLimit,
        OrderKind::SellLimit,
        OrderKind::BuyStop,
        OrderKind::SellStop,
        OrderKind::BuyStopLimit,
        OrderKind::SellStopLimit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderKind::BuyMarket => "buy_market",
            OrderKind::SellMarket => "sell_market",
            OrderKind::BuyLimit => "buy_limit",
            OrderKind::SellLimit => "sell_limit",
            OrderKind::BuyStop => "buy_stop",
            OrderKind::SellStop => "sell_stop",
            OrderKind::BuyStopLimit => "buy_stop_limit",
            OrderKind::SellStopLimit => "sell_stop_limit",
        }
    }

    pub fn side(&self) -> OrderSide {
        match self {
            OrderKind::BuyMarket
            | OrderKind::BuyLimit
            | OrderKind::BuyStop
            | OrderKind::BuyStopLimit => OrderSide::Buy,
            OrderKind::SellMarket
            | OrderKind::SellLimit
            | OrderKind::SellStop
            | OrderKind::SellStopLimit => OrderSide::Sell,
        }
    }

    /// Whether this kind carries a limit/trigger price.
    pub fn requires_limit(&self) -> bool {
        !matches!(self, OrderKind::BuyMarket | OrderKind::SellMarket)
    }

    /// Whether the engine can price this kind.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            OrderKind::BuyMarket | OrderKind::SellMarket | OrderKind::BuyLimit | OrderKind::SellLimit
        )
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderKind {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "buy_stoplimit" => Ok(OrderKind::BuyStopLimit),
            "sell_stoplimit" => Ok(OrderKind::SellStopLimit),
            _ => OrderKind::ALL
                .into_iter()
                .find(|k| k.as_str() == s)
                .ok_or_else(|| OrderError::UnknownType(s.to_string())),
        }
    }
}

/// A request to place an order, as submitted by a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub time: Timestamp,
    pub ticker: Ticker,
    pub quantity: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<f64>,
}

impl OrderRequest {
    pub fn new(kind: OrderKind, time: Timestamp, ticker: impl Into<Ticker>, quantity: u64) -> Self {
        Self {
            kind,
            time,
            ticker: ticker.into(),
            quantity,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: f64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build a request from a string order type, e.g. `"buy_limit"`.
    pub fn parse(
        kind: &str,
        time: Timestamp,
        ticker: impl Into<Ticker>,
        quantity: u64,
        limit: Option<f64>,
    ) -> Result<Self, OrderError> {
        Ok(Self {
            kind: kind.parse()?,
            time,
            ticker: ticker.into(),
            quantity,
            limit,
        })
    }
}

/// Price, fee and time an order settles at, fixed at placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    pub price: f64,
    pub fee: f64,
    pub time: Timestamp,
}

impl From<Quote> for Settlement {
    fn from(q: Quote) -> Self {
        Self {
            price: q.price,
            fee: q.fee,
            time: q.settlement_time,
        }
    }
}

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Constructed, not yet placed.
    Created,
    /// Limit order whose limit is never crossed in the broker's data.
    Resting,
    /// Price, fee and settlement time resolved; waiting to settle.
    Placed,
    /// Applied to a portfolio. Terminal.
    Fulfilled,
}

/// Public projection of an order, without execution-sensitive fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderInfo {
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub ticker: Ticker,
    pub time_placed: Timestamp,
    pub time_executed: Option<Timestamp>,
}

/// A single buy/sell order.
#[derive(Debug, Clone)]
pub struct Order {
    kind: OrderKind,
    ticker: Ticker,
    quantity: u64,
    time_placed: Timestamp,
    limit: Option<f64>,
    status: OrderStatus,
    settlement: Option<Settlement>,
}

impl Order {
    pub fn new(
        kind: OrderKind,
        time: Timestamp,
        ticker: impl Into<Ticker>,
        quantity: u64,
        limit: Option<f64>,
    ) -> Result<Self, OrderError> {
        if quantity == 0 {
            return Err(OrderError::NonPositiveQuantity);
        }
        if !kind.is_supported() {
            return Err(OrderError::NotImplemented(kind));
        }
        let limit = if kind.requires_limit() {
            let l = limit.ok_or(OrderError::MissingLimit(kind))?;
            if !l.is_finite() || l <= 0.0 {
                return Err(OrderError::InvalidLimit(l));
            }
            Some(l)
        } else {
            None
        };
        Ok(Self {
            kind,
            ticker: ticker.into(),
            quantity,
            time_placed: time,
            limit,
            status: OrderStatus::Created,
            settlement: None,
        })
    }

    pub fn from_request(request: &OrderRequest) -> Result<Self, OrderError> {
        Self::new(
            request.kind,
            request.time,
            request.ticker.clone(),
            request.quantity,
            request.limit,
        )
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Resolve price, fee and settlement time from the broker.
    ///
    /// A broker error leaves the order untouched. Placing a fulfilled order
    /// logs a warning and does nothing.
    pub fn place<B: Broker + ?Sized>(&mut self, broker: &B) -> Result<(), OrderError> {
        if self.status == OrderStatus::Fulfilled {
            warn!(
                kind = %self.kind,
                ticker = %self.ticker,
                "order already executed, ignoring placement"
            );
            return Ok(());
        }

        match self.resolve_quote(broker)? {
            Some(quote) => {
                debug!(
                    kind = %self.kind,
                    ticker = %self.ticker,
                    price = quote.price,
                    fee = quote.fee,
                    settles = %quote.settlement_time,
                    "order placed"
                );
                self.settlement = Some(quote.into());
                self.status = OrderStatus::Placed;
            }
            None => {
                debug!(
                    kind = %self.kind,
                    ticker = %self.ticker,
                    limit = self.limit,
                    "limit never reached in available data, order resting"
                );
                self.settlement = None;
                self.status = OrderStatus::Resting;
            }
        }
        Ok(())
    }

    /// Apply the order to the portfolio. Runs at most once; later calls on a
    /// fulfilled order are no-ops.
    pub fn execute(&mut self, portfolio: &mut PortfolioState) -> Result<(), OrderError> {
        match (self.status, self.settlement) {
            (OrderStatus::Fulfilled, _) => Ok(()),
            (OrderStatus::Placed, Some(s)) => {
                match self.kind.side() {
                    OrderSide::Buy => {
                        portfolio.buy(s.time, &self.ticker, self.quantity, s.price, s.fee)?
                    }
                    OrderSide::Sell => {
                        portfolio.sell(s.time, &self.ticker, self.quantity, s.price, s.fee)?
                    }
                }
                self.status = OrderStatus::Fulfilled;
                Ok(())
            }
            _ => Err(OrderError::NotPlaced {
                ticker: self.ticker.clone(),
                time_placed: self.time_placed,
            }),
        }
    }

    /// Pricing dispatch per kind. `None` means a limit was never crossed.
    fn resolve_quote<B: Broker + ?Sized>(&self, broker: &B) -> Result<Option<Quote>, OrderError> {
        match self.kind {
            OrderKind::BuyMarket => Ok(Some(broker.buy_price(&self.ticker, self.time_placed)?)),
            OrderKind::SellMarket => Ok(Some(broker.sell_price(&self.ticker, self.time_placed)?)),
            OrderKind::BuyLimit => match self.first_crossing(broker, |p, l| p < l)? {
                Some(t) => Ok(Some(broker.buy_price(&self.ticker, t)?)),
                None => Ok(None),
            },
            OrderKind::SellLimit => match self.first_crossing(broker, |p, l| p > l)? {
                Some(t) => Ok(Some(broker.sell_price(&self.ticker, t)?)),
                None => Ok(None),
            },
            kind => Err(OrderError::NotImplemented(kind)),
        }
    }

    /// First time from `time_placed` onwards at which `crosses(price, limit)`.
    fn first_crossing<B, F>(&self, broker: &B, crosses: F) -> Result<Option<Timestamp>, OrderError>
    where
        B: Broker + ?Sized,
        F: Fn(f64, f64) -> bool,
    {
        let Some(limit) = self.limit else {
            return Err(OrderError::MissingLimit(self.kind));
        };
        let prices = broker.future_prices(&self.ticker, self.time_placed)?;
        Ok(prices
            .into_iter()
            .find(|(_, p)| crosses(*p, limit))
            .map(|(t, _)| t))
    }

    // ── Accessors ──────────────────────────────────────────────────────

    pub fn kind(&self) -> OrderKind {
        self.kind
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn time_placed(&self) -> Timestamp {
        self.time_placed
    }

    pub fn limit(&self) -> Option<f64> {
        self.limit
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// Settlement time; `None` until placed (and for resting limit orders).
    pub fn time_executed(&self) -> Option<Timestamp> {
        self.settlement.map(|s| s.time)
    }

    pub fn price_at_execution(&self) -> Option<f64> {
        self.settlement.map(|s| s.price)
    }

    pub fn transaction_fee(&self) -> Option<f64> {
        self.settlement.map(|s| s.fee)
    }

    pub fn is_placed(&self) -> bool {
        matches!(self.status, OrderStatus::Placed | OrderStatus::Fulfilled)
    }

    pub fn is_fulfilled(&self) -> bool {
        self.status == OrderStatus::Fulfilled
    }

    /// Whether the order is placed, unsettled, and due by `time`.
    pub fn is_due(&self, time: Timestamp) -> bool {
        self.status == OrderStatus::Placed && self.time_executed().is_some_and(|t| t <= time)
    }

    pub fn info(&self) -> OrderInfo {
        OrderInfo {
            kind: self.kind,
            ticker: self.ticker.clone(),
            time_placed: self.time_placed,
            time_executed: self.time_executed(),
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} for {} units at {} ({:?})",
            self.kind, self.ticker, self.quantity, self.time_placed, self.status
        )
    }
}
