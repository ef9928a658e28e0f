//! Integration tests for the account loop against a hand-built broker.
//!
//! Tests:
//! 1. Single market buy: cash, fees and holdings after settlement
//! 2. Cancelling an unknown ID leaves the registry untouched
//! 3. Orders due at the same time settle before the snapshot
//! 4. Delayed settlement: orders wait for their settlement time
//! 5. Limit orders settle at the first crossing or rest forever
//! 6. Valuation uses unslipped prices

use chrono::{Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use systrade_core::broker::{Broker, BrokerError, BrokerSettings, PaperBroker, PriceTable, Quote};
use systrade_core::domain::{OrderId, OrderKind, OrderRequest, Ticker, Timestamp};
use systrade_core::engine::{Account, AccountConfig, Partition};

fn t(minute: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2019, 7, 10, 9, 30 + minute, 0).unwrap()
}

/// Flat $10 price, $2 fee, immediate settlement, data over t(0)..=t(10).
struct FlatBroker;

impl Broker for FlatBroker {
    fn first_last_times(&self) -> (Timestamp, Timestamp) {
        (t(0), t(10))
    }

    fn tickers(&self) -> Vec<Ticker> {
        vec!["tick0".into(), "tick1".into()]
    }

    fn buy_price(&self, ticker: &str, time: Timestamp) -> Result<Quote, BrokerError> {
        self.quote(ticker, time)
    }

    fn sell_price(&self, ticker: &str, time: Timestamp) -> Result<Quote, BrokerError> {
        self.quote(ticker, time)
    }

    fn unslipped_price(&self, ticker: &str, time: Timestamp) -> Result<f64, BrokerError> {
        Ok(self.quote(ticker, time)?.price)
    }

    fn future_prices(
        &self,
        ticker: &str,
        from: Timestamp,
    ) -> Result<Vec<(Timestamp, f64)>, BrokerError> {
        self.check(ticker)?;
        Ok(self
            .time_index_between(from, t(10))?
            .into_iter()
            .map(|time| (time, 10.0))
            .collect())
    }

    fn time_index_between(
        &self,
        t0: Timestamp,
        t1: Timestamp,
    ) -> Result<Vec<Timestamp>, BrokerError> {
        Ok((0..=10).map(t).filter(|x| *x >= t0 && *x <= t1).collect())
    }
}

impl FlatBroker {
    fn check(&self, ticker: &str) -> Result<(), BrokerError> {
        if self.tickers().iter().any(|x| x == ticker) {
            Ok(())
        } else {
            Err(BrokerError::UnknownTicker(ticker.into()))
        }
    }

    fn quote(&self, ticker: &str, time: Timestamp) -> Result<Quote, BrokerError> {
        self.check(ticker)?;
        Ok(Quote {
            price: 10.0,
            fee: 2.0,
            settlement_time: time,
        })
    }
}

/// tick0 rises 0..=10, tick1 falls 10..=0, with the given broker settings.
fn paper_broker(settings: BrokerSettings) -> PaperBroker {
    let times: Vec<Timestamp> = (0..=10).map(t).collect();
    let mut columns = BTreeMap::new();
    columns.insert("tick0".to_string(), (0..=10).map(|i| i as f64).collect());
    columns.insert(
        "tick1".to_string(),
        (0..=10).rev().map(|i| i as f64).collect(),
    );
    PaperBroker::new(PriceTable::new(times, columns).unwrap(), settings).unwrap()
}

#[test]
fn single_market_buy_settles_at_quote() {
    let broker = FlatBroker;
    let mut acct = Account::new(&broker, t(0), t(10)).unwrap();
    let id = acct
        .place_order(&OrderRequest::new(OrderKind::BuyMarket, t(0), "tick0", 1))
        .unwrap();
    acct.update_to(t(0)).unwrap();

    assert_eq!(acct.total_trades(), 1);
    assert!(acct.is_fulfilled(id));
    let row = &acct.portfolio_history()[0];
    assert_eq!(row.cash, -10.0);
    assert_eq!(row.fees, -2.0);
    assert_eq!(row.stock, 10.0);
    assert_eq!(acct.holdings_history()[0].holdings["tick0"], 1);
    assert_eq!(acct.holdings_history()[0].holdings["tick1"], 0);
}

#[test]
fn cancel_unknown_id_leaves_registry_unchanged() {
    let broker = FlatBroker;
    let mut acct = Account::new(&broker, t(0), t(10)).unwrap();
    acct.place_order(&OrderRequest::new(OrderKind::BuyMarket, t(1), "tick0", 1))
        .unwrap();
    let open = acct.open_orders_info();
    let cancelled = acct.cancelled_orders_info();

    assert!(!acct.cancel_order(OrderId(42)));

    assert_eq!(acct.open_orders_info(), open);
    assert_eq!(acct.cancelled_orders_info(), cancelled);
    assert!(acct.fulfilled_orders_info().is_empty());
}

#[test]
fn orders_due_together_settle_before_snapshot() {
    let broker = FlatBroker;
    let mut acct = Account::new(&broker, t(0), t(10)).unwrap();
    acct.place_order(&OrderRequest::new(OrderKind::BuyMarket, t(2), "tick0", 3))
        .unwrap();
    acct.place_order(&OrderRequest::new(OrderKind::SellMarket, t(2), "tick1", 1))
        .unwrap();
    acct.update_to(t(2)).unwrap();

    assert_eq!(acct.total_trades(), 2);
    let row = &acct.portfolio_history()[0];
    // -30 for the buy, +10 for the sell
    assert_eq!(row.cash, -20.0);
    assert_eq!(row.fees, -4.0);
    assert_eq!(row.stock, 20.0);
    let holdings = &acct.holdings_history()[0].holdings;
    assert_eq!((holdings["tick0"], holdings["tick1"]), (3, -1));
}

#[test]
fn replaying_time_settles_nothing_twice() {
    let broker = FlatBroker;
    let mut acct = Account::new(&broker, t(0), t(10)).unwrap();
    acct.place_order(&OrderRequest::new(OrderKind::BuyMarket, t(1), "tick0", 1))
        .unwrap();
    for minute in [1, 1, 0, 3, 2, 3] {
        acct.update_to(t(minute)).unwrap();
    }
    assert_eq!(acct.total_trades(), 1);
    assert_eq!(acct.portfolio_history().len(), 2);
    assert_eq!(acct.portfolio().stocks().len(), 1);
}

#[test]
fn slippage_delays_settlement() {
    let broker = paper_broker(BrokerSettings {
        slippage_secs: 150,
        ..BrokerSettings::default()
    });
    let mut acct = Account::new(&broker, t(0), t(10)).unwrap();
    let id = acct
        .place_order(&OrderRequest::new(OrderKind::BuyMarket, t(1), "tick0", 2))
        .unwrap();
    // 09:31 + 150s snaps forward to 09:34
    assert_eq!(acct.open_orders_info()[&id].time_executed, Some(t(4)));

    acct.update_to(t(3)).unwrap();
    assert_eq!(acct.total_trades(), 0);
    acct.update_to(t(4)).unwrap();
    assert_eq!(acct.total_trades(), 1);
    let row = acct.portfolio_history().last().unwrap();
    assert_eq!(row.cash, -8.0);
    assert_eq!(row.stock, 8.0);
}

#[test]
fn limit_orders_settle_at_first_crossing() {
    let broker = paper_broker(BrokerSettings::default());
    let mut acct = Account::new(&broker, t(0), t(10)).unwrap();
    let sell = acct
        .place_order(
            &OrderRequest::new(OrderKind::SellLimit, t(0), "tick0", 1).with_limit(6.5),
        )
        .unwrap();
    let buy = acct
        .place_order(&OrderRequest::new(OrderKind::BuyLimit, t(0), "tick1", 1).with_limit(2.5))
        .unwrap();
    let never = acct
        .place_order(
            &OrderRequest::new(OrderKind::SellLimit, t(0), "tick1", 1).with_limit(50.0),
        )
        .unwrap();

    assert_eq!(acct.open_orders_info()[&sell].time_executed, Some(t(7)));
    assert_eq!(acct.open_orders_info()[&buy].time_executed, Some(t(8)));
    assert_eq!(acct.open_orders_info()[&never].time_executed, None);

    acct.update_to(t(10)).unwrap();
    assert!(acct.is_fulfilled(sell));
    assert!(acct.is_fulfilled(buy));
    assert_eq!(acct.registry().partition_of(never), Some(Partition::Open));
    assert!(acct.cancel_order(never));
}

#[test]
fn valuation_ignores_spread() {
    let broker = paper_broker(BrokerSettings {
        spread_pct: 10.0,
        transaction_cost: 1.5,
        ..BrokerSettings::default()
    });
    let mut acct = Account::new(&broker, t(0), t(10)).unwrap();
    acct.place_order(&OrderRequest::new(OrderKind::BuyMarket, t(2), "tick0", 10))
        .unwrap();
    acct.update_to(t(2)).unwrap();
    let row = &acct.portfolio_history()[0];
    // buy at 2 * 1.05
    assert!((row.cash + 21.0).abs() < 1e-9);
    assert_eq!(row.fees, -1.5);
    assert_eq!(row.stock, 20.0);
}

#[test]
fn interest_accrues_on_cash() {
    let broker = paper_broker(BrokerSettings::default());
    let config = AccountConfig {
        interest_rate: 0.05,
        initial_cash: 1000.0,
        ..AccountConfig::default()
    };
    let mut acct = Account::with_config(&broker, t(0), t(10), &config).unwrap();
    acct.update_to(t(10)).unwrap();
    let years = Duration::minutes(10).num_seconds() as f64 / (3600.0 * 24.0 * 365.0);
    let expected = 1000.0 * (0.05 * years).exp();
    assert!((acct.portfolio_history()[0].cash - expected).abs() < 1e-9);
}

#[test]
fn all_orders_info_never_conflicts() {
    let broker = FlatBroker;
    let mut acct = Account::new(&broker, t(0), t(10)).unwrap();
    let a = acct
        .place_order(&OrderRequest::new(OrderKind::BuyMarket, t(1), "tick0", 1))
        .unwrap();
    let b = acct
        .place_order(&OrderRequest::new(OrderKind::BuyMarket, t(5), "tick0", 1))
        .unwrap();
    let c = acct
        .place_order(&OrderRequest::new(OrderKind::SellMarket, t(9), "tick1", 1))
        .unwrap();
    acct.update_to(t(2)).unwrap();
    acct.cancel_order(b);
    let all = acct.all_orders_info().unwrap();
    assert_eq!(all.keys().copied().collect::<Vec<_>>(), vec![a, b, c]);
}

#[test]
fn orders_for_unknown_tickers_are_rejected() {
    let broker = FlatBroker;
    let mut acct = Account::new(&broker, t(0), t(10)).unwrap();
    assert!(acct
        .place_order(&OrderRequest::new(OrderKind::BuyMarket, t(1), "tick9", 1))
        .is_err());
    assert!(acct.open_orders_info().is_empty());
}
