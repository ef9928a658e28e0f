//! Simulation runner: wires together config, prices, broker and account.
//!
//! Two entry points:
//! - `run_simulation()`: loads prices from the config's CSV, then runs. Used by CLI.
//! - `run_with_broker()`: takes a pre-built broker. Used by sweeps so every
//!   run shares one read-only broker.
//!
//! The loop walks the broker's time index over the account window. At each
//! time `t` it submits every scheduled order with `time <= t` (config order,
//! ties kept stable), then every scheduled cancel with `time <= t`, then
//! calls `update_to(t)`.

use serde::{Deserialize, Serialize};
use systrade_core::broker::{Broker, BrokerError};
use systrade_core::domain::{OrderId, OrderInfo, Timestamp};
use systrade_core::engine::{Account, AccountError, AssetSnapshot, HoldingsSnapshot, Partition};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, RunId, SimulationConfig};
use crate::data_loader::{load_prices, LoadError};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("account error: {0}")]
    Account(#[from] AccountError),
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Final state of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub partition: Partition,
    #[serde(flatten)]
    pub info: OrderInfo,
    pub quantity: u64,
    pub limit: Option<f64>,
    pub price: Option<f64>,
    pub fee: Option<f64>,
}

/// Complete result of a single simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub dataset_hash: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub interest_rate: f64,
    pub total_trades: usize,
    /// Cash + fees + stock at the last snapshot.
    pub final_value: f64,
    pub portfolio_history: Vec<AssetSnapshot>,
    pub holdings_history: Vec<HoldingsSnapshot>,
    pub orders: Vec<OrderRecord>,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl SimulationResult {
    pub fn open_orders(&self) -> impl Iterator<Item = &OrderRecord> {
        self.orders
            .iter()
            .filter(|o| o.partition == Partition::Open)
    }
}

/// Run one simulation from a config, loading prices from its CSV.
pub fn run_simulation(config: &SimulationConfig) -> Result<SimulationResult, RunError> {
    config.validate()?;
    let (broker, dataset_hash) = load_prices(&config.prices)?.into_broker(config.broker.clone())?;
    run_with_broker(config, &broker, &dataset_hash)
}

/// Run one simulation against a pre-built broker without I/O.
///
/// The config's `broker` settings are ignored; the broker is used as given.
pub fn run_with_broker<B: Broker + ?Sized>(
    config: &SimulationConfig,
    broker: &B,
    dataset_hash: &str,
) -> Result<SimulationResult, RunError> {
    let run_id = config.run_id()?;
    let mut account =
        Account::with_config(broker, config.start, config.end, &config.account_config())?;

    let mut order_queue: Vec<usize> = (0..config.orders.len()).collect();
    order_queue.sort_by_key(|&i| config.orders[i].time);
    let mut cancel_queue: Vec<usize> = (0..config.cancels.len()).collect();
    cancel_queue.sort_by_key(|&i| config.cancels[i].time);

    let mut placed: Vec<Option<OrderId>> = vec![None; config.orders.len()];
    let mut next_order = 0;
    let mut next_cancel = 0;

    let times = account.times().to_vec();
    for t in times {
        while let Some(&i) = order_queue.get(next_order) {
            if config.orders[i].time > t {
                break;
            }
            placed[i] = Some(account.place_order(&config.orders[i])?);
            next_order += 1;
        }
        while let Some(&i) = cancel_queue.get(next_cancel) {
            let cancel = &config.cancels[i];
            if cancel.time > t {
                break;
            }
            match placed[cancel.order] {
                Some(id) => {
                    account.cancel_order(id);
                }
                None => warn!(
                    order = cancel.order,
                    time = %cancel.time,
                    "scheduled cancel precedes its order, skipping"
                ),
            }
            next_cancel += 1;
        }
        account.update_to(t)?;
    }

    let unsubmitted = order_queue.len() - next_order;
    if unsubmitted > 0 {
        warn!(count = unsubmitted, end = %config.end, "scheduled orders fall after the window end");
    }

    let final_value = account
        .portfolio_history()
        .last()
        .map(AssetSnapshot::total)
        .unwrap_or(0.0);

    info!(
        run_id = %run_id,
        steps = account.portfolio_history().len(),
        trades = account.total_trades(),
        final_value,
        "simulation complete"
    );

    Ok(SimulationResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        dataset_hash: dataset_hash.to_string(),
        start: config.start,
        end: config.end,
        interest_rate: config.interest_rate,
        total_trades: account.total_trades(),
        final_value,
        portfolio_history: account.portfolio_history().to_vec(),
        holdings_history: account.holdings_history().to_vec(),
        orders: order_records(&account),
    })
}

fn order_records<B: Broker + ?Sized>(account: &Account<'_, B>) -> Vec<OrderRecord> {
    let partitions = [
        (Partition::Open, account.open_orders_info()),
        (Partition::Fulfilled, account.fulfilled_orders_info()),
        (Partition::Cancelled, account.cancelled_orders_info()),
    ];
    let mut records: Vec<OrderRecord> = partitions
        .into_iter()
        .flat_map(|(partition, infos)| {
            infos.into_iter().map(move |(id, info)| (partition, id, info))
        })
        .filter_map(|(partition, id, info)| {
            let order = account.registry().get(id)?;
            Some(OrderRecord {
                id,
                partition,
                info,
                quantity: order.quantity(),
                limit: order.limit(),
                price: order.price_at_execution(),
                fee: order.transaction_fee(),
            })
        })
        .collect();
    records.sort_by_key(|r| r.id);
    records
}
