//! Order registry: owns every order of one account, by ID.
//!
//! Each order lives in exactly one of three partitions:
//! - open: placed (or resting), not yet settled
//! - fulfilled: settled against the portfolio
//! - cancelled: withdrawn before settlement
//!
//! Orders only ever move open → fulfilled or open → cancelled. IDs come from a
//! per-registry sequence starting at 1 and are never reused. Iteration over a
//! partition follows ID order, which is also placement order.

use crate::broker::Broker;
use crate::domain::{IdGen, Order, OrderError, OrderId, OrderInfo, OrderRequest, Timestamp};
use crate::engine::portfolio::PortfolioState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Read-only view of orders keyed by ID.
pub type OrderInfoMap = BTreeMap<OrderId, OrderInfo>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("order {0} not found among open orders")]
    NotFound(OrderId),

    #[error("id conflict on merge, the following order ids clash: {0:?}")]
    IdConflict(Vec<OrderId>),

    #[error("order error: {0}")]
    Order(#[from] OrderError),
}

/// Which partition an order is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    Open,
    Fulfilled,
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct OrderRegistry {
    open: BTreeMap<OrderId, Order>,
    fulfilled: BTreeMap<OrderId, Order>,
    cancelled: BTreeMap<OrderId, Order>,
    ids: IdGen,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Build an order from the request, place it with the broker, and file it
    /// as open. Returns the new order's ID.
    pub fn place<B: Broker + ?Sized>(
        &mut self,
        request: &OrderRequest,
        broker: &B,
    ) -> Result<OrderId, RegistryError> {
        let id = self.ids.next_order_id();
        let mut order = Order::from_request(request)?;
        order.place(broker)?;
        debug!(%id, order = %order, "order filed as open");
        self.open.insert(id, order);
        Ok(id)
    }

    /// Move an open order to cancelled.
    pub fn cancel(&mut self, id: OrderId) -> Result<(), RegistryError> {
        let order = self.open.remove(&id).ok_or(RegistryError::NotFound(id))?;
        self.cancelled.insert(id, order);
        Ok(())
    }

    /// Settle an open order against the portfolio and move it to fulfilled.
    ///
    /// If execution fails the order stays open.
    pub fn execute(&mut self, id: OrderId, portfolio: &mut PortfolioState) -> Result<(), RegistryError> {
        let order = self.open.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        order.execute(portfolio)?;
        if let Some(order) = self.open.remove(&id) {
            self.fulfilled.insert(id, order);
        }
        Ok(())
    }

    /// IDs of open orders whose settlement time is at or before `time`, in ID order.
    pub fn due_orders(&self, time: Timestamp) -> Vec<OrderId> {
        self.open
            .iter()
            .filter(|(_, o)| o.is_due(time))
            .map(|(id, _)| *id)
            .collect()
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.open
            .get(&id)
            .or_else(|| self.fulfilled.get(&id))
            .or_else(|| self.cancelled.get(&id))
    }

    pub fn partition_of(&self, id: OrderId) -> Option<Partition> {
        if self.open.contains_key(&id) {
            Some(Partition::Open)
        } else if self.fulfilled.contains_key(&id) {
            Some(Partition::Fulfilled)
        } else if self.cancelled.contains_key(&id) {
            Some(Partition::Cancelled)
        } else {
            None
        }
    }

    pub fn is_fulfilled(&self, id: OrderId) -> bool {
        self.fulfilled.contains_key(&id)
    }

    pub fn open_orders_info(&self) -> OrderInfoMap {
        Self::infos(&self.open)
    }

    pub fn fulfilled_orders_info(&self) -> OrderInfoMap {
        Self::infos(&self.fulfilled)
    }

    pub fn cancelled_orders_info(&self) -> OrderInfoMap {
        Self::infos(&self.cancelled)
    }

    /// All three partitions merged into one view.
    pub fn all_orders_info(&self) -> Result<OrderInfoMap, RegistryError> {
        let merged = merge_order_infos(self.open_orders_info(), self.fulfilled_orders_info())?;
        merge_order_infos(merged, self.cancelled_orders_info())
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    pub fn fulfilled_count(&self) -> usize {
        self.fulfilled.len()
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled.len()
    }

    /// Number of IDs handed out so far.
    pub fn issued_count(&self) -> u64 {
        self.ids.last_id()
    }

    fn infos(orders: &BTreeMap<OrderId, Order>) -> OrderInfoMap {
        orders.iter().map(|(id, o)| (*id, o.info())).collect()
    }
}

/// Union of two views. Fails if any ID appears in both.
pub fn merge_order_infos(
    mut a: OrderInfoMap,
    b: OrderInfoMap,
) -> Result<OrderInfoMap, RegistryError> {
    let conflicts: Vec<OrderId> = b.keys().filter(|id| a.contains_key(id)).copied().collect();
    if !conflicts.is_empty() {
        return Err(RegistryError::IdConflict(conflicts));
    }
    a.extend(b);
    Ok(a)
}
