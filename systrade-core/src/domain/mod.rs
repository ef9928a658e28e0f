//! Domain types for the simulation engine.

pub mod ids;
pub mod order;

pub use ids::{IdGen, OrderId};
pub use order::{
    Order, OrderError, OrderInfo, OrderKind, OrderRequest, OrderSide, OrderStatus, Settlement,
};

/// Ticker symbol type alias
pub type Ticker = String;

/// Simulation timestamp. All engine times are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
