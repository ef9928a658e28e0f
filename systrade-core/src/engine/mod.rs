//! Trading engine: portfolio state, order registry and the account loop.
//!
//! The account drives one discrete time step per `update_to` call:
//!
//! 1. Settle: execute every open order whose settlement time has arrived
//! 2. Refresh: pull holdings and cash caches forward
//! 3. Snapshot: append one valuation row and one holdings row

pub mod account;
pub mod portfolio;
pub mod registry;

pub use account::{Account, AccountConfig, AccountError};
pub use portfolio::{AssetSnapshot, HoldingsSnapshot, PortfolioError, PortfolioState};
pub use registry::{merge_order_infos, OrderInfoMap, OrderRegistry, Partition, RegistryError};
