//! Systrade Runner: simulation orchestration on top of `systrade-core`.
//!
//! This crate provides:
//! - TOML simulation configs with content-addressed run IDs
//! - CSV price loading into a paper broker, with a dataset hash
//! - Single-run driver that replays scheduled orders and cancels
//! - Parallel parameter sweeps over a shared broker
//! - JSON and CSV artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod runner;
pub mod sweep;

pub use config::{ConfigError, RunId, ScheduledCancel, SimulationConfig};
pub use data_loader::{load_prices, read_prices, LoadError, LoadedPrices};
pub use export::{load_artifacts, save_artifacts};
pub use runner::{run_simulation, run_with_broker, OrderRecord, RunError, SimulationResult};
pub use sweep::{rate_grid, run_rate_sweep, ParamSweep};
