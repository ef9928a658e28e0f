//! Systrade Core: historical trading simulation engine.
//!
//! This crate contains the simulation itself:
//! - Domain types (order kinds, requests, orders, IDs)
//! - Broker trait plus a table-backed paper broker with slippage and fees
//! - Append-only holdings ledger and continuously compounding cash accounts
//! - Portfolio state with refreshable caches and snapshot history
//! - Order registry partitioned into open, fulfilled and cancelled
//! - Account time-step loop tying it all together

pub mod broker;
pub mod domain;
pub mod engine;
pub mod ledger;
