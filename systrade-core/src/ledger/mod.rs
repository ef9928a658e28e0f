//! Append-only ledgers: share holdings and compounding cash.

pub mod cash;
pub mod holdings;

pub use cash::{year_fraction, CashAccount, CashEntry, CashError, SECONDS_IN_FULL_YEAR};
pub use holdings::{Holdings, Ledger, LedgerEntry, LedgerError};
