//! Continuously compounding cash account with append-only cash flows.
//!
//! Balance at time T:
//!
//! ```text
//! amount0 * exp(r * Δ(t0, T)) + Σ amount_i * exp(r * Δ(time_i, T))   for time_i <= T
//! ```
//!
//! where Δ is elapsed time in years of [`SECONDS_IN_FULL_YEAR`].
//!
//! Two query paths:
//! - [`CashAccount::balance_exact`] rescans every flow. Always correct.
//! - [`CashAccount::balance_fast`] reuses the view cached by
//!   [`CashAccount::refresh_view`]. It refuses to answer when the cached view
//!   would give a different set of flows than a rescan would.

use crate::domain::Timestamp;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SECONDS_IN_FULL_YEAR: f64 = 3600.0 * 24.0 * 365.0;

/// Elapsed time from `from` to `to` in years. Negative if `to < from`.
pub fn year_fraction(from: Timestamp, to: Timestamp) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0 / SECONDS_IN_FULL_YEAR
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CashError {
    #[error("cannot book a cash flow at {time}, before the account opened at {t0}")]
    BeforeInception { time: Timestamp, t0: Timestamp },

    #[error("cash amount must be finite, got {0}")]
    NonFiniteAmount(f64),

    #[error("interest rate must be finite, got {0}")]
    InvalidRate(f64),

    #[error("fast balance queried at {0} before refresh_view was called")]
    ViewNotRefreshed(Timestamp),

    #[error("fast balance queried at {requested} but the cached view was refreshed to {as_of} and is stale")]
    StaleView {
        requested: Timestamp,
        as_of: Timestamp,
    },
}

/// One cash flow.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CashEntry {
    pub time: Timestamp,
    pub amount: f64,
}

/// Flows with `time <= as_of`, captured by `refresh_view`.
#[derive(Debug, Clone)]
struct CashView {
    as_of: Timestamp,
    entries: Vec<CashEntry>,
    /// Number of flows recorded when the view was built.
    recorded: usize,
    /// Latest flow time inside the view.
    latest_included: Option<Timestamp>,
    /// Earliest flow time left out of the view.
    earliest_excluded: Option<Timestamp>,
}

impl CashView {
    /// Whether the view holds exactly the flows with `time_i <= time`.
    fn covers(&self, time: Timestamp, recorded: usize) -> bool {
        recorded == self.recorded
            && self.latest_included.map_or(true, |t| t <= time)
            && self.earliest_excluded.map_or(true, |t| t > time)
    }
}

/// Cash holding at a constant continuously compounded rate.
#[derive(Debug, Clone)]
pub struct CashAccount {
    rate: f64,
    t0: Timestamp,
    amount0: f64,
    adjustments: Vec<CashEntry>,
    view: Option<CashView>,
}

impl CashAccount {
    pub fn new(rate: f64, t0: Timestamp, amount0: f64) -> Result<Self, CashError> {
        if !rate.is_finite() {
            return Err(CashError::InvalidRate(rate));
        }
        if !amount0.is_finite() {
            return Err(CashError::NonFiniteAmount(amount0));
        }
        Ok(Self {
            rate,
            t0,
            amount0,
            adjustments: Vec::new(),
            view: None,
        })
    }

    /// Book a cash flow at `time`.
    pub fn add(&mut self, amount: f64, time: Timestamp) -> Result<(), CashError> {
        self.check_time(time)?;
        if !amount.is_finite() {
            return Err(CashError::NonFiniteAmount(amount));
        }
        self.adjustments.push(CashEntry { time, amount });
        Ok(())
    }

    pub fn check_time(&self, time: Timestamp) -> Result<(), CashError> {
        if time < self.t0 {
            return Err(CashError::BeforeInception { time, t0: self.t0 });
        }
        Ok(())
    }

    /// Cache the flows with `time_i <= time` for [`Self::balance_fast`].
    pub fn refresh_view(&mut self, time: Timestamp) {
        let mut entries = Vec::new();
        let mut latest_included = None;
        let mut earliest_excluded: Option<Timestamp> = None;
        for e in &self.adjustments {
            if e.time <= time {
                entries.push(*e);
                latest_included = latest_included.max(Some(e.time));
            } else {
                earliest_excluded = Some(earliest_excluded.map_or(e.time, |t| t.min(e.time)));
            }
        }
        self.view = Some(CashView {
            as_of: time,
            entries,
            recorded: self.adjustments.len(),
            latest_included,
            earliest_excluded,
        });
    }

    /// Balance at `time` from the cached view, without rescanning flows.
    ///
    /// With no flows recorded this is the compounded opening balance. Otherwise
    /// the view must have been refreshed so that it holds exactly the flows up
    /// to `time`; a missing or stale view is a usage error.
    pub fn balance_fast(&self, time: Timestamp) -> Result<f64, CashError> {
        if self.adjustments.is_empty() {
            return Ok(self.opening_value(time));
        }
        let view = self
            .view
            .as_ref()
            .ok_or(CashError::ViewNotRefreshed(time))?;
        if !view.covers(time, self.adjustments.len()) {
            return Err(CashError::StaleView {
                requested: time,
                as_of: view.as_of,
            });
        }
        Ok(self.opening_value(time) + self.compound(view.entries.iter(), time))
    }

    /// Balance at `time`, recomputed from the full flow history.
    pub fn balance_exact(&self, time: Timestamp) -> f64 {
        let flows = self.adjustments.iter().filter(|e| e.time <= time);
        self.opening_value(time) + self.compound(flows, time)
    }

    fn opening_value(&self, time: Timestamp) -> f64 {
        self.amount0 * (self.rate * year_fraction(self.t0, time)).exp()
    }

    fn compound<'a>(&self, flows: impl Iterator<Item = &'a CashEntry>, time: Timestamp) -> f64 {
        flows
            .map(|e| e.amount * (self.rate * year_fraction(e.time, time)).exp())
            .sum()
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn t0(&self) -> Timestamp {
        self.t0
    }

    pub fn amount0(&self) -> f64 {
        self.amount0
    }

    pub fn adjustments(&self) -> &[CashEntry] {
        &self.adjustments
    }

    /// Time the cached view was last refreshed to.
    pub fn view_as_of(&self) -> Option<Timestamp> {
        self.view.as_ref().map(|v| v.as_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn t(minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2019, 7, 10, 9, 30 + minute, 0).unwrap()
    }

    #[test]
    fn one_year_of_interest_compounds_continuously() {
        let acct = CashAccount::new(0.1, t(0), 1.0).unwrap();
        let one_year = t(0) + Duration::seconds(SECONDS_IN_FULL_YEAR as i64);
        let expected = 0.1_f64.exp();
        assert!((acct.balance_exact(one_year) - expected).abs() < 1e-12);
        assert!((acct.balance_fast(one_year).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn zero_rate_is_undiscounted_sum() {
        let mut acct = CashAccount::new(0.0, t(0), 100.0).unwrap();
        acct.add(-20.0, t(1)).unwrap();
        acct.add(5.0, t(2)).unwrap();
        acct.add(7.0, t(8)).unwrap();
        assert_eq!(acct.balance_exact(t(0)), 100.0);
        assert_eq!(acct.balance_exact(t(1)), 80.0);
        assert_eq!(acct.balance_exact(t(5)), 85.0);
        assert_eq!(acct.balance_exact(t(9)), 92.0);
    }

    #[test]
    fn flows_compound_from_their_own_time() {
        let mut acct = CashAccount::new(0.05, t(0), 0.0).unwrap();
        let half_year = t(0) + Duration::seconds((SECONDS_IN_FULL_YEAR / 2.0) as i64);
        let one_year = t(0) + Duration::seconds(SECONDS_IN_FULL_YEAR as i64);
        acct.add(10.0, half_year).unwrap();
        let expected = 10.0 * (0.05_f64 * 0.5).exp();
        assert!((acct.balance_exact(one_year) - expected).abs() < 1e-9);
    }

    #[test]
    fn add_before_inception_rejected() {
        let mut acct = CashAccount::new(0.0, t(5), 0.0).unwrap();
        let err = acct.add(1.0, t(4)).unwrap_err();
        assert!(matches!(err, CashError::BeforeInception { .. }));
        assert!(acct.adjustments().is_empty());
    }

    #[test]
    fn non_finite_inputs_rejected() {
        assert!(CashAccount::new(f64::NAN, t(0), 0.0).is_err());
        assert!(CashAccount::new(0.0, t(0), f64::INFINITY).is_err());
        let mut acct = CashAccount::new(0.0, t(0), 0.0).unwrap();
        assert!(acct.add(f64::NAN, t(1)).is_err());
    }

    #[test]
    fn fast_path_without_flows_needs_no_refresh() {
        let acct = CashAccount::new(0.0, t(0), 42.0).unwrap();
        assert_eq!(acct.balance_fast(t(9)).unwrap(), 42.0);
    }

    #[test]
    fn fast_path_before_refresh_is_usage_error() {
        let mut acct = CashAccount::new(0.0, t(0), 0.0).unwrap();
        acct.add(-10.0, t(1)).unwrap();
        assert_eq!(
            acct.balance_fast(t(2)),
            Err(CashError::ViewNotRefreshed(t(2)))
        );
    }

    #[test]
    fn fast_path_matches_exact_after_refresh() {
        let mut acct = CashAccount::new(0.03, t(0), 50.0).unwrap();
        acct.add(-10.0, t(1)).unwrap();
        acct.add(4.0, t(3)).unwrap();
        acct.refresh_view(t(3));
        let fast = acct.balance_fast(t(3)).unwrap();
        assert!((fast - acct.balance_exact(t(3))).abs() < 1e-12);
        assert_eq!(acct.view_as_of(), Some(t(3)));
    }

    #[test]
    fn fast_path_rejects_flows_appended_after_refresh() {
        let mut acct = CashAccount::new(0.0, t(0), 0.0).unwrap();
        acct.add(-10.0, t(1)).unwrap();
        acct.refresh_view(t(1));
        acct.add(-5.0, t(2)).unwrap();
        assert!(matches!(
            acct.balance_fast(t(2)),
            Err(CashError::StaleView { .. })
        ));
        acct.refresh_view(t(2));
        assert_eq!(acct.balance_fast(t(2)).unwrap(), -15.0);
    }

    #[test]
    fn fast_path_rejects_query_past_excluded_flow() {
        let mut acct = CashAccount::new(0.0, t(0), 0.0).unwrap();
        acct.add(-10.0, t(1)).unwrap();
        acct.add(-5.0, t(6)).unwrap();
        acct.refresh_view(t(2));
        // view still holds exactly the flows up to t(5)
        assert_eq!(acct.balance_fast(t(5)).unwrap(), -10.0);
        // but not up to t(6)
        assert!(acct.balance_fast(t(6)).is_err());
    }

    #[test]
    fn fast_path_rejects_query_before_included_flow() {
        let mut acct = CashAccount::new(0.0, t(0), 0.0).unwrap();
        acct.add(-10.0, t(3)).unwrap();
        acct.refresh_view(t(4));
        assert!(acct.balance_fast(t(2)).is_err());
        assert_eq!(acct.balance_exact(t(2)), 0.0);
    }

    #[test]
    fn year_fraction_is_signed() {
        let one_day = t(0) + Duration::days(1);
        assert!((year_fraction(t(0), one_day) - 1.0 / 365.0).abs() < 1e-15);
        assert!(year_fraction(one_day, t(0)) < 0.0);
    }
}
