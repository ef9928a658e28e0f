//! Parameter sweeps over simulation configs.
//!
//! Prices are loaded once and every run shares the same broker read-only,
//! so runs are independent and can go through rayon's pool.

use rayon::prelude::*;
use systrade_core::broker::Broker;

use crate::config::SimulationConfig;
use crate::data_loader::load_prices;
use crate::runner::{run_with_broker, RunError, SimulationResult};

/// Sweep executor.
#[derive(Debug, Clone, Copy)]
pub struct ParamSweep {
    parallel: bool,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl ParamSweep {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables parallel execution.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every config against one broker. Results keep the input order.
    pub fn run_configs<B: Broker + Sync + ?Sized>(
        &self,
        configs: &[SimulationConfig],
        broker: &B,
        dataset_hash: &str,
    ) -> Result<Vec<SimulationResult>, RunError> {
        if self.parallel {
            configs
                .par_iter()
                .map(|config| run_with_broker(config, broker, dataset_hash))
                .collect()
        } else {
            configs
                .iter()
                .map(|config| run_with_broker(config, broker, dataset_hash))
                .collect()
        }
    }

    /// Re-run `base` once per interest rate.
    pub fn sweep_interest_rates<B: Broker + Sync + ?Sized>(
        &self,
        base: &SimulationConfig,
        rates: &[f64],
        broker: &B,
        dataset_hash: &str,
    ) -> Result<Vec<SimulationResult>, RunError> {
        self.run_configs(&rate_grid(base, rates), broker, dataset_hash)
    }
}

/// One config per rate, otherwise identical to `base`.
pub fn rate_grid(base: &SimulationConfig, rates: &[f64]) -> Vec<SimulationConfig> {
    rates
        .iter()
        .map(|&rate| SimulationConfig {
            interest_rate: rate,
            ..base.clone()
        })
        .collect()
}

/// Load the base config's prices once, then sweep interest rates in parallel.
pub fn run_rate_sweep(
    base: &SimulationConfig,
    rates: &[f64],
) -> Result<Vec<SimulationResult>, RunError> {
    base.validate()?;
    let (broker, dataset_hash) = load_prices(&base.prices)?.into_broker(base.broker.clone())?;
    let results = ParamSweep::new().sweep_interest_rates(base, rates, &broker, &dataset_hash)?;
    tracing::info!(runs = results.len(), "sweep complete");
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_loader::read_prices;
    use chrono::{TimeZone, Utc};
    use systrade_core::broker::{BrokerSettings, PaperBroker};
    use systrade_core::domain::Timestamp;

    fn t(day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2020, 1, day, 0, 0, 0).unwrap()
    }

    fn broker() -> PaperBroker {
        let csv = "time,SPY\n2020-01-01,100.0\n2020-01-15,101.0\n2020-01-31,102.0\n";
        read_prices(csv.as_bytes())
            .unwrap()
            .into_broker(BrokerSettings::default())
            .unwrap()
            .0
    }

    fn base() -> SimulationConfig {
        SimulationConfig {
            prices: "unused.csv".into(),
            start: t(1),
            end: t(31),
            interest_rate: 0.0,
            initial_cash: 10_000.0,
            initial_holdings: Default::default(),
            broker: BrokerSettings::default(),
            orders: Vec::new(),
            cancels: Vec::new(),
        }
    }

    #[test]
    fn grid_varies_only_the_rate() {
        let grid = rate_grid(&base(), &[0.0, 0.01, 0.05]);
        assert_eq!(grid.len(), 3);
        assert_eq!(grid[2].interest_rate, 0.05);
        assert_eq!(grid[2].initial_cash, 10_000.0);
    }

    #[test]
    fn higher_rates_grow_cash_faster() {
        let b = broker();
        let results = ParamSweep::new()
            .sweep_interest_rates(&base(), &[0.0, 0.02, 0.05], &b, "h")
            .unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].final_value, 10_000.0);
        assert!(results[1].final_value > results[0].final_value);
        assert!(results[2].final_value > results[1].final_value);
        assert_ne!(results[0].run_id, results[1].run_id);
    }

    #[test]
    fn parallel_matches_sequential() {
        let b = broker();
        let rates = [0.0, 0.01, 0.02, 0.03];
        let par = ParamSweep::new()
            .sweep_interest_rates(&base(), &rates, &b, "h")
            .unwrap();
        let seq = ParamSweep::new()
            .with_parallelism(false)
            .sweep_interest_rates(&base(), &rates, &b, "h")
            .unwrap();
        let par_values: Vec<f64> = par.iter().map(|r| r.final_value).collect();
        let seq_values: Vec<f64> = seq.iter().map(|r| r.final_value).collect();
        assert_eq!(par_values, seq_values);
    }
}
