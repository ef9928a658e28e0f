//! Export of simulation results as JSON and CSV artifacts.
//!
//! - **JSON**: full round-trip serialization with schema versioning
//! - **CSV**: portfolio history, holdings history, order list and sweep summary
//!
//! All persisted JSON carries a `schema_version` field. Unknown versions are
//! rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use systrade_core::engine::{AssetSnapshot, HoldingsSnapshot, Partition};

use crate::runner::{OrderRecord, SimulationResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `SimulationResult` to pretty JSON.
pub fn export_json(result: &SimulationResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize SimulationResult to JSON")
}

/// Deserialize a `SimulationResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<SimulationResult> {
    let result: SimulationResult =
        serde_json::from_str(json).context("failed to deserialize SimulationResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Columns: time, cash, fees, stock, total
pub fn export_portfolio_csv(history: &[AssetSnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["time", "cash", "fees", "stock", "total"])?;
    for row in history {
        wtr.write_record([
            &row.time.to_rfc3339(),
            &format!("{:.6}", row.cash),
            &format!("{:.6}", row.fees),
            &format!("{:.6}", row.stock),
            &format!("{:.6}", row.total()),
        ])?;
    }
    finish(wtr)
}

/// Columns: time, then one per ticker (taken from the first row).
pub fn export_holdings_csv(history: &[HoldingsSnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    let tickers: Vec<&String> = history
        .first()
        .map(|row| row.holdings.keys().collect())
        .unwrap_or_default();

    let mut header = vec!["time"];
    header.extend(tickers.iter().map(|t| t.as_str()));
    wtr.write_record(&header)?;

    for row in history {
        let mut record = vec![row.time.to_rfc3339()];
        record.extend(
            tickers
                .iter()
                .map(|t| row.holdings.get(*t).copied().unwrap_or(0).to_string()),
        );
        wtr.write_record(&record)?;
    }
    finish(wtr)
}

/// Columns: id, status, type, ticker, quantity, limit, time_placed,
/// time_executed, price, fee
pub fn export_orders_csv(orders: &[OrderRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "id",
        "status",
        "type",
        "ticker",
        "quantity",
        "limit",
        "time_placed",
        "time_executed",
        "price",
        "fee",
    ])?;
    for o in orders {
        let status = match o.partition {
            Partition::Open => "open",
            Partition::Fulfilled => "fulfilled",
            Partition::Cancelled => "cancelled",
        };
        wtr.write_record([
            o.id.to_string(),
            status.to_string(),
            o.info.kind.as_str().to_string(),
            o.info.ticker.clone(),
            o.quantity.to_string(),
            opt_f64(o.limit),
            o.info.time_placed.to_rfc3339(),
            o.info.time_executed.map(|t| t.to_rfc3339()).unwrap_or_default(),
            opt_f64(o.price),
            opt_f64(o.fee),
        ])?;
    }
    finish(wtr)
}

/// One row per sweep run.
///
/// Columns: run_id, interest_rate, total_trades, final_value
pub fn export_sweep_csv(results: &[SimulationResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["run_id", "interest_rate", "total_trades", "final_value"])?;
    for r in results {
        wtr.write_record([
            &r.run_id,
            &format!("{}", r.interest_rate),
            &r.total_trades.to_string(),
            &format!("{:.6}", r.final_value),
        ])?;
    }
    finish(wtr)
}

fn opt_f64(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6}")).unwrap_or_default()
}

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the full artifact set for a single run.
///
/// Creates `run_{first 12 hex chars of run_id}/` under `output_dir`
/// containing:
/// - `result.json`: the full `SimulationResult`
/// - `portfolio.csv`: cash, fees and stock value per step
/// - `holdings.csv`: per-ticker holdings per step
/// - `orders.csv`: every order and its final partition
///
/// Returns the path to the created directory.
pub fn save_artifacts(result: &SimulationResult, output_dir: &Path) -> Result<PathBuf> {
    let short_id: String = result.run_id.chars().take(12).collect();
    let run_dir = output_dir.join(format!("run_{short_id}"));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("result.json"), export_json(result)?)?;
    std::fs::write(
        run_dir.join("portfolio.csv"),
        export_portfolio_csv(&result.portfolio_history)?,
    )?;
    std::fs::write(
        run_dir.join("holdings.csv"),
        export_holdings_csv(&result.holdings_history)?,
    )?;
    std::fs::write(run_dir.join("orders.csv"), export_orders_csv(&result.orders)?)?;

    Ok(run_dir)
}

/// Load a `SimulationResult` from an artifact directory's result.json.
pub fn load_artifacts(dir: &Path) -> Result<SimulationResult> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use systrade_core::domain::{OrderId, OrderInfo, OrderKind, Timestamp};
    use systrade_core::ledger::Holdings;

    fn t(minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2019, 7, 10, 9, 30 + minute, 0).unwrap()
    }

    fn sample_result() -> SimulationResult {
        let mut holdings = Holdings::new();
        holdings.insert("tick0".into(), 2);
        holdings.insert("tick1".into(), -1);
        SimulationResult {
            schema_version: SCHEMA_VERSION,
            run_id: "abcdef0123456789abcdef".into(),
            dataset_hash: "feed".into(),
            start: t(0),
            end: t(1),
            interest_rate: 0.01,
            total_trades: 1,
            final_value: 95.5,
            portfolio_history: vec![
                AssetSnapshot {
                    time: t(0),
                    cash: 100.0,
                    fees: 0.0,
                    stock: 0.0,
                },
                AssetSnapshot {
                    time: t(1),
                    cash: 80.0,
                    fees: -1.5,
                    stock: 17.0,
                },
            ],
            holdings_history: vec![HoldingsSnapshot {
                time: t(1),
                holdings,
            }],
            orders: vec![
                OrderRecord {
                    id: OrderId(1),
                    partition: Partition::Fulfilled,
                    info: OrderInfo {
                        kind: OrderKind::BuyMarket,
                        ticker: "tick0".into(),
                        time_placed: t(0),
                        time_executed: Some(t(1)),
                    },
                    quantity: 2,
                    limit: None,
                    price: Some(10.0),
                    fee: Some(1.5),
                },
                OrderRecord {
                    id: OrderId(2),
                    partition: Partition::Open,
                    info: OrderInfo {
                        kind: OrderKind::SellLimit,
                        ticker: "tick1".into(),
                        time_placed: t(0),
                        time_executed: None,
                    },
                    quantity: 1,
                    limit: Some(99.0),
                    price: None,
                    fee: None,
                },
            ],
        }
    }

    #[test]
    fn json_roundtrip() {
        let result = sample_result();
        let back = import_json(&export_json(&result).unwrap()).unwrap();
        assert_eq!(back.run_id, result.run_id);
        assert_eq!(back.orders, result.orders);
        assert_eq!(back.holdings_history, result.holdings_history);
    }

    #[test]
    fn json_rejects_unknown_version() {
        let mut result = sample_result();
        result.schema_version = SCHEMA_VERSION + 1;
        let json = export_json(&result).unwrap();
        assert!(import_json(&json).is_err());
    }

    #[test]
    fn portfolio_csv_has_totals() {
        let csv = export_portfolio_csv(&sample_result().portfolio_history).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,cash,fees,stock,total");
        assert!(lines[2].ends_with(",95.500000"));
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn holdings_csv_has_ticker_columns() {
        let csv = export_holdings_csv(&sample_result().holdings_history).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "time,tick0,tick1");
        assert!(lines[1].ends_with(",2,-1"));
    }

    #[test]
    fn empty_holdings_csv_is_header_only() {
        let csv = export_holdings_csv(&[]).unwrap();
        assert_eq!(csv.trim(), "time");
    }

    #[test]
    fn orders_csv_content() {
        let csv = export_orders_csv(&sample_result().orders).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("1,fulfilled,buy_market,tick0,2,,"));
        assert!(lines[2].starts_with("2,open,sell_limit,tick1,1,99.000000,"));
        assert!(lines[2].ends_with(",,,"));
    }

    #[test]
    fn sweep_csv_one_row_per_run() {
        let results = vec![sample_result(), sample_result()];
        let csv = export_sweep_csv(&results).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn save_load_artifacts_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let result = sample_result();
        let run_dir = save_artifacts(&result, dir.path()).unwrap();
        assert!(run_dir.ends_with("run_abcdef012345"));
        for name in ["result.json", "portfolio.csv", "holdings.csv", "orders.csv"] {
            assert!(run_dir.join(name).exists(), "missing {name}");
        }
        let loaded = load_artifacts(&run_dir).unwrap();
        assert_eq!(loaded.final_value, result.final_value);
    }
}
