//! Systrade CLI: run and sweep commands.
//!
//! Commands:
//! - `run`: execute one simulation from a TOML config and save artifacts
//! - `sweep`: re-run a config over a list of interest rates in parallel
//!
//! Log output goes to stderr and is controlled by `RUST_LOG` (default `info`,
//! e.g. `RUST_LOG=systrade_core=debug`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use systrade_runner::export::{export_sweep_csv, save_artifacts};
use systrade_runner::{run_rate_sweep, run_simulation, SimulationConfig, SimulationResult};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "systrade",
    about = "Systrade CLI: historical trading simulation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one simulation from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for result JSON and CSV files.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Re-run a config once per interest rate.
    Sweep {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Comma-separated annual rates, e.g. 0.0,0.02,0.05.
        #[arg(long, value_delimiter = ',', required = true)]
        rates: Vec<f64>,

        /// Write the sweep summary CSV here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output_dir } => run_cmd(config, output_dir),
        Commands::Sweep {
            config,
            rates,
            output,
        } => sweep_cmd(config, rates, output),
    }
}

fn run_cmd(config_path: PathBuf, output_dir: PathBuf) -> Result<()> {
    let config = SimulationConfig::from_file(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let result = run_simulation(&config)?;
    print_summary(&result);

    let run_dir = save_artifacts(&result, &output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());

    Ok(())
}

fn sweep_cmd(config_path: PathBuf, rates: Vec<f64>, output: Option<PathBuf>) -> Result<()> {
    if let Some(bad) = rates.iter().find(|r| !r.is_finite()) {
        bail!("rates must be finite, got {bad}");
    }
    let config = SimulationConfig::from_file(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    let results = run_rate_sweep(&config, &rates)?;
    let csv = export_sweep_csv(&results)?;

    match output {
        Some(path) => {
            std::fs::write(&path, csv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Sweep of {} runs saved to: {}", results.len(), path.display());
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn print_summary(result: &SimulationResult) {
    let open = result.open_orders().count();
    println!();
    println!("=== Simulation Result ===");
    println!("Run ID:       {}", &result.run_id[..12.min(result.run_id.len())]);
    println!("Dataset:      {}", &result.dataset_hash[..12.min(result.dataset_hash.len())]);
    println!("Window:       {} to {}", result.start, result.end);
    println!("Steps:        {}", result.portfolio_history.len());
    println!("Trades:       {}", result.total_trades);
    println!("Open orders:  {open}");
    if let Some(last) = result.portfolio_history.last() {
        println!("Cash:         {:.2}", last.cash);
        println!("Fees:         {:.2}", last.fees);
        println!("Stock value:  {:.2}", last.stock);
    }
    println!("Final value:  {:.2}", result.final_value);
    println!();
}
