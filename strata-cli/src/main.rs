//! Strata CLI: run, sweep and synthetic-data commands.
//!
//! Commands:
//! - `run`: execute the first parameter set of a TOML sweep config
//! - `sweep`: execute the whole parameter grid and rank the results
//! - `synth`: write seeded synthetic bars as long-format CSV

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use strata_core::engine::RunResult;
use strata_runner::{
    build_runner, format_summary, generate_synthetic, load_data, ordered_windows, save_artifacts,
    save_sweep, write_csv, ParamSweep, RunArtifact, SweepConfig,
};

#[derive(Parser)]
#[command(name = "strata", about = "Strata CLI: bar-by-bar strategy backtesting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the first parameter set of a sweep config.
    Run {
        /// Path to a TOML sweep config.
        #[arg(long)]
        config: PathBuf,

        /// Output directory for run artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,
    },
    /// Run every parameter set of a sweep config.
    Sweep {
        /// Path to a TOML sweep config.
        #[arg(long)]
        config: PathBuf,

        /// Worker count. Overrides `[batch] parallelism`.
        #[arg(long)]
        parallelism: Option<usize>,

        /// Output directory for the summary and the best run's artifacts.
        #[arg(long, default_value = "results")]
        output_dir: PathBuf,

        /// Number of ranked runs to print.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Write synthetic bars as long-format CSV.
    Synth {
        /// Asset names, comma-separated (e.g., GOOG,MSFT).
        #[arg(long, value_delimiter = ',', required = true)]
        assets: Vec<String>,

        /// Bars per asset.
        #[arg(long, default_value_t = 500)]
        bars: usize,

        /// Random seed.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// First date (YYYY-MM-DD).
        #[arg(long, default_value = "2020-01-02")]
        start: String,

        /// Output CSV path.
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output_dir } => run_cmd(config, output_dir),
        Commands::Sweep {
            config,
            parallelism,
            output_dir,
            top,
        } => sweep_cmd(config, parallelism, output_dir, top),
        Commands::Synth {
            assets,
            bars,
            seed,
            start,
            out,
        } => synth_cmd(assets, bars, seed, &start, out),
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default `info` level.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_cmd(config_path: PathBuf, output_dir: PathBuf) -> Result<()> {
    let config = SweepConfig::from_file(&config_path)?;
    let data = load_data(&config.data)
        .with_context(|| format!("failed to load data for {}", config_path.display()))?;
    let runner = build_runner(&config, &data)?;

    let Some(params) = config.param_grid().expand_where(ordered_windows).into_iter().next() else {
        bail!("parameter grid in {} is empty after filtering", config_path.display());
    };
    let result = runner.run(&params)?;
    print_summary(&result);

    let artifact = RunArtifact::new(result, data.dataset_hash, data.has_synthetic);
    let run_dir = save_artifacts(&artifact, &output_dir)?;
    println!("Artifacts saved to: {}", run_dir.display());
    Ok(())
}

fn sweep_cmd(
    config_path: PathBuf,
    parallelism: Option<usize>,
    output_dir: PathBuf,
    top: usize,
) -> Result<()> {
    let config = SweepConfig::from_file(&config_path)?;
    let data = load_data(&config.data)
        .with_context(|| format!("failed to load data for {}", config_path.display()))?;
    let runner = build_runner(&config, &data)?;

    let sets = config.param_grid().expand_where(ordered_windows);
    if sets.is_empty() {
        bail!("parameter grid in {} is empty after filtering", config_path.display());
    }
    let parallelism = parallelism.unwrap_or(config.batch.parallelism);
    let total = sets.len();
    info!(runs = total, parallelism, "sweep started");

    let results = ParamSweep::new(runner)
        .with_parallelism(parallelism)
        .sweep_with_progress(&sets, None, |index, done, outcome| {
            info!(index, done, total, ok = outcome.is_ok(), "run complete");
        })?;

    println!();
    print!("{}", format_summary(&results, top));

    if let Some(best_dir) = save_sweep(&results, &data.dataset_hash, data.has_synthetic, &output_dir)? {
        println!("Best run saved to: {}", best_dir.display());
    }
    println!("Summary saved to: {}", output_dir.join("summary.csv").display());
    Ok(())
}

fn synth_cmd(assets: Vec<String>, bars: usize, seed: u64, start: &str, out: PathBuf) -> Result<()> {
    if bars == 0 {
        bail!("--bars must be >= 1");
    }
    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .with_context(|| format!("invalid --start '{start}' (expected YYYY-MM-DD)"))?;
    let names: Vec<&str> = assets.iter().map(String::as_str).collect();
    let data = generate_synthetic(&names, bars, seed, start);

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let file = std::fs::File::create(&out)
        .with_context(|| format!("failed to create {}", out.display()))?;
    write_csv(&data, file)?;
    info!(assets = names.len(), bars, seed, out = %out.display(), "synthetic data written");
    Ok(())
}

fn print_summary(result: &RunResult) {
    println!();
    println!("=== Run Result ===");
    println!("Run ID:         {}", &result.run_id[..12.min(result.run_id.len())]);
    println!("Params:         {}", result.params);
    println!("Bars:           {}", result.bar_count);
    println!("Orders:         {}", result.orders.len());
    println!("Rejected:       {}", result.rejected_orders().count());
    println!();
    println!("--- Books ---");
    for book in &result.books {
        println!(
            "{:<14}  cash {}  total {}  (start {})",
            book.name(),
            book.cash().round_dp(2),
            book.total_value().round_dp(2),
            book.initial_cash()
        );
        for (asset, position) in book.positions().filter(|(_, p)| !p.is_flat()) {
            println!("  {asset:<12}  qty {}", position.quantity);
        }
    }
    if !result.data_quality_warnings.is_empty() {
        println!();
        println!("--- Data Quality ---");
        for warning in &result.data_quality_warnings {
            println!("  {warning}");
        }
    }
}
