//! Strata Runner: configuration, data, sweeps and export around the engine.
//!
//! This crate builds on `strata-core` to provide:
//! - TOML sweep configuration with a cartesian parameter grid
//! - Long-format CSV ingestion and seeded synthetic bars
//! - Sweep execution with ranking by final book value
//! - JSON and CSV artifacts for runs and sweeps

pub mod config;
pub mod data_loader;
pub mod export;
pub mod sweep;

pub use config::{
    AssetConfig, BatchConfig, BookConfig, ConfigError, DataConfig, StrategyConfig, SweepConfig,
};
pub use data_loader::{generate_synthetic, load_csv, load_data, read_csv, write_csv, LoadError, LoadedData};
pub use export::{
    export_history_csv, export_json, export_orders_csv, export_summary_csv, export_trades_csv,
    format_summary, import_json, load_artifacts, save_artifacts, save_sweep, RunArtifact,
    SCHEMA_VERSION,
};
pub use sweep::{ordered_windows, ParamGrid, ParamSweep, SweepResults};

use std::sync::Arc;

use strata_core::StrategyRunner;

/// Build a runner for `config` over already-loaded data: every loaded asset
/// is registered, one strategy trades into one book.
pub fn build_runner(config: &SweepConfig, data: &LoadedData) -> anyhow::Result<StrategyRunner> {
    let assets = config.build_assets(&data.assets)?;
    let runner = StrategyRunner::new(
        Arc::new(data.table.clone()),
        assets,
        vec![config.build_strategy()?],
        vec![config.build_book()],
    )?;
    Ok(runner)
}
