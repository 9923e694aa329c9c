//! Strata Core: time-series store, books, strategy lifecycle, order execution.
//!
//! This crate contains the heart of the backtesting engine:
//! - Columnar, timestamp-indexed price table shared read-only across runs
//! - Asset registry, orders, trades and cash/position books with exact decimals
//! - Strategy trait with `extend_data` / `init` / `on_close` hooks
//! - Bar-by-bar strategy runner with strict time causality
//! - Batch runner replicating one configuration across parameter sets

pub mod data;
pub mod domain;
pub mod engine;
pub mod strategy;

pub use data::{ColumnKey, TableView, TimeSeriesTable, Timestamp};
pub use domain::{Asset, AssetRegistry, Book, Order};
pub use engine::{ConfigError, RunError, RunOutcome, RunResult, StrategyRunner};
pub use strategy::{BarContext, InitContext, ParamValue, Params, Strategy, StrategyError};
