//! Backtesting engine: strategy runner, order execution and batch runs.
//!
//! A run replays the shared, read-only table bar by bar:
//!
//! 1. Hooks: every strategy's `on_close`, in list order, over the truncated view
//! 2. Execution: queued orders applied FIFO at the bar's close
//! 3. Snapshot: every book records cash, positions and mark-to-market
//!
//! Batches replicate a runner across parameter sets, optionally on a worker
//! pool.

pub mod batch;
pub mod error;
pub mod execution;
pub mod loop_runner;
pub mod state;

pub use batch::RunOutcome;
pub use error::{ConfigError, Hook, RunError};
pub use execution::{execute_order, reference_price, reference_prices, ExecutionError, ExecutionLog};
pub use loop_runner::StrategyRunner;
pub use state::{
    BookHistory, Diagnostic, DiagnosticKind, HistoryColumn, HistoryField, RunResult,
    VOID_BAR_RATE_THRESHOLD,
};
