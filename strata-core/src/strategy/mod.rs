//! Strategy lifecycle contract.
//!
//! A strategy is driven through `Created -> Initialized -> RunningBar* ->
//! Finished`. The engine owns the transitions; implementations only supply
//! the hooks.
//!
//! # Invariants
//! - `on_close` only ever sees rows with timestamp `<=` the current bar
//! - every run works on its own `clone_box` copy; nothing mutable is shared
//! - orders pushed during a bar are executed at that bar's close, then the
//!   queue is cleared

pub mod buy_and_hold;
pub mod params;
pub mod sma_crossover;

pub use buy_and_hold::BuyAndHold;
pub use params::{ParamError, ParamValue, Params};
pub use sma_crossover::{crossover, sma, SmaCrossover};

use thiserror::Error;

use crate::data::{
    InsufficientDataError, TableError, TableView, TailError, TimeSeriesTable, Timestamp,
};
use crate::domain::{AssetRegistry, Book, Order};

#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Param(#[from] ParamError),

    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),

    #[error("extended table does not preserve the base index and columns")]
    BaseNotPreserved,

    #[error("invalid lifecycle transition: {0}")]
    Lifecycle(String),

    #[error("hook panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Failed(String),
}

impl From<TailError> for StrategyError {
    fn from(err: TailError) -> Self {
        match err {
            TailError::Table(e) => StrategyError::Table(e),
            TailError::InsufficientData(e) => StrategyError::InsufficientData(e),
        }
    }
}

impl StrategyError {
    pub fn msg(message: impl Into<String>) -> Self {
        StrategyError::Failed(message.into())
    }
}

/// User trading logic.
///
/// `on_close` and `clone_box` are required; `extend_data` and `init` default
/// to no-ops.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Accepted parameter names. `None` accepts any set.
    fn param_names(&self) -> Option<&[&'static str]> {
        None
    }

    /// Check parameter values before any run starts. A set rejected here
    /// fails the whole batch instead of one run.
    fn validate_params(&self, _params: &Params) -> Result<(), ParamError> {
        Ok(())
    }

    /// Derive extra columns from the full table before the run starts.
    ///
    /// Derived values at row `t` must only depend on rows `<= t`. The
    /// returned table must come from [`TimeSeriesTable::extend`] on `data`.
    fn extend_data(
        &self,
        _data: &TimeSeriesTable,
        _params: &Params,
    ) -> Result<Option<TimeSeriesTable>, StrategyError> {
        Ok(None)
    }

    fn init(&mut self, _ctx: &InitContext<'_>) -> Result<(), StrategyError> {
        Ok(())
    }

    fn on_close(&mut self, ctx: &mut BarContext<'_>) -> Result<(), StrategyError>;

    fn clone_box(&self) -> Box<dyn Strategy>;
}

impl Clone for Box<dyn Strategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// What `init` may look at: the column layout, parameters and assets.
/// No rows are visible before the first bar.
pub struct InitContext<'a> {
    pub(crate) data: TableView<'a>,
    pub(crate) params: &'a Params,
    pub(crate) assets: &'a AssetRegistry,
    pub(crate) book: &'a Book,
}

impl<'a> InitContext<'a> {
    pub fn data(&self) -> TableView<'a> {
        self.data
    }

    pub fn params(&self) -> &'a Params {
        self.params
    }

    pub fn assets(&self) -> &'a AssetRegistry {
        self.assets
    }

    pub fn book(&self) -> &'a Book {
        self.book
    }
}

/// Per-bar hook input: the truncated view and the order queue.
pub struct BarContext<'a> {
    pub(crate) data: TableView<'a>,
    pub(crate) bar: usize,
    pub(crate) timestamp: Timestamp,
    pub(crate) params: &'a Params,
    pub(crate) assets: &'a AssetRegistry,
    pub(crate) book: &'a Book,
    pub(crate) orders: &'a mut Vec<Order>,
}

impl<'a> BarContext<'a> {
    /// Rows up to and including the current bar.
    pub fn data(&self) -> TableView<'a> {
        self.data
    }

    pub fn bar_index(&self) -> usize {
        self.bar
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn params(&self) -> &'a Params {
        self.params
    }

    pub fn assets(&self) -> &'a AssetRegistry {
        self.assets
    }

    /// The book this strategy trades into, as of the start of this bar.
    pub fn book(&self) -> &'a Book {
        self.book
    }

    pub fn submit(&mut self, order: Order) {
        self.orders.push(order);
    }

    /// Orders queued so far during this bar.
    pub fn orders(&self) -> &[Order] {
        self.orders.as_slice()
    }
}

/// Lifecycle state of one strategy instance inside a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyState {
    Created,
    Initialized,
    RunningBar(usize),
    Finished,
}

impl StrategyState {
    pub fn initialize(&mut self) -> Result<(), StrategyError> {
        match self {
            StrategyState::Created => {
                *self = StrategyState::Initialized;
                Ok(())
            }
            other => Err(StrategyError::Lifecycle(format!("init from {other:?}"))),
        }
    }

    /// Enter `bar`. Bars must arrive in order, each exactly once.
    pub fn enter_bar(&mut self, bar: usize) -> Result<(), StrategyError> {
        let expected = match self {
            StrategyState::Initialized => 0,
            StrategyState::RunningBar(last) => *last + 1,
            other => {
                return Err(StrategyError::Lifecycle(format!(
                    "bar {bar} from {other:?}"
                )))
            }
        };
        if bar != expected {
            return Err(StrategyError::Lifecycle(format!(
                "bar {bar} entered, expected bar {expected}"
            )));
        }
        *self = StrategyState::RunningBar(bar);
        Ok(())
    }

    pub fn finish(&mut self) {
        *self = StrategyState::Finished;
    }
}
