//! Engine error taxonomy.
//!
//! `ConfigError` fails a whole batch before any run starts. `RunError` is
//! attached to the outcome of a single run and never affects other runs.

use std::fmt;

use thiserror::Error;

use crate::data::{TableError, Timestamp};
use crate::domain::BookError;
use crate::strategy::{ParamError, Params, StrategyError};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("time series is empty")]
    EmptyTimeSeries,

    #[error("runner has no strategies")]
    NoStrategies,

    #[error("{strategies} strategies cannot be paired with {books} books")]
    BookPairing { strategies: usize, books: usize },

    #[error("book name '{0}' is used twice")]
    DuplicateBook(String),

    #[error("parallelism must be at least 1, got {0}")]
    InvalidParallelism(usize),

    #[error("parameter set {params} rejected by strategy '{strategy}': {source}")]
    InvalidParams {
        strategy: String,
        params: Params,
        #[source]
        source: ParamError,
    },

    #[error(transparent)]
    Table(#[from] TableError),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Strategy hook that raised an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    ExtendData,
    Init,
    OnClose,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::ExtendData => "extend_data",
            Hook::Init => "init",
            Hook::OnClose => "on_close",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("strategy '{strategy}' failed in {hook}{} with params {params}: {source}", at(.timestamp))]
    StrategyHook {
        strategy: String,
        hook: Hook,
        timestamp: Option<Timestamp>,
        params: Params,
        #[source]
        source: StrategyError,
    },

    #[error("book valuation failed at {timestamp} with params {params}: {source}")]
    Accounting {
        timestamp: Timestamp,
        params: Params,
        #[source]
        source: BookError,
    },

    #[error("run with params {params} was cancelled")]
    Cancelled { params: Params },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RunError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled { .. })
    }

    /// Parameter set of the failed run, when known.
    pub fn params(&self) -> Option<&Params> {
        match self {
            RunError::StrategyHook { params, .. }
            | RunError::Accounting { params, .. }
            | RunError::Cancelled { params } => Some(params),
            RunError::Config(ConfigError::InvalidParams { params, .. }) => Some(params),
            RunError::Config(_) => None,
        }
    }
}

fn at(timestamp: &Option<Timestamp>) -> String {
    timestamp.map(|ts| format!(" at {ts}")).unwrap_or_default()
}
