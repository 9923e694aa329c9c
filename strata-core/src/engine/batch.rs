//! Batch runner: one independent run per parameter set.
//!
//! Every parameter set is validated before any run starts. With
//! `parallelism > 1` runs execute on a dedicated rayon pool of that size;
//! results always come back in input order.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use rayon::prelude::*;
use tracing::info;

use super::error::{ConfigError, RunError};
use super::loop_runner::StrategyRunner;
use super::state::RunResult;
use crate::strategy::Params;

/// Outcome of one run in a batch.
pub type RunOutcome = Result<RunResult, RunError>;

impl StrategyRunner {
    /// Run every parameter set. `N` sets always yield `N` outcomes unless a
    /// `ConfigError` fails the whole batch up front.
    pub fn run_batch(
        &self,
        param_sets: &[Params],
        parallelism: usize,
    ) -> Result<Vec<RunOutcome>, ConfigError> {
        self.run_batch_with_progress(param_sets, parallelism, None, |_, _, _| {})
    }

    /// Like [`run_batch`](Self::run_batch), stopping cooperatively once
    /// `cancel` is set. Runs that had not finished yield `Cancelled`.
    pub fn run_batch_with_cancel(
        &self,
        param_sets: &[Params],
        parallelism: usize,
        cancel: &AtomicBool,
    ) -> Result<Vec<RunOutcome>, ConfigError> {
        self.run_batch_with_progress(param_sets, parallelism, Some(cancel), |_, _, _| {})
    }

    /// Batch execution with progress reporting.
    ///
    /// The callback is invoked after each run completes with:
    /// - Input index of the run (0-based)
    /// - Number of runs completed so far
    /// - The run's outcome
    pub fn run_batch_with_progress<F>(
        &self,
        param_sets: &[Params],
        parallelism: usize,
        cancel: Option<&AtomicBool>,
        progress: F,
    ) -> Result<Vec<RunOutcome>, ConfigError>
    where
        F: Fn(usize, usize, &RunOutcome) + Sync,
    {
        if parallelism == 0 {
            return Err(ConfigError::InvalidParallelism(parallelism));
        }
        for params in param_sets {
            self.validate_params(params)?;
        }

        info!(runs = param_sets.len(), parallelism, "batch started");
        let completed = AtomicUsize::new(0);
        let run_one = |index: usize, params: &Params| -> RunOutcome {
            let outcome = self.run_with_cancel(params, cancel);
            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            progress(index, done, &outcome);
            outcome
        };

        let outcomes: Vec<RunOutcome> = if parallelism == 1 {
            param_sets
                .iter()
                .enumerate()
                .map(|(i, params)| run_one(i, params))
                .collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(parallelism)
                .build()
                .map_err(|e| ConfigError::WorkerPool(e.to_string()))?;
            pool.install(|| {
                param_sets
                    .par_iter()
                    .enumerate()
                    .map(|(i, params)| run_one(i, params))
                    .collect()
            })
        };

        let failed = outcomes.iter().filter(|o| o.is_err()).count();
        info!(runs = outcomes.len(), failed, "batch finished");
        Ok(outcomes)
    }
}
