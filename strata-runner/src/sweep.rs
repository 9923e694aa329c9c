//! Parameter sweeps: grid expansion and batch execution with ranking.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::AtomicBool;

use strata_core::engine::{ConfigError, RunOutcome, RunResult};
use strata_core::strategy::{ParamValue, Params};
use strata_core::StrategyRunner;

/// Parameter grid specification.
///
/// Fixed parameters apply to every set; each axis contributes one value per
/// set. Expansion is a cartesian product in key order with the last key
/// varying fastest, so the same grid always yields the same sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamGrid {
    fixed: Params,
    axes: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new(fixed: Params) -> Self {
        Self {
            fixed,
            axes: BTreeMap::new(),
        }
    }

    pub fn with_axis(mut self, key: impl Into<String>, values: Vec<ParamValue>) -> Self {
        self.axes.insert(key.into(), values);
        self
    }

    /// Total number of sets before filtering.
    pub fn size(&self) -> usize {
        self.axes.values().map(Vec::len).product()
    }

    pub fn expand(&self) -> Vec<Params> {
        self.expand_where(|_| true)
    }

    /// Expand, keeping only the sets `keep` accepts.
    pub fn expand_where(&self, keep: impl Fn(&Params) -> bool) -> Vec<Params> {
        let mut sets = vec![self.fixed.clone()];
        for (key, values) in &self.axes {
            sets = sets
                .into_iter()
                .flat_map(|base| {
                    values
                        .iter()
                        .map(move |v| base.clone().with(key.as_str(), v.clone()))
                })
                .collect();
        }
        sets.retain(|p| keep(p));
        sets
    }
}

/// Drops SMA sets whose short window is not shorter than the long one.
/// Sets without both periods pass through.
pub fn ordered_windows(params: &Params) -> bool {
    match (params.get_int("days_short"), params.get_int("days_long")) {
        (Ok(short), Ok(long)) => short < long,
        _ => true,
    }
}

/// Parameter sweep executor over one runner template.
pub struct ParamSweep {
    runner: StrategyRunner,
    parallelism: usize,
}

impl ParamSweep {
    pub fn new(runner: StrategyRunner) -> Self {
        Self {
            runner,
            parallelism: 1,
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn runner(&self) -> &StrategyRunner {
        &self.runner
    }

    pub fn sweep(&self, sets: &[Params]) -> Result<SweepResults, ConfigError> {
        self.sweep_with_progress(sets, None, |_, _, _| {})
    }

    /// Executes a sweep with progress reporting.
    ///
    /// The callback is invoked after each run completes with:
    /// - Input index of the run (0-based)
    /// - Number of runs completed so far
    /// - The run's outcome
    pub fn sweep_with_progress<F>(
        &self,
        sets: &[Params],
        cancel: Option<&AtomicBool>,
        progress: F,
    ) -> Result<SweepResults, ConfigError>
    where
        F: Fn(usize, usize, &RunOutcome) + Sync,
    {
        let outcomes = self
            .runner
            .run_batch_with_progress(sets, self.parallelism, cancel, progress)?;
        Ok(SweepResults::new(outcomes))
    }
}

/// Outcomes of a sweep, in input order.
#[derive(Debug)]
pub struct SweepResults {
    outcomes: Vec<RunOutcome>,
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    pub(crate) fn new(outcomes: Vec<RunOutcome>) -> Self {
        let by_run_id = outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().ok().map(|r| (r.run_id.clone(), i)))
            .collect();
        Self {
            outcomes,
            by_run_id,
        }
    }

    pub fn all(&self) -> &[RunOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn successes(&self) -> impl Iterator<Item = &RunResult> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_err()).count()
    }

    pub fn get(&self, run_id: &str) -> Option<&RunResult> {
        let i = *self.by_run_id.get(run_id)?;
        self.outcomes[i].as_ref().ok()
    }

    /// Successful runs, best final total first. Ties keep input order.
    pub fn ranked(&self) -> Vec<&RunResult> {
        let mut ranked: Vec<&RunResult> = self.successes().collect();
        ranked.sort_by(|a, b| b.final_total().cmp(&a.final_total()));
        ranked
    }

    pub fn best(&self) -> Option<&RunResult> {
        self.ranked().into_iter().next()
    }
}
