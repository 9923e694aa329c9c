//! Bar-by-bar strategy runner.
//!
//! One run:
//! 1. Clone every strategy and create fresh books
//! 2. `extend_data` per strategy, then `init`
//! 3. For each bar: hooks in list order, then order execution, then one
//!    snapshot per book
//! 4. Freeze books into a `RunResult`

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::error::{ConfigError, Hook, RunError};
use super::execution::{reference_prices, ExecutionLog};
use super::state::{verify_books, DataQuality, Diagnostic, DiagnosticKind, RunResult};
use crate::data::{TimeSeriesTable, Timestamp};
use crate::domain::{AssetRegistry, Book, Order};
use crate::strategy::{BarContext, InitContext, Params, Strategy, StrategyError, StrategyState};

/// Configured run template: shared data, assets, strategy prototypes and
/// starting books.
///
/// The runner itself is never mutated by a run; every run clones the
/// strategies and starts from fresh copies of the books.
pub struct StrategyRunner {
    data: Arc<TimeSeriesTable>,
    assets: Arc<AssetRegistry>,
    strategies: Vec<Box<dyn Strategy>>,
    books: Vec<Book>,
}

impl std::fmt::Debug for StrategyRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRunner")
            .field("data", &self.data)
            .field("assets", &self.assets)
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("books", &self.books)
            .finish()
    }
}

/// Per-run strategy instance with its private data view and order queue.
struct Slot {
    strategy: Box<dyn Strategy>,
    state: StrategyState,
    data: Arc<TimeSeriesTable>,
    queue: Vec<Order>,
}

impl StrategyRunner {
    /// Build a runner.
    ///
    /// Books pair with strategies by position; a single book is shared by
    /// every strategy.
    pub fn new(
        data: Arc<TimeSeriesTable>,
        assets: AssetRegistry,
        strategies: Vec<Box<dyn Strategy>>,
        books: Vec<Book>,
    ) -> Result<Self, ConfigError> {
        if data.is_empty() {
            return Err(ConfigError::EmptyTimeSeries);
        }
        if strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }
        if books.len() != 1 && books.len() != strategies.len() {
            return Err(ConfigError::BookPairing {
                strategies: strategies.len(),
                books: books.len(),
            });
        }
        let mut names = HashSet::new();
        for book in &books {
            if !names.insert(book.name()) {
                return Err(ConfigError::DuplicateBook(book.name().to_string()));
            }
        }
        data.validate_ohlc(&assets)?;

        Ok(Self {
            data,
            assets: Arc::new(assets),
            strategies,
            books,
        })
    }

    pub fn data(&self) -> &Arc<TimeSeriesTable> {
        &self.data
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    fn book_for(&self, strategy: usize) -> usize {
        if self.books.len() == 1 {
            0
        } else {
            strategy
        }
    }

    /// Check `params` against every strategy: finite values, declared
    /// names, then the strategy's own value checks.
    pub fn validate_params(&self, params: &Params) -> Result<(), ConfigError> {
        for strategy in &self.strategies {
            let declared = match strategy.param_names() {
                Some(names) => params.validate(names),
                None => params.validate_values(),
            };
            declared
                .and_then(|()| strategy.validate_params(params))
                .map_err(|source| ConfigError::InvalidParams {
                    strategy: strategy.name().to_string(),
                    params: params.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Run every bar with `params`.
    pub fn run(&self, params: &Params) -> Result<RunResult, RunError> {
        self.run_with_cancel(params, None)
    }

    /// Run with a cancellation flag checked before the run and between bars.
    ///
    /// A cancelled run is abandoned wholesale; no partial book is returned.
    pub fn run_with_cancel(
        &self,
        params: &Params,
        cancel: Option<&AtomicBool>,
    ) -> Result<RunResult, RunError> {
        self.validate_params(params)?;
        let cancelled = || cancel.is_some_and(|flag| flag.load(Ordering::Relaxed));
        if cancelled() {
            return Err(RunError::Cancelled {
                params: params.clone(),
            });
        }

        let run_id = params.run_id();
        info!(run_id = %&run_id[..12], params = %params, bars = self.data.len(), "run started");

        let mut books: Vec<Book> = self.books.iter().map(Book::fresh).collect();
        let mut slots: Vec<Slot> = self
            .strategies
            .iter()
            .map(|s| Slot {
                strategy: s.clone_box(),
                state: StrategyState::Created,
                data: Arc::clone(&self.data),
                queue: Vec::new(),
            })
            .collect();

        // ─── Data extension ───
        for slot in &mut slots {
            let extended = guarded(|| slot.strategy.extend_data(&self.data, params))
                .and_then(|table| match table {
                    Some(table) if !table.is_extension_of(&self.data) => {
                        Err(StrategyError::BaseNotPreserved)
                    }
                    other => Ok(other),
                })
                .map_err(|e| hook_failure(&*slot.strategy, Hook::ExtendData, None, params, e))?;
            if let Some(table) = extended {
                slot.data = Arc::new(table);
            }
        }

        // ─── Init ───
        for (i, slot) in slots.iter_mut().enumerate() {
            let Slot {
                strategy,
                state,
                data,
                ..
            } = slot;
            let ctx = InitContext {
                data: data.slice(0..0),
                params,
                assets: &self.assets,
                book: &books[self.book_for(i)],
            };
            state
                .initialize()
                .and_then(|()| guarded(|| strategy.init(&ctx)))
                .map_err(|e| hook_failure(&**strategy, Hook::Init, None, params, e))?;
        }

        // ─── Bar loop ───
        let mut log = ExecutionLog::default();
        let mut quality = DataQuality::default();
        let timestamps = self.data.timestamps();

        for (t, &timestamp) in timestamps.iter().enumerate() {
            if cancelled() {
                info!(run_id = %&run_id[..12], bar = t, "run cancelled");
                return Err(RunError::Cancelled {
                    params: params.clone(),
                });
            }

            // Hooks, in strategy-list order. Books are read-only here.
            for (i, slot) in slots.iter_mut().enumerate() {
                let Slot {
                    strategy,
                    state,
                    data,
                    queue,
                } = slot;
                state
                    .enter_bar(t)
                    .map_err(|e| hook_failure(&**strategy, Hook::OnClose, Some(timestamp), params, e))?;

                let mut ctx = BarContext {
                    data: data.slice(0..t + 1),
                    bar: t,
                    timestamp,
                    params,
                    assets: &self.assets,
                    book: &books[self.book_for(i)],
                    orders: &mut *queue,
                };
                match guarded(|| strategy.on_close(&mut ctx)) {
                    Ok(()) => {}
                    Err(StrategyError::InsufficientData(e)) => {
                        debug!(strategy = strategy.name(), bar = t, error = %e, "bar skipped");
                        queue.clear();
                        log.diagnostics.push(Diagnostic {
                            timestamp,
                            bar: t,
                            strategy: i,
                            kind: DiagnosticKind::InsufficientData,
                            message: e.to_string(),
                        });
                    }
                    Err(e) => {
                        return Err(hook_failure(
                            &**strategy,
                            Hook::OnClose,
                            Some(timestamp),
                            params,
                            e,
                        ))
                    }
                }
            }

            // Execution: FIFO per strategy, strategies in list order.
            for (i, slot) in slots.iter_mut().enumerate() {
                if slot.queue.is_empty() {
                    continue;
                }
                let b = self.book_for(i);
                log.execute_queue(&mut slot.queue, i, b, &mut books[b], &self.assets, &self.data, t);
            }

            // Snapshot every book at this bar's close.
            let closes = reference_prices(&self.data, &self.assets, t);
            for asset in self.assets.iter() {
                quality.record(&asset.name, !closes.contains_key(&asset.name));
            }
            for book in &mut books {
                book.snapshot(timestamp, &closes).map_err(|source| {
                    warn!(book = book.name(), bar = t, error = %source, "run aborted");
                    RunError::Accounting {
                        timestamp,
                        params: params.clone(),
                        source,
                    }
                })?;
            }
        }

        for slot in &mut slots {
            slot.state.finish();
        }
        verify_books(&books);

        let void_bar_rates = quality.void_bar_rates();
        let data_quality_warnings = DataQuality::warnings(&void_bar_rates);
        for warning in &data_quality_warnings {
            warn!(run_id = %&run_id[..12], "{warning}");
        }

        let result = RunResult {
            run_id,
            params: params.clone(),
            books,
            orders: log.processed,
            diagnostics: log.diagnostics,
            bar_count: timestamps.len(),
            void_bar_rates,
            data_quality_warnings,
        };
        info!(
            run_id = %&result.run_id[..12],
            orders = result.orders.len(),
            final_total = %result.final_total(),
            "run finished"
        );
        Ok(result)
    }
}

/// Run a hook, turning a panic into `StrategyError::Panicked`.
fn guarded<T>(hook: impl FnOnce() -> Result<T, StrategyError>) -> Result<T, StrategyError> {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(StrategyError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn hook_failure(
    strategy: &dyn Strategy,
    hook: Hook,
    timestamp: Option<Timestamp>,
    params: &Params,
    source: StrategyError,
) -> RunError {
    warn!(strategy = strategy.name(), %hook, params = %params, error = %source, "run aborted");
    RunError::StrategyHook {
        strategy: strategy.name().to_string(),
        hook,
        timestamp,
        params: params.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnKey, OHLC_FIELDS};
    use crate::strategy::BuyAndHold;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn ts(d: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn table(closes: &[f64]) -> Arc<TimeSeriesTable> {
        let index = (1..=closes.len() as u32).map(ts).collect();
        let columns = OHLC_FIELDS
            .iter()
            .map(|f| (ColumnKey::new("AAA", *f), closes.to_vec()));
        Arc::new(TimeSeriesTable::from_columns(index, columns).unwrap())
    }

    fn runner(strategies: Vec<Box<dyn Strategy>>, books: Vec<Book>) -> Result<StrategyRunner, ConfigError> {
        StrategyRunner::new(
            table(&[10.0, 11.0, 12.0]),
            AssetRegistry::from_names(["AAA"]).unwrap(),
            strategies,
            books,
        )
    }

    #[test]
    fn rejects_empty_series() {
        let empty = Arc::new(
            TimeSeriesTable::from_columns(Vec::new(), Vec::<(ColumnKey, Vec<f64>)>::new()).unwrap(),
        );
        let err = StrategyRunner::new(
            empty,
            AssetRegistry::new(),
            vec![Box::new(BuyAndHold::new(1))],
            vec![Book::new("Main", dec!(100))],
        )
        .err()
        .unwrap();
        assert_eq!(err, ConfigError::EmptyTimeSeries);
    }

    #[test]
    fn rejects_mismatched_books() {
        let strategies: Vec<Box<dyn Strategy>> = vec![
            Box::new(BuyAndHold::new(1)),
            Box::new(BuyAndHold::new(1)),
            Box::new(BuyAndHold::new(1)),
        ];
        let books = vec![Book::new("A", dec!(1)), Book::new("B", dec!(1))];
        let err = runner(strategies, books).err().unwrap();
        assert_eq!(err, ConfigError::BookPairing { strategies: 3, books: 2 });
    }

    #[test]
    fn rejects_duplicate_book_names() {
        let strategies: Vec<Box<dyn Strategy>> =
            vec![Box::new(BuyAndHold::new(1)), Box::new(BuyAndHold::new(1))];
        let books = vec![Book::new("A", dec!(1)), Book::new("A", dec!(1))];
        let err = runner(strategies, books).err().unwrap();
        assert_eq!(err, ConfigError::DuplicateBook("A".into()));
    }

    #[test]
    fn rejects_missing_ohlc() {
        let err = StrategyRunner::new(
            table(&[1.0]),
            AssetRegistry::from_names(["AAA", "BBB"]).unwrap(),
            vec![Box::new(BuyAndHold::new(1))],
            vec![Book::new("Main", dec!(1))],
        )
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Table(_)));
    }

    #[test]
    fn buy_and_hold_snapshots_every_bar() {
        let runner = runner(
            vec![Box::new(BuyAndHold::new(10))],
            vec![Book::new("Main", dec!(1000))],
        )
        .unwrap();
        let result = runner.run(&Params::new()).unwrap();

        let book = &result.books[0];
        assert_eq!(result.bar_count, 3);
        assert_eq!(book.history().len(), 3);
        assert_eq!(book.cash(), dec!(900));
        assert_eq!(book.quantity("AAA"), dec!(10));
        assert_eq!(book.total_value(), dec!(1020));
        assert_eq!(result.orders.len(), 1);
        assert_eq!(result.orders[0].timestamp, ts(1));
    }

    #[test]
    fn runner_books_are_untouched_by_runs() {
        let runner = runner(
            vec![Box::new(BuyAndHold::new(10))],
            vec![Book::new("Main", dec!(1000))],
        )
        .unwrap();
        runner.run(&Params::new()).unwrap();
        let again = runner.run(&Params::new()).unwrap();
        assert!(runner.books()[0].history().is_empty());
        assert_eq!(again.books[0].history().len(), 3);
    }

    #[test]
    fn undeclared_params_are_a_config_error() {
        let runner = runner(
            vec![Box::new(BuyAndHold::new(10))],
            vec![Book::new("Main", dec!(1000))],
        )
        .unwrap();
        let err = runner.run(&Params::new().with("x", 1)).unwrap_err();
        assert!(matches!(
            err,
            RunError::Config(ConfigError::InvalidParams { .. })
        ));
    }

    #[test]
    fn preset_cancel_flag_returns_cancelled() {
        let runner = runner(
            vec![Box::new(BuyAndHold::new(10))],
            vec![Book::new("Main", dec!(1000))],
        )
        .unwrap();
        let flag = AtomicBool::new(true);
        let err = runner.run_with_cancel(&Params::new(), Some(&flag)).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
