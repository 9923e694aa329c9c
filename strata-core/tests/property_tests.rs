//! Property tests for engine invariants.
//!
//! Uses proptest to verify:
//! 1. Cash conservation: post-run cash equals initial cash plus the signed
//!    sum of -(quantity × execution price) over executed orders, exactly
//! 2. Final total: the last snapshot's total equals cash plus every
//!    position valued at its last valid close
//! 3. Void bars: orders on a NaN close are always rejected
//! 4. Determinism: sequential and parallel batches produce identical results

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use strata_core::data::{ColumnKey, TimeSeriesTable, Timestamp, OHLC_FIELDS};
use strata_core::domain::{AssetRegistry, Book, Order, OrderStatus, RejectReason};
use strata_core::engine::RunResult;
use strata_core::strategy::{BarContext, Params, SmaCrossover, StrategyError};
use strata_core::StrategyRunner;

const ASSETS: [&str; 2] = ["AAA", "BBB"];

/// Emits a fixed schedule of orders: `(bar, asset index, size in cents)`.
#[derive(Debug, Clone)]
struct Scheduled {
    orders: Vec<(usize, usize, i64)>,
}

impl strata_core::Strategy for Scheduled {
    fn name(&self) -> &str {
        "scheduled"
    }

    fn on_close(&mut self, ctx: &mut BarContext<'_>) -> Result<(), StrategyError> {
        let bar = ctx.bar_index();
        let due: Vec<Order> = self
            .orders
            .iter()
            .filter(|(b, _, _)| *b == bar)
            .map(|&(_, asset, cents)| Order::new(ASSETS[asset], Decimal::new(cents, 2)))
            .collect();
        for order in due {
            ctx.submit(order);
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn strata_core::Strategy> {
        Box::new(self.clone())
    }
}

fn ts(i: usize) -> Timestamp {
    NaiveDate::from_ymd_opt(2023, 1, 2)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        + chrono::Duration::days(i as i64)
}

/// Prices in cents; `None` is a void bar.
fn build_table(prices: &[Vec<Option<i64>>]) -> Arc<TimeSeriesTable> {
    let n = prices[0].len();
    let mut columns = Vec::new();
    for (a, series) in prices.iter().enumerate() {
        let closes: Vec<f64> = series
            .iter()
            .map(|p| p.map_or(f64::NAN, |c| c as f64 / 100.0))
            .collect();
        for field in OHLC_FIELDS {
            columns.push((ColumnKey::new(ASSETS[a], field), closes.clone()));
        }
    }
    Arc::new(TimeSeriesTable::from_columns((0..n).map(ts).collect(), columns).unwrap())
}

fn run_schedule(prices: &[Vec<Option<i64>>], orders: Vec<(usize, usize, i64)>) -> RunResult {
    let runner = StrategyRunner::new(
        build_table(prices),
        AssetRegistry::from_names(ASSETS).unwrap(),
        vec![Box::new(Scheduled { orders })],
        vec![Book::new("Main", dec!(100000))],
    )
    .unwrap();
    runner.run(&Params::new()).unwrap()
}

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = Option<i64>> {
    prop_oneof![
        9 => (100_i64..50_000).prop_map(Some),
        1 => Just(None),
    ]
}

fn arb_market() -> impl Strategy<Value = (Vec<Vec<Option<i64>>>, Vec<(usize, usize, i64)>)> {
    (5_usize..40).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(arb_price(), n), 2),
            prop::collection::vec((0..n, 0_usize..2, -5_000_i64..5_000), 0..30),
        )
    })
}

// ── 1-3. Accounting ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn cash_is_conserved((prices, orders) in arb_market()) {
        let result = run_schedule(&prices, orders.clone());
        let book = &result.books[0];

        // Every executed order moves cash by exactly -(size × price).
        let mut expected = dec!(100000);
        for processed in result.orders.iter().filter(|o| o.is_complete()) {
            let asset = ASSETS.iter().position(|a| *a == processed.order.asset).unwrap();
            let cents = prices[asset][processed.bar].unwrap();
            expected -= processed.order.size * Decimal::new(cents, 2);
        }
        prop_assert_eq!(book.cash(), expected);

        let traded: Decimal = book.trades().iter().map(|t| t.total).sum();
        prop_assert_eq!(book.cash(), dec!(100000) + traded);
        prop_assert_eq!(result.orders.len(), orders.len());
    }

    #[test]
    fn final_total_marks_to_last_valid_close((prices, orders) in arb_market()) {
        let result = run_schedule(&prices, orders);
        let book = &result.books[0];
        let last = book.last_snapshot().unwrap();

        let mut mtm = Decimal::ZERO;
        for (a, name) in ASSETS.iter().enumerate() {
            let qty = book.quantity(name);
            if qty.is_zero() {
                continue;
            }
            let close = prices[a].iter().rev().find_map(|p| *p).unwrap();
            mtm += qty * Decimal::new(close, 2);
        }
        prop_assert_eq!(last.cash, book.cash());
        prop_assert_eq!(last.mtm, mtm);
        prop_assert_eq!(last.total, book.cash() + mtm);
        prop_assert_eq!(book.history().len(), prices[0].len());
    }

    #[test]
    fn void_bar_orders_are_rejected((prices, orders) in arb_market()) {
        let result = run_schedule(&prices, orders);
        for processed in &result.orders {
            let asset = ASSETS.iter().position(|a| *a == processed.order.asset).unwrap();
            let void = prices[asset][processed.bar].is_none();
            if void {
                prop_assert_eq!(
                    &processed.status,
                    &OrderStatus::Rejected(RejectReason::MissingPrice)
                );
            } else if processed.order.size.is_zero() {
                prop_assert_eq!(
                    &processed.status,
                    &OrderStatus::Rejected(RejectReason::ZeroQuantity)
                );
            } else {
                prop_assert!(processed.is_complete());
            }
        }
    }
}

// ── 4. Determinism ───────────────────────────────────────────────────

fn sma_grid() -> Vec<Params> {
    let mut sets = Vec::new();
    for short in [2, 3, 5] {
        for long in [6, 8, 13] {
            sets.push(Params::new().with("days_short", short).with("days_long", long));
        }
    }
    sets
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn parallel_batch_matches_sequential(
        prices in prop::collection::vec(prop::collection::vec(arb_price(), 40), 2)
    ) {
        let runner = StrategyRunner::new(
            build_table(&prices),
            AssetRegistry::from_names(ASSETS).unwrap(),
            vec![Box::new(SmaCrossover::new(10))],
            vec![Book::new("Main", dec!(100000))],
        )
        .unwrap();
        let sets = sma_grid();

        let sequential: Vec<RunResult> = runner
            .run_batch(&sets, 1)
            .unwrap()
            .into_iter()
            .map(Result::unwrap)
            .collect();
        let parallel: Vec<RunResult> = runner
            .run_batch(&sets, 4)
            .unwrap()
            .into_iter()
            .map(Result::unwrap)
            .collect();

        prop_assert_eq!(&sequential, &parallel);
        for (result, params) in sequential.iter().zip(&sets) {
            prop_assert_eq!(&result.params, params);
        }

        let by_id: BTreeMap<&str, &RunResult> =
            sequential.iter().map(|r| (r.run_id.as_str(), r)).collect();
        prop_assert_eq!(by_id.len(), sets.len());
    }
}
