//! Run diagnostics, result types and the book-history table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Timestamp;
use crate::domain::{Book, ProcessedOrder, RejectReason, Trade};
use crate::strategy::Params;

/// Data quality threshold: warn if void bar rate exceeds this fraction.
pub const VOID_BAR_RATE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticKind {
    UnknownAsset,
    MissingPrice,
    ZeroQuantity,
    InsufficientFunds,
    InsufficientData,
    Overflow,
}

impl From<RejectReason> for DiagnosticKind {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::UnknownAsset => DiagnosticKind::UnknownAsset,
            RejectReason::MissingPrice => DiagnosticKind::MissingPrice,
            RejectReason::ZeroQuantity => DiagnosticKind::ZeroQuantity,
            RejectReason::InsufficientFunds => DiagnosticKind::InsufficientFunds,
            RejectReason::Overflow => DiagnosticKind::Overflow,
        }
    }
}

/// A recoverable condition observed during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub timestamp: Timestamp,
    pub bar: usize,
    /// Index of the strategy involved.
    pub strategy: usize,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Result of one complete run. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// BLAKE3 hash of the canonical parameter encoding.
    pub run_id: String,
    pub params: Params,
    /// Final books, in the runner's book order.
    pub books: Vec<Book>,
    /// Every order emitted during the run, with its final status.
    pub orders: Vec<ProcessedOrder>,
    pub diagnostics: Vec<Diagnostic>,
    /// Total number of bars processed.
    pub bar_count: usize,
    /// Void bar rate per asset (fraction 0.0 to 1.0).
    pub void_bar_rates: BTreeMap<String, f64>,
    /// Data quality warnings (e.g., "SPY: 12% void bars exceeds 10% threshold").
    pub data_quality_warnings: Vec<String>,
}

impl RunResult {
    pub fn book(&self, name: &str) -> Option<&Book> {
        self.books.iter().find(|b| b.name() == name)
    }

    /// Sum of every book's final total value, saturating at the `Decimal`
    /// bounds.
    pub fn final_total(&self) -> Decimal {
        self.books
            .iter()
            .map(Book::total_value)
            .fold(Decimal::ZERO, Decimal::saturating_add)
    }

    pub fn trades(&self) -> impl Iterator<Item = &Trade> {
        self.books.iter().flat_map(|b| b.trades().iter())
    }

    pub fn rejected_orders(&self) -> impl Iterator<Item = &ProcessedOrder> {
        self.orders.iter().filter(|o| !o.is_complete())
    }

    /// Time-indexed table of cash, per-asset position, mark-to-market and
    /// total for every book.
    pub fn book_history(&self) -> BookHistory {
        BookHistory::from_books(&self.books)
    }
}

/// One column of the book-history table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HistoryField {
    Cash,
    Position(String),
    Mtm,
    Total,
}

impl fmt::Display for HistoryField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryField::Cash => f.write_str("cash"),
            HistoryField::Position(asset) => write!(f, "position.{asset}"),
            HistoryField::Mtm => f.write_str("mtm"),
            HistoryField::Total => f.write_str("total"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryColumn {
    pub book: String,
    pub field: HistoryField,
    pub values: Vec<Decimal>,
}

/// Book snapshots pivoted into columns sharing one timestamp index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookHistory {
    pub timestamps: Vec<Timestamp>,
    pub columns: Vec<HistoryColumn>,
}

impl BookHistory {
    pub fn from_books(books: &[Book]) -> Self {
        let timestamps = books
            .first()
            .map(|b| b.history().iter().map(|s| s.timestamp).collect())
            .unwrap_or_default();

        let mut columns = Vec::new();
        for book in books {
            let history = book.history();
            let assets: BTreeSet<&String> = history.iter().flat_map(|s| s.positions.keys()).collect();

            let mut push = |field: HistoryField, values: Vec<Decimal>| {
                columns.push(HistoryColumn {
                    book: book.name().to_string(),
                    field,
                    values,
                });
            };

            push(HistoryField::Cash, history.iter().map(|s| s.cash).collect());
            for asset in assets {
                let values = history
                    .iter()
                    .map(|s| s.positions.get(asset).copied().unwrap_or(Decimal::ZERO))
                    .collect();
                push(HistoryField::Position(asset.clone()), values);
            }
            push(HistoryField::Mtm, history.iter().map(|s| s.mtm).collect());
            push(HistoryField::Total, history.iter().map(|s| s.total).collect());
        }

        Self {
            timestamps,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn column(&self, book: &str, field: &HistoryField) -> Option<&[Decimal]> {
        self.columns
            .iter()
            .find(|c| c.book == book && &c.field == field)
            .map(|c| c.values.as_slice())
    }
}

/// Per-asset void bar counting for data quality reporting.
#[derive(Debug, Default)]
pub(crate) struct DataQuality {
    void_bars: BTreeMap<String, usize>,
    total_bars: BTreeMap<String, usize>,
}

impl DataQuality {
    pub(crate) fn record(&mut self, asset: &str, is_void: bool) {
        *self.total_bars.entry(asset.to_string()).or_default() += 1;
        if is_void {
            *self.void_bars.entry(asset.to_string()).or_default() += 1;
        }
    }

    pub(crate) fn void_bar_rates(&self) -> BTreeMap<String, f64> {
        self.total_bars
            .iter()
            .map(|(asset, &total)| {
                let void_count = self.void_bars.get(asset).copied().unwrap_or(0);
                let rate = if total > 0 {
                    void_count as f64 / total as f64
                } else {
                    0.0
                };
                (asset.clone(), rate)
            })
            .collect()
    }

    pub(crate) fn warnings(rates: &BTreeMap<String, f64>) -> Vec<String> {
        rates
            .iter()
            .filter(|(_, &rate)| rate > VOID_BAR_RATE_THRESHOLD)
            .map(|(asset, rate)| {
                format!(
                    "{asset}: {:.0}% void bars exceeds {:.0}% threshold",
                    rate * 100.0,
                    VOID_BAR_RATE_THRESHOLD * 100.0
                )
            })
            .collect()
    }
}

/// Verify the cash identity: cash == initial cash + sum of trade cash moves.
///
/// Panics in debug mode if the identity is violated.
pub(crate) fn verify_books(books: &[Book]) {
    #[cfg(debug_assertions)]
    {
        for book in books {
            let expected = book
                .trades()
                .iter()
                .try_fold(book.initial_cash(), |cash, t| cash.checked_add(t.total));
            assert_eq!(
                Some(book.cash()),
                expected,
                "cash accounting violated in book '{}'",
                book.name()
            );
        }
    }
    #[cfg(not(debug_assertions))]
    let _ = books;
}
