//! Book: cash balance, positions and per-bar history for one run.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::position::Position;
use super::trade::Trade;
use crate::data::Timestamp;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookError {
    #[error("book '{book}' cannot take a {required} cash move: cash {cash}, floor {floor}")]
    InsufficientFunds {
        book: String,
        required: Decimal,
        cash: Decimal,
        floor: Decimal,
    },
    #[error("arithmetic overflow in book '{book}': {detail}")]
    Overflow { book: String, detail: String },
}

/// Book state recorded at the end of one bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub timestamp: Timestamp,
    pub cash: Decimal,
    pub positions: BTreeMap<String, Decimal>,
    /// Mark-to-market value of all positions.
    pub mtm: Decimal,
    /// `cash + mtm`.
    pub total: Decimal,
}

/// Cash and positions owned by exactly one run.
///
/// Cash only moves through [`Book::apply`]; the mark-to-market total only
/// moves through trades and revaluation in [`Book::snapshot`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    name: String,
    initial_cash: Decimal,
    cash: Decimal,
    cash_floor: Option<Decimal>,
    positions: BTreeMap<String, Position>,
    trades: Vec<Trade>,
    history: Vec<BookSnapshot>,
    /// Last valid mark per asset, carried across void bars.
    marks: BTreeMap<String, Decimal>,
}

impl Book {
    pub fn new(name: impl Into<String>, cash: Decimal) -> Self {
        Self {
            name: name.into(),
            initial_cash: cash,
            cash,
            cash_floor: None,
            positions: BTreeMap::new(),
            trades: Vec::new(),
            history: Vec::new(),
            marks: BTreeMap::new(),
        }
    }

    /// Reject trades that would take cash below `floor`.
    pub fn with_cash_floor(mut self, floor: Decimal) -> Self {
        self.cash_floor = Some(floor);
        self
    }

    /// A book with the same name, starting cash and limits but no activity.
    pub fn fresh(&self) -> Self {
        Self {
            cash_floor: self.cash_floor,
            ..Self::new(self.name.clone(), self.initial_cash)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn initial_cash(&self) -> Decimal {
        self.initial_cash
    }

    pub fn cash_floor(&self) -> Option<Decimal> {
        self.cash_floor
    }

    /// Signed quantity held in `asset`; zero when never traded.
    pub fn quantity(&self, asset: &str) -> Decimal {
        self.positions
            .get(asset)
            .map_or(Decimal::ZERO, |p| p.quantity)
    }

    pub fn position(&self, asset: &str) -> Option<&Position> {
        self.positions.get(asset)
    }

    pub fn positions(&self) -> impl Iterator<Item = (&str, &Position)> {
        self.positions.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn history(&self) -> &[BookSnapshot] {
        &self.history
    }

    pub fn last_snapshot(&self) -> Option<&BookSnapshot> {
        self.history.last()
    }

    /// Final total value, or cash when nothing was snapshotted.
    pub fn total_value(&self) -> Decimal {
        self.history.last().map_or(self.cash, |s| s.total)
    }

    /// Apply an executed trade: cash moves by `trade.total`, the position by
    /// `trade.quantity`. On rejection the book is unchanged.
    pub fn apply(&mut self, trade: Trade) -> Result<&Trade, BookError> {
        let cash = self.cash.checked_add(trade.total).ok_or_else(|| {
            self.overflow(format!("cash {} moved by {}", self.cash, trade.total))
        })?;
        let position = self
            .positions
            .get(&trade.asset)
            .cloned()
            .unwrap_or_default()
            .after_trade(trade.quantity, trade.price)
            .ok_or_else(|| {
                self.overflow(format!("position in {} moved by {}", trade.asset, trade.quantity))
            })?;

        if let Some(floor) = self.cash_floor {
            if trade.total < Decimal::ZERO && cash < floor {
                return Err(BookError::InsufficientFunds {
                    book: self.name.clone(),
                    required: trade.total,
                    cash: self.cash,
                    floor,
                });
            }
        }

        self.cash = cash;
        self.positions.insert(trade.asset.clone(), position);
        self.trades.push(trade);
        Ok(&self.trades[self.trades.len() - 1])
    }

    fn overflow(&self, detail: String) -> BookError {
        BookError::Overflow {
            book: self.name.clone(),
            detail,
        }
    }

    /// Record cash, positions and mark-to-market at `timestamp`.
    ///
    /// `closes` holds the valid closing price of each asset at this bar.
    /// Assets missing from it are marked at their last valid close, or at
    /// their last trade price when no close was ever seen.
    ///
    /// Fails with [`BookError::Overflow`] when the valuation does not fit a
    /// `Decimal`; no snapshot is recorded in that case.
    pub fn snapshot(
        &mut self,
        timestamp: Timestamp,
        closes: &HashMap<String, Decimal>,
    ) -> Result<(), BookError> {
        for (asset, price) in closes {
            if self.positions.contains_key(asset) {
                self.marks.insert(asset.clone(), *price);
            }
        }

        let mut mtm = Decimal::ZERO;
        let mut positions = BTreeMap::new();
        for (asset, position) in &self.positions {
            let mark = self
                .marks
                .get(asset)
                .copied()
                .unwrap_or(position.last_trade_price);
            mtm = position
                .market_value(mark)
                .and_then(|value| mtm.checked_add(value))
                .ok_or_else(|| self.overflow(format!("marking {asset} at {mark}")))?;
            positions.insert(asset.clone(), position.quantity);
        }
        let total = self
            .cash
            .checked_add(mtm)
            .ok_or_else(|| self.overflow(format!("cash {} plus mtm {mtm}", self.cash)))?;

        self.history.push(BookSnapshot {
            timestamp,
            cash: self.cash,
            positions,
            mtm,
            total,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn ts(d: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn closes(pairs: &[(&str, Decimal)]) -> HashMap<String, Decimal> {
        pairs.iter().map(|(a, p)| (a.to_string(), *p)).collect()
    }

    #[test]
    fn apply_moves_cash_and_position() {
        let mut book = Book::new("Main", dec!(100000));
        book.apply(Trade::new(ts(1), "GOOG", dec!(-100), dec!(150.25), None).unwrap())
            .unwrap();
        assert_eq!(book.cash(), dec!(115025.00));
        assert_eq!(book.quantity("GOOG"), dec!(-100));
        assert_eq!(book.trades().len(), 1);
    }

    #[test]
    fn negative_cash_allowed_by_default() {
        let mut book = Book::new("Main", dec!(100));
        book.apply(Trade::new(ts(1), "GOOG", dec!(10), dec!(50), None).unwrap())
            .unwrap();
        assert_eq!(book.cash(), dec!(-400));
    }

    #[test]
    fn cash_floor_rejects_and_leaves_book_unchanged() {
        let mut book = Book::new("Main", dec!(1000)).with_cash_floor(Decimal::ZERO);
        let err = book
            .apply(Trade::new(ts(1), "GOOG", dec!(30), dec!(50), None).unwrap())
            .unwrap_err();
        assert!(matches!(err, BookError::InsufficientFunds { .. }));
        assert_eq!(book.cash(), dec!(1000));
        assert_eq!(book.quantity("GOOG"), Decimal::ZERO);
        assert!(book.trades().is_empty());

        // Sells are never blocked by the floor.
        book.apply(Trade::new(ts(1), "GOOG", dec!(-30), dec!(50), None).unwrap())
            .unwrap();
        assert_eq!(book.cash(), dec!(2500));
    }

    #[test]
    fn snapshot_marks_to_close() {
        let mut book = Book::new("Main", dec!(1000));
        book.apply(Trade::new(ts(1), "A", dec!(10), dec!(20), None).unwrap())
            .unwrap();
        book.snapshot(ts(1), &closes(&[("A", dec!(20))])).unwrap();
        book.snapshot(ts(2), &closes(&[("A", dec!(25))])).unwrap();

        let last = book.last_snapshot().unwrap();
        assert_eq!(last.cash, dec!(800));
        assert_eq!(last.mtm, dec!(250));
        assert_eq!(last.total, dec!(1050));
        assert_eq!(last.positions.get("A"), Some(&dec!(10)));
        assert_eq!(book.history().len(), 2);
    }

    #[test]
    fn void_bar_carries_last_valid_close() {
        let mut book = Book::new("Main", dec!(1000));
        book.apply(Trade::new(ts(1), "A", dec!(10), dec!(20), None).unwrap())
            .unwrap();
        book.snapshot(ts(1), &closes(&[("A", dec!(22))])).unwrap();
        book.snapshot(ts(2), &closes(&[])).unwrap();
        assert_eq!(book.last_snapshot().unwrap().mtm, dec!(220));
    }

    #[test]
    fn never_priced_asset_uses_trade_price() {
        let mut book = Book::new("Main", dec!(1000));
        book.apply(Trade::new(ts(1), "A", dec!(2), dec!(30), None).unwrap())
            .unwrap();
        book.snapshot(ts(1), &closes(&[])).unwrap();
        let snap = book.last_snapshot().unwrap();
        assert_eq!(snap.mtm, dec!(60));
        assert_eq!(snap.total, dec!(1000));
    }

    #[test]
    fn fresh_resets_activity() {
        let mut book = Book::new("Main", dec!(500)).with_cash_floor(dec!(-100));
        book.apply(Trade::new(ts(1), "A", dec!(1), dec!(10), None).unwrap())
            .unwrap();
        book.snapshot(ts(1), &closes(&[])).unwrap();

        let fresh = book.fresh();
        assert_eq!(fresh.name(), "Main");
        assert_eq!(fresh.cash(), dec!(500));
        assert_eq!(fresh.cash_floor(), Some(dec!(-100)));
        assert!(fresh.history().is_empty());
        assert!(fresh.trades().is_empty());
        assert_eq!(fresh.total_value(), dec!(500));
    }

    #[test]
    fn overflow_rejects_trade_and_leaves_book_unchanged() {
        let mut book = Book::new("Main", Decimal::MAX - dec!(10));
        let trade = Trade::new(ts(1), "A", dec!(-5), dec!(10), None).unwrap();
        let err = book.apply(trade).unwrap_err();
        assert!(matches!(err, BookError::Overflow { .. }));
        assert_eq!(book.cash(), Decimal::MAX - dec!(10));
        assert!(book.position("A").is_none());
        assert!(book.trades().is_empty());
    }

    #[test]
    fn snapshot_overflow_is_an_error() {
        let mut book = Book::new("Main", Decimal::ZERO);
        book.apply(Trade::new(ts(1), "A", Decimal::MAX / dec!(100), dec!(1), None).unwrap())
            .unwrap();
        let err = book
            .snapshot(ts(2), &closes(&[("A", dec!(1000))]))
            .unwrap_err();
        assert!(matches!(err, BookError::Overflow { .. }));
        assert!(book.history().is_empty());
    }
}
