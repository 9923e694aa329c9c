//! Columnar, timestamp-indexed price table.
//!
//! Columns are keyed by `(asset, field)` and stored as `Arc<[f64]>` so that
//! extending a table with derived columns never copies or mutates the base
//! data. Missing bars are NaN; nothing is forward-filled.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::AssetRegistry;

/// Bar timestamp. Daily data uses midnight.
pub type Timestamp = NaiveDateTime;

pub const OPEN: &str = "Open";
pub const HIGH: &str = "High";
pub const LOW: &str = "Low";
pub const CLOSE: &str = "Close";
pub const VOLUME: &str = "Volume";

/// Fields every tradable asset must provide.
pub const OHLC_FIELDS: [&str; 4] = [OPEN, HIGH, LOW, CLOSE];

/// Two-level column key: `(asset, field)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnKey {
    pub asset: String,
    pub field: String,
}

impl ColumnKey {
    pub fn new(asset: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            asset: asset.into(),
            field: field.into(),
        }
    }

    pub fn close(asset: impl Into<String>) -> Self {
        Self::new(asset, CLOSE)
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.asset, self.field)
    }
}

/// Errors raised while building or extending a table.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    #[error("timestamps not strictly increasing at row {row}: {previous} then {current}")]
    Unordered {
        row: usize,
        previous: Timestamp,
        current: Timestamp,
    },

    #[error("column {key} has {actual} rows but the index has {expected}")]
    LengthMismatch {
        key: ColumnKey,
        expected: usize,
        actual: usize,
    },

    #[error("column {0} already exists")]
    DuplicateColumn(ColumnKey),

    #[error("asset '{asset}' is missing required field '{field}'")]
    MissingField { asset: String, field: String },

    #[error("asset '{asset}' has two bars at {timestamp}")]
    DuplicateBar { asset: String, timestamp: Timestamp },

    #[error("no column {0}")]
    MissingColumn(ColumnKey),
}

/// Fewer rows are visible than a computation needs.
///
/// Strategies are expected to treat this as "not enough history yet" and
/// skip the bar.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("insufficient data for {key}: need {required} rows, {available} visible")]
pub struct InsufficientDataError {
    pub key: ColumnKey,
    pub required: usize,
    pub available: usize,
}

/// Failure of [`TableView::tail`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TailError {
    #[error(transparent)]
    Table(#[from] TableError),

    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),
}

/// Aligned multi-asset table. Immutable once built.
#[derive(Debug, Clone)]
pub struct TimeSeriesTable {
    index: Arc<[Timestamp]>,
    columns: BTreeMap<ColumnKey, Arc<[f64]>>,
}

impl TimeSeriesTable {
    /// Build a table from an index and a set of columns.
    ///
    /// The index must be strictly increasing and every column must have
    /// exactly one value per index row.
    pub fn from_columns<I>(index: Vec<Timestamp>, columns: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (ColumnKey, Vec<f64>)>,
    {
        for (row, pair) in index.windows(2).enumerate() {
            if pair[0] >= pair[1] {
                return Err(TableError::Unordered {
                    row: row + 1,
                    previous: pair[0],
                    current: pair[1],
                });
            }
        }

        let mut table = Self {
            index: index.into(),
            columns: BTreeMap::new(),
        };
        table.insert_all(columns)?;
        Ok(table)
    }

    /// Return a new table with `columns` appended.
    ///
    /// Existing columns are shared with `self`, never copied or replaced.
    pub fn extend<I>(&self, columns: I) -> Result<Self, TableError>
    where
        I: IntoIterator<Item = (ColumnKey, Vec<f64>)>,
    {
        let mut table = self.clone();
        table.insert_all(columns)?;
        Ok(table)
    }

    fn insert_all<I>(&mut self, columns: I) -> Result<(), TableError>
    where
        I: IntoIterator<Item = (ColumnKey, Vec<f64>)>,
    {
        for (key, values) in columns {
            if values.len() != self.index.len() {
                return Err(TableError::LengthMismatch {
                    key,
                    expected: self.index.len(),
                    actual: values.len(),
                });
            }
            if self.columns.contains_key(&key) {
                return Err(TableError::DuplicateColumn(key));
            }
            self.columns.insert(key, values.into());
        }
        Ok(())
    }

    /// True when `self` carries the same index and every column of `base`
    /// unchanged (pointer-identical storage).
    pub fn is_extension_of(&self, base: &TimeSeriesTable) -> bool {
        Arc::ptr_eq(&self.index, &base.index)
            && base.columns.iter().all(|(key, values)| {
                self.columns
                    .get(key)
                    .is_some_and(|own| Arc::ptr_eq(own, values))
            })
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.index
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&[f64]> {
        self.columns.get(key).map(|c| &c[..])
    }

    pub fn contains(&self, key: &ColumnKey) -> bool {
        self.columns.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ColumnKey> {
        self.columns.keys()
    }

    /// Distinct asset keys, sorted.
    pub fn assets(&self) -> Vec<&str> {
        let mut assets: Vec<&str> = self.columns.keys().map(|k| k.asset.as_str()).collect();
        assets.dedup();
        assets
    }

    /// Value at `(key, row)`, NaN included.
    pub fn value(&self, key: &ColumnKey, row: usize) -> Option<f64> {
        self.columns.get(key).and_then(|c| c.get(row).copied())
    }

    /// Read-only view over a row range. Out-of-range bounds are clamped.
    pub fn slice(&self, rows: Range<usize>) -> TableView<'_> {
        let end = rows.end.min(self.len());
        let start = rows.start.min(end);
        TableView {
            table: self,
            start,
            end,
        }
    }

    /// Point-in-time view: every row with timestamp `<= t`.
    pub fn as_of(&self, t: Timestamp) -> TableView<'_> {
        let end = self.index.partition_point(|ts| *ts <= t);
        self.slice(0..end)
    }

    pub fn view(&self) -> TableView<'_> {
        self.slice(0..self.len())
    }

    /// Check that every registered asset provides Open, High, Low and Close.
    pub fn validate_ohlc(&self, registry: &AssetRegistry) -> Result<(), TableError> {
        for asset in registry.iter() {
            for field in OHLC_FIELDS {
                if !self.contains(&ColumnKey::new(asset.data_label(), field)) {
                    return Err(TableError::MissingField {
                        asset: asset.data_label().to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Borrowed window over a contiguous row range of a table.
///
/// A view never exposes rows outside its range; strategies only ever see
/// the bars up to the one being processed.
#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    table: &'a TimeSeriesTable,
    start: usize,
    end: usize,
}

impl<'a> TableView<'a> {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn timestamps(&self) -> &'a [Timestamp] {
        &self.table.index[self.start..self.end]
    }

    /// Timestamp of the last visible row.
    pub fn timestamp(&self) -> Option<Timestamp> {
        self.timestamps().last().copied()
    }

    pub fn keys(&self) -> impl Iterator<Item = &'a ColumnKey> {
        self.table.keys()
    }

    pub fn column(&self, key: &ColumnKey) -> Option<&'a [f64]> {
        let table: &'a TimeSeriesTable = self.table;
        table.column(key).map(|c| &c[self.start..self.end])
    }

    pub fn series(&self, asset: &str, field: &str) -> Option<&'a [f64]> {
        self.column(&ColumnKey::new(asset, field))
    }

    pub fn last(&self, key: &ColumnKey) -> Option<f64> {
        self.column(key).and_then(|c| c.last().copied())
    }

    /// The last `n` visible values of a column.
    ///
    /// A column the table does not have is a [`TableError::MissingColumn`];
    /// fewer than `n` visible rows is an [`InsufficientDataError`].
    pub fn tail(&self, key: &ColumnKey, n: usize) -> Result<&'a [f64], TailError> {
        let column = self
            .column(key)
            .ok_or_else(|| TableError::MissingColumn(key.clone()))?;
        if column.len() < n {
            return Err(InsufficientDataError {
                key: key.clone(),
                required: n,
                available: column.len(),
            }
            .into());
        }
        Ok(&column[column.len() - n..])
    }
}
