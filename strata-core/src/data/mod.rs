//! Time-series store: aligned, columnar OHLC data keyed by `(asset, field)`.

pub mod align;
pub mod table;

pub use align::{align, RawBar};
pub use table::{
    ColumnKey, InsufficientDataError, TableError, TableView, TailError, TimeSeriesTable,
    Timestamp, CLOSE, HIGH, LOW, OHLC_FIELDS, OPEN, VOLUME,
};
