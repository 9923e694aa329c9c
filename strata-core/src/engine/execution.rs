//! Order execution at the bar's close.
//!
//! Orders are applied one at a time, FIFO, against the book at the
//! reference price (the asset's close at the current row, rounded to the
//! asset's price decimals). Rejected orders leave the book untouched and are
//! reported, never raised.

use std::collections::HashMap;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::debug;

use super::state::Diagnostic;
use crate::data::TimeSeriesTable;
use crate::domain::{
    Asset, AssetError, AssetRegistry, Book, BookError, Order, OrderStatus, ProcessedOrder,
    RejectReason, Trade,
};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("no valid close for '{asset}'")]
    MissingPrice { asset: String },

    #[error("order for '{asset}' rounds to zero quantity")]
    ZeroQuantity { asset: String },

    #[error("order for '{asset}' overflows its sizing or cash arithmetic")]
    Overflow { asset: String },

    #[error(transparent)]
    Book(#[from] BookError),
}

impl ExecutionError {
    pub fn reason(&self) -> RejectReason {
        match self {
            ExecutionError::Asset(_) => RejectReason::UnknownAsset,
            ExecutionError::MissingPrice { .. } => RejectReason::MissingPrice,
            ExecutionError::ZeroQuantity { .. } => RejectReason::ZeroQuantity,
            ExecutionError::Overflow { .. } | ExecutionError::Book(BookError::Overflow { .. }) => {
                RejectReason::Overflow
            }
            ExecutionError::Book(BookError::InsufficientFunds { .. }) => {
                RejectReason::InsufficientFunds
            }
        }
    }
}

/// Close of `asset` at `row`, rounded. `None` on void bars.
pub fn reference_price(data: &TimeSeriesTable, asset: &Asset, row: usize) -> Option<Decimal> {
    let close = data.value(&asset.close_key(), row)?;
    if !close.is_finite() {
        return None;
    }
    Decimal::from_f64(close).map(|p| asset.round_price(p))
}

/// Reference prices of every registered asset with a valid close at `row`,
/// keyed by asset name.
pub fn reference_prices(
    data: &TimeSeriesTable,
    assets: &AssetRegistry,
    row: usize,
) -> HashMap<String, Decimal> {
    assets
        .iter()
        .filter_map(|asset| reference_price(data, asset, row).map(|p| (asset.name.clone(), p)))
        .collect()
}

/// Execute one order against `book` at `row`.
pub fn execute_order(
    order: &Order,
    book: &mut Book,
    assets: &AssetRegistry,
    data: &TimeSeriesTable,
    row: usize,
) -> Result<Trade, ExecutionError> {
    let asset = assets.lookup(&order.asset)?;
    let missing = || ExecutionError::MissingPrice {
        asset: order.asset.clone(),
    };
    let price = reference_price(data, asset, row).ok_or_else(missing)?;
    let timestamp = data.timestamps().get(row).copied().ok_or_else(missing)?;

    let overflow = || ExecutionError::Overflow {
        asset: order.asset.clone(),
    };

    let quantity = match order.quantity_at(price, book.cash()) {
        Some(q) => asset.round_quantity(q),
        None if price.is_zero() => Decimal::ZERO,
        None => return Err(overflow()),
    };
    if quantity.is_zero() {
        return Err(ExecutionError::ZeroQuantity {
            asset: order.asset.clone(),
        });
    }

    let trade = Trade::new(timestamp, asset.name.as_str(), quantity, price, order.label.clone())
        .ok_or_else(overflow)?;
    Ok(book.apply(trade)?.clone())
}

/// Processed-order log and diagnostics accumulated over a run.
#[derive(Debug, Default)]
pub struct ExecutionLog {
    pub processed: Vec<ProcessedOrder>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExecutionLog {
    /// Execute a strategy's queued orders in FIFO order, draining the queue.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_queue(
        &mut self,
        queue: &mut Vec<Order>,
        strategy: usize,
        book_index: usize,
        book: &mut Book,
        assets: &AssetRegistry,
        data: &TimeSeriesTable,
        row: usize,
    ) {
        let Some(&timestamp) = data.timestamps().get(row) else {
            return;
        };

        for order in queue.drain(..) {
            let status = match execute_order(&order, book, assets, data, row) {
                Ok(_) => OrderStatus::Complete,
                Err(err) => {
                    debug!(
                        asset = %order.asset,
                        size = %order.size,
                        bar = row,
                        error = %err,
                        "order dropped"
                    );
                    let reason = err.reason();
                    self.diagnostics.push(Diagnostic {
                        timestamp,
                        bar: row,
                        strategy,
                        kind: reason.into(),
                        message: err.to_string(),
                    });
                    OrderStatus::Rejected(reason)
                }
            };
            self.processed.push(ProcessedOrder {
                timestamp,
                bar: row,
                strategy,
                book: book_index,
                order,
                status,
            });
        }
    }
}
