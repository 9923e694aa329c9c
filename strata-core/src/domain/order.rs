use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Timestamp;

/// How an order's `size` is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeType {
    /// Units of the asset.
    #[default]
    Quantity,
    /// Currency amount; quantity = size / price.
    Notional,
    /// Percentage of the book's current cash; quantity = cash * size / 100 / price.
    BookPercent,
}

/// Intent to change a position, emitted by a strategy during one bar.
///
/// Positive size buys, negative size sells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub asset: String,
    pub size: Decimal,
    pub size_type: SizeType,
    pub label: Option<String>,
}

impl Order {
    pub fn new(asset: impl Into<String>, size: impl Into<Decimal>) -> Self {
        Self {
            asset: asset.into(),
            size: size.into(),
            size_type: SizeType::Quantity,
            label: None,
        }
    }

    pub fn notional(asset: impl Into<String>, amount: impl Into<Decimal>) -> Self {
        Self {
            size_type: SizeType::Notional,
            ..Self::new(asset, amount)
        }
    }

    pub fn book_percent(asset: impl Into<String>, percent: impl Into<Decimal>) -> Self {
        Self {
            size_type: SizeType::BookPercent,
            ..Self::new(asset, percent)
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Unrounded quantity this order represents at `price` given `cash`.
    ///
    /// `None` when the conversion divides by a zero price or the result
    /// does not fit a `Decimal`.
    pub fn quantity_at(&self, price: Decimal, cash: Decimal) -> Option<Decimal> {
        match self.size_type {
            SizeType::Quantity => Some(self.size),
            SizeType::Notional => self.size.checked_div(price),
            SizeType::BookPercent => cash
                .checked_mul(self.size)?
                .checked_div(Decimal::ONE_HUNDRED)?
                .checked_div(price),
        }
    }
}

/// Why an order was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    UnknownAsset,
    MissingPrice,
    ZeroQuantity,
    InsufficientFunds,
    /// Sizing or cash arithmetic did not fit a `Decimal`.
    Overflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderStatus {
    Complete,
    Rejected(RejectReason),
}

/// Entry in a run's processed-order log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedOrder {
    pub timestamp: Timestamp,
    pub bar: usize,
    /// Index of the emitting strategy in the runner's list.
    pub strategy: usize,
    /// Index of the book the order was routed to.
    pub book: usize,
    pub order: Order,
    pub status: OrderStatus,
}

impl ProcessedOrder {
    pub fn is_complete(&self) -> bool {
        self.status == OrderStatus::Complete
    }
}
