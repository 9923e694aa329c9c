//! Trade: one executed order applied to a book.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::Timestamp;

/// An executed order: the quantity that moved and the price it moved at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: Timestamp,
    pub asset: String,
    /// Signed, rounded quantity.
    pub quantity: Decimal,
    /// Rounded reference price.
    pub price: Decimal,
    /// Cash impact: `-(quantity * price)`. [`Trade::new`] returns `None`
    /// when this does not fit a `Decimal`.
    pub total: Decimal,
    pub label: Option<String>,
}

impl Trade {
    pub fn new(
        timestamp: Timestamp,
        asset: impl Into<String>,
        quantity: Decimal,
        price: Decimal,
        label: Option<String>,
    ) -> Option<Self> {
        let total = -quantity.checked_mul(price)?;
        Some(Self {
            timestamp,
            asset: asset.into(),
            quantity,
            price,
            total,
            label,
        })
    }
}
