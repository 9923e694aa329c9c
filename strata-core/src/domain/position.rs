use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Signed holding in one asset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub quantity: Decimal,
    /// Price of the most recent trade in this asset.
    pub last_trade_price: Decimal,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// Value at `current_price`; `None` when it does not fit a `Decimal`.
    pub fn market_value(&self, current_price: Decimal) -> Option<Decimal> {
        self.quantity.checked_mul(current_price)
    }

    /// The position after trading `quantity` at `price`, or `None` on
    /// overflow. `self` is left untouched either way.
    pub fn after_trade(&self, quantity: Decimal, price: Decimal) -> Option<Position> {
        Some(Position {
            quantity: self.quantity.checked_add(quantity)?,
            last_trade_price: price,
        })
    }
}
