use rust_decimal::Decimal;

use super::{BarContext, Strategy, StrategyError};
use crate::domain::Order;

/// Buys a fixed size of every registered asset on the first bar with a
/// valid close, then holds.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    size: Decimal,
    bought: Vec<String>,
}

impl BuyAndHold {
    pub fn new(size: impl Into<Decimal>) -> Self {
        Self {
            size: size.into(),
            bought: Vec::new(),
        }
    }
}

impl Strategy for BuyAndHold {
    fn name(&self) -> &str {
        "buy_and_hold"
    }

    fn param_names(&self) -> Option<&[&'static str]> {
        Some(&[])
    }

    fn on_close(&mut self, ctx: &mut BarContext<'_>) -> Result<(), StrategyError> {
        let data = ctx.data();
        let mut orders = Vec::new();
        for asset in ctx.assets().iter() {
            if self.bought.contains(&asset.name) {
                continue;
            }
            if data.last(&asset.close_key()).is_some_and(|c| !c.is_nan()) {
                self.bought.push(asset.name.clone());
                orders.push(Order::new(asset.name.as_str(), self.size));
            }
        }
        for order in orders {
            ctx.submit(order);
        }
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn Strategy> {
        Box::new(self.clone())
    }
}
