//! Moving average crossover reference strategy.
//!
//! - Buys `size` when the short SMA crosses above the long SMA
//! - Sells `size` when the short SMA crosses below the long SMA
//!
//! Both averages are precomputed in `extend_data`; `on_close` only reads the
//! last two visible values of each.

use rust_decimal::Decimal;

use super::{BarContext, ParamError, Params, Strategy, StrategyError};
use crate::data::{ColumnKey, TailError, TimeSeriesTable, CLOSE};
use crate::domain::Order;

pub const DAYS_SHORT: &str = "days_short";
pub const DAYS_LONG: &str = "days_long";

pub const SMA_SHORT_FIELD: &str = "CloseSMAShort";
pub const SMA_LONG_FIELD: &str = "CloseSMALong";

/// Rolling mean over `period` values.
///
/// The first `period - 1` entries are NaN, as is any window containing a
/// NaN.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &entering) in values.iter().enumerate() {
        if entering.is_nan() {
            nan_count += 1;
        } else {
            sum += entering;
        }

        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }

        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }

    result
}

/// True when `a` crosses above `b` between the last two observations.
///
/// Both slices must hold at least two values; NaN never crosses.
pub fn crossover(a: &[f64], b: &[f64]) -> bool {
    if a.len() < 2 || b.len() < 2 {
        return false;
    }
    let (a_prev, a_now) = (a[a.len() - 2], a[a.len() - 1]);
    let (b_prev, b_now) = (b[b.len() - 2], b[b.len() - 1]);
    a_prev <= b_prev && a_now > b_now
}

#[derive(Debug, Clone)]
pub struct SmaCrossover {
    /// Restrict trading to these asset names; empty trades every
    /// registered asset.
    assets: Vec<String>,
    size: Decimal,
}

impl SmaCrossover {
    pub fn new(size: impl Into<Decimal>) -> Self {
        Self {
            assets: Vec::new(),
            size: size.into(),
        }
    }

    pub fn with_assets<I, S>(mut self, assets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assets = assets.into_iter().map(Into::into).collect();
        self
    }

    fn trades(&self, name: &str) -> bool {
        self.assets.is_empty() || self.assets.iter().any(|a| a == name)
    }
}

impl Default for SmaCrossover {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Strategy for SmaCrossover {
    fn name(&self) -> &str {
        "sma_crossover"
    }

    fn param_names(&self) -> Option<&[&'static str]> {
        Some(&[DAYS_SHORT, DAYS_LONG])
    }

    fn validate_params(&self, params: &Params) -> Result<(), ParamError> {
        params.get_period(DAYS_SHORT)?;
        params.get_period(DAYS_LONG)?;
        Ok(())
    }

    fn extend_data(
        &self,
        data: &TimeSeriesTable,
        params: &Params,
    ) -> Result<Option<TimeSeriesTable>, StrategyError> {
        let short = params.get_period(DAYS_SHORT)?;
        let long = params.get_period(DAYS_LONG)?;

        let mut columns = Vec::new();
        for asset in data.assets() {
            let Some(close) = data.column(&ColumnKey::new(asset, CLOSE)) else {
                continue;
            };
            columns.push((ColumnKey::new(asset, SMA_SHORT_FIELD), sma(close, short)));
            columns.push((ColumnKey::new(asset, SMA_LONG_FIELD), sma(close, long)));
        }

        Ok(Some(data.extend(columns)?))
    }

    fn on_close(&mut self, ctx: &mut BarContext<'_>) -> Result<(), StrategyError> {
        let data = ctx.data();
        let mut orders = Vec::new();

        for asset in ctx.assets().iter().filter(|a| self.trades(&a.name)) {
            let label = asset.data_label();
            let short_key = ColumnKey::new(label, SMA_SHORT_FIELD);
            let long_key = ColumnKey::new(label, SMA_LONG_FIELD);
            // Not enough warmed-up rows yet is normal; a missing column is not.
            let (short, long) = match (data.tail(&short_key, 2), data.tail(&long_key, 2)) {
                (Ok(short), Ok(long)) => (short, long),
                (Err(e @ TailError::Table(_)), _) | (_, Err(e @ TailError::Table(_))) => {
                    return Err(e.into())
                }
                _ => continue,
            };

            if crossover(short, long) {
                orders.push(Order::new(asset.name.as_str(), self.size));
            } else if crossover(long, short) {
                orders.push(Order::new(asset.name.as_str(), -self.size));
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
