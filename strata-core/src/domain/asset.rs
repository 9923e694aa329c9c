use std::collections::HashMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::ColumnKey;

/// Tradable instrument metadata. Assets carry no mutable state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub name: String,
    /// Decimal places for reference prices.
    pub price_dp: u32,
    /// Decimal places for order quantities.
    pub quantity_dp: u32,
    /// Asset key in the table, when it differs from `name`.
    pub data_label: Option<String>,
}

impl Asset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            price_dp: 2,
            quantity_dp: 2,
            data_label: None,
        }
    }

    pub fn with_price_dp(mut self, dp: u32) -> Self {
        self.price_dp = dp;
        self
    }

    pub fn with_quantity_dp(mut self, dp: u32) -> Self {
        self.quantity_dp = dp;
        self
    }

    pub fn with_data_label(mut self, label: impl Into<String>) -> Self {
        self.data_label = Some(label.into());
        self
    }

    /// Asset key used to look the asset up in the table.
    pub fn data_label(&self) -> &str {
        self.data_label.as_deref().unwrap_or(&self.name)
    }

    pub fn close_key(&self) -> ColumnKey {
        ColumnKey::close(self.data_label())
    }

    /// Round half away from zero to `price_dp`.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        price.round_dp_with_strategy(self.price_dp, RoundingStrategy::MidpointAwayFromZero)
    }

    /// Round half away from zero to `quantity_dp`.
    pub fn round_quantity(&self, quantity: Decimal) -> Decimal {
        quantity.round_dp_with_strategy(self.quantity_dp, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Index of an asset inside the registry that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetHandle(usize);

impl AssetHandle {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssetError {
    #[error("unknown asset '{0}'")]
    UnknownAsset(String),

    #[error("asset '{0}' is already registered")]
    Duplicate(String),
}

/// Name → asset lookup shared read-only by every run.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    assets: Vec<Asset>,
    by_name: HashMap<String, AssetHandle>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register assets with default precision, one per name.
    pub fn from_names<I, S>(names: I) -> Result<Self, AssetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::new();
        for name in names {
            registry.register(Asset::new(name))?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, asset: Asset) -> Result<AssetHandle, AssetError> {
        if self.by_name.contains_key(&asset.name) {
            return Err(AssetError::Duplicate(asset.name));
        }
        let handle = AssetHandle(self.assets.len());
        self.by_name.insert(asset.name.clone(), handle);
        self.assets.push(asset);
        Ok(handle)
    }

    pub fn resolve(&self, name: &str) -> Result<AssetHandle, AssetError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| AssetError::UnknownAsset(name.to_string()))
    }

    /// Asset for a handle issued by this registry.
    pub fn get(&self, handle: AssetHandle) -> Option<&Asset> {
        self.assets.get(handle.0)
    }

    pub fn lookup(&self, name: &str) -> Result<&Asset, AssetError> {
        let handle = self.resolve(name)?;
        self.get(handle)
            .ok_or_else(|| AssetError::UnknownAsset(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Asset> {
        self.assets.iter()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
