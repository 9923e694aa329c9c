//! Sweep configuration, deserialized from TOML.
//!
//! ```toml
//! [data]
//! source = "synthetic"
//! assets = ["GOOG", "MSFT"]
//! bars = 500
//! seed = 7
//!
//! [book]
//! name = "Main"
//! cash = "100000"
//!
//! [batch]
//! parallelism = 4
//!
//! [assets.MSFT]
//! price_dp = 4
//! quantity_dp = 0
//!
//! [strategy]
//! name = "sma_crossover"
//! size = "100"
//!
//! [strategy.grid]
//! days_short = [5, 10, 20]
//! days_long = [50, 100]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use strata_core::domain::{Asset, AssetError, AssetRegistry, Book};
use strata_core::strategy::{BuyAndHold, ParamValue, Params, SmaCrossover, Strategy};

use crate::sweep::ParamGrid;

/// Strategies buildable from a config file.
pub const STRATEGY_NAMES: &[&str] = &["sma_crossover", "buy_and_hold"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown strategy '{0}' (valid: sma_crossover, buy_and_hold)")]
    UnknownStrategy(String),

    #[error("{section} names asset '{asset}', which is not in the loaded data")]
    UnknownAsset { section: &'static str, asset: String },

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Most decimal places a `Decimal` can carry.
const MAX_DP: u32 = 28;

/// Top-level sweep configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepConfig {
    pub data: DataConfig,
    #[serde(default)]
    pub book: BookConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    /// Per-asset precision overrides, keyed by asset name.
    #[serde(default)]
    pub assets: BTreeMap<String, AssetConfig>,
    pub strategy: StrategyConfig,
}

/// Where the price table comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DataConfig {
    /// Long-format CSV: `timestamp,asset,open,high,low,close[,volume]`.
    Csv { path: PathBuf },

    /// Seeded random walk per asset.
    Synthetic {
        assets: Vec<String>,
        bars: usize,
        #[serde(default = "default_seed")]
        seed: u64,
        #[serde(default = "default_start")]
        start: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookConfig {
    #[serde(default = "default_book_name")]
    pub name: String,
    #[serde(default = "default_cash")]
    pub cash: Decimal,
    /// Lowest cash balance a trade may leave behind. Unset means unlimited
    /// borrowing.
    #[serde(default)]
    pub cash_floor: Option<Decimal>,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            name: default_book_name(),
            cash: default_cash(),
            cash_floor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetConfig {
    /// Decimal places for reference prices (default 2).
    pub price_dp: Option<u32>,
    /// Decimal places for order quantities (default 2).
    pub quantity_dp: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    pub name: String,
    /// Assets to trade; empty trades every asset in the data.
    #[serde(default)]
    pub assets: Vec<String>,
    #[serde(default = "default_size")]
    pub size: Decimal,
    /// Parameters shared by every run.
    #[serde(default)]
    pub params: Params,
    /// Value lists expanded as a cartesian product.
    #[serde(default)]
    pub grid: BTreeMap<String, Vec<ParamValue>>,
}

fn default_seed() -> u64 {
    42
}

fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 2).unwrap_or_default()
}

fn default_book_name() -> String {
    "Main".to_string()
}

fn default_cash() -> Decimal {
    Decimal::new(100_000, 0)
}

fn default_parallelism() -> usize {
    1
}

fn default_size() -> Decimal {
    Decimal::new(100, 0)
}

impl SweepConfig {
    /// Parse and validate a config from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: SweepConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch.parallelism == 0 {
            return Err(ConfigError::Invalid("batch.parallelism must be >= 1".into()));
        }
        if self.book.cash.is_sign_negative() {
            return Err(ConfigError::Invalid(format!(
                "book.cash must not be negative, got {}",
                self.book.cash
            )));
        }
        if let DataConfig::Synthetic { assets, bars, .. } = &self.data {
            if assets.is_empty() {
                return Err(ConfigError::Invalid("data.assets must not be empty".into()));
            }
            if *bars == 0 {
                return Err(ConfigError::Invalid("data.bars must be >= 1".into()));
            }
        }
        for (name, asset) in &self.assets {
            for (field, dp) in [("price_dp", asset.price_dp), ("quantity_dp", asset.quantity_dp)] {
                if dp.is_some_and(|dp| dp > MAX_DP) {
                    return Err(ConfigError::Invalid(format!(
                        "assets.{name}.{field} must be <= {MAX_DP}"
                    )));
                }
            }
        }
        if !STRATEGY_NAMES.contains(&self.strategy.name.as_str()) {
            return Err(ConfigError::UnknownStrategy(self.strategy.name.clone()));
        }
        for (key, values) in &self.strategy.grid {
            if values.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "strategy.grid.{key} has no values"
                )));
            }
            if self.strategy.params.contains(key) {
                return Err(ConfigError::Invalid(format!(
                    "'{key}' is both a fixed param and a grid axis"
                )));
            }
        }
        Ok(())
    }

    /// Build the configured strategy.
    pub fn build_strategy(&self) -> Result<Box<dyn Strategy>, ConfigError> {
        let cfg = &self.strategy;
        match cfg.name.as_str() {
            "sma_crossover" => Ok(Box::new(
                SmaCrossover::new(cfg.size).with_assets(cfg.assets.iter().cloned()),
            )),
            "buy_and_hold" => Ok(Box::new(BuyAndHold::new(cfg.size))),
            other => Err(ConfigError::UnknownStrategy(other.to_string())),
        }
    }

    /// Register every loaded asset, applying `[assets]` overrides.
    ///
    /// Asset names in `[assets]` and `strategy.assets` must exist in
    /// `loaded`; a typo there would otherwise silently trade nothing.
    pub fn build_assets(&self, loaded: &[String]) -> Result<AssetRegistry, ConfigError> {
        if let Some(asset) = self.strategy.assets.iter().find(|a| !loaded.contains(a)) {
            return Err(ConfigError::UnknownAsset {
                section: "strategy.assets",
                asset: asset.clone(),
            });
        }
        if let Some(asset) = self.assets.keys().find(|a| !loaded.contains(a)) {
            return Err(ConfigError::UnknownAsset {
                section: "assets",
                asset: asset.clone(),
            });
        }

        let mut registry = AssetRegistry::new();
        for name in loaded {
            let mut asset = Asset::new(name.as_str());
            if let Some(cfg) = self.assets.get(name) {
                if let Some(dp) = cfg.price_dp {
                    asset = asset.with_price_dp(dp);
                }
                if let Some(dp) = cfg.quantity_dp {
                    asset = asset.with_quantity_dp(dp);
                }
            }
            registry.register(asset)?;
        }
        Ok(registry)
    }

    /// Template book every run starts from.
    pub fn build_book(&self) -> Book {
        let book = Book::new(self.book.name.as_str(), self.book.cash);
        match self.book.cash_floor {
            Some(floor) => book.with_cash_floor(floor),
            None => book,
        }
    }

    /// Parameter grid described by `[strategy.params]` and `[strategy.grid]`.
    pub fn param_grid(&self) -> ParamGrid {
        let mut grid = ParamGrid::new(self.strategy.params.clone());
        for (key, values) in &self.strategy.grid {
            grid = grid.with_axis(key.clone(), values.clone());
        }
        grid
    }
}
