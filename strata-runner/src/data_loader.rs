//! Price data for the runner: long-format CSV ingestion and seeded synthetic
//! bars.
//!
//! Both paths produce per-asset [`RawBar`] lists that are aligned into one
//! [`TimeSeriesTable`] on the union of timestamps. Synthetic data is a
//! developer mode; results produced on it are tagged.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use strata_core::data::{align, RawBar, TableError, TimeSeriesTable, Timestamp};

use crate::config::DataConfig;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: unrecognised timestamp '{value}'")]
    BadTimestamp { line: u64, value: String },

    #[error("no bars found")]
    Empty,

    #[error("table error: {0}")]
    Table(#[from] TableError),
}

/// Aligned data plus provenance.
#[derive(Debug)]
pub struct LoadedData {
    pub table: TimeSeriesTable,
    /// Asset names, sorted.
    pub assets: Vec<String>,
    /// BLAKE3 over every aligned value, for tagging results.
    pub dataset_hash: String,
    pub has_synthetic: bool,
    /// Bars whose high/low do not bracket open/close.
    pub insane_bars: usize,
}

/// One row of the long-format CSV.
#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    timestamp: String,
    asset: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// Load whatever `config` points at.
pub fn load_data(config: &DataConfig) -> Result<LoadedData, LoadError> {
    match config {
        DataConfig::Csv { path } => load_csv(path),
        DataConfig::Synthetic {
            assets,
            bars,
            seed,
            start,
        } => {
            let names: Vec<&str> = assets.iter().map(String::as_str).collect();
            finish(generate_synthetic(&names, *bars, *seed, *start), true)
        }
    }
}

pub fn load_csv(path: &Path) -> Result<LoadedData, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let bars = read_csv(file)?;
    info!(path = %path.display(), assets = bars.len(), "loaded csv");
    finish(bars, false)
}

/// Parse long-format CSV into per-asset bars.
pub fn read_csv<R: Read>(reader: R) -> Result<BTreeMap<String, Vec<RawBar>>, LoadError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars: BTreeMap<String, Vec<RawBar>> = BTreeMap::new();

    for record in rdr.deserialize() {
        let row: CsvRow = record?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| LoadError::BadTimestamp {
            // Header is line 1.
            line: bars.values().map(Vec::len).sum::<usize>() as u64 + 2,
            value: row.timestamp.clone(),
        })?;
        bars.entry(row.asset).or_default().push(RawBar {
            timestamp,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        });
    }

    for series in bars.values_mut() {
        series.sort_by_key(|b| b.timestamp);
    }
    Ok(bars)
}

/// Write per-asset bars as long-format CSV, ordered by timestamp then asset.
pub fn write_csv<W: Write>(bars: &BTreeMap<String, Vec<RawBar>>, writer: W) -> Result<(), LoadError> {
    let mut rows: Vec<(&Timestamp, &str, &RawBar)> = bars
        .iter()
        .flat_map(|(asset, series)| series.iter().map(move |b| (&b.timestamp, asset.as_str(), b)))
        .collect();
    rows.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    let mut wtr = csv::Writer::from_writer(writer);
    for (ts, asset, bar) in rows {
        wtr.serialize(CsvRow {
            timestamp: format_timestamp(ts),
            asset: asset.to_string(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
        })?;
    }
    wtr.flush().map_err(|e| LoadError::Csv(e.into()))?;
    Ok(())
}

fn parse_timestamp(s: &str) -> Option<Timestamp> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn format_timestamp(ts: &Timestamp) -> String {
    if ts.time() == chrono::NaiveTime::MIN {
        ts.format("%Y-%m-%d").to_string()
    } else {
        ts.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

fn finish(bars: BTreeMap<String, Vec<RawBar>>, has_synthetic: bool) -> Result<LoadedData, LoadError> {
    if bars.values().all(Vec::is_empty) {
        return Err(LoadError::Empty);
    }
    let insane_bars = bars.values().flatten().filter(|b| !b.is_sane()).count();
    if insane_bars > 0 {
        warn!(insane_bars, "bars with high/low not bracketing open/close");
    }

    let table = align(&bars)?;
    let assets = bars.keys().cloned().collect();
    let dataset_hash = compute_dataset_hash(&table);
    Ok(LoadedData {
        table,
        assets,
        dataset_hash,
        has_synthetic,
        insane_bars,
    })
}

/// BLAKE3 over the index and every column, in key order.
fn compute_dataset_hash(table: &TimeSeriesTable) -> String {
    let mut hasher = blake3::Hasher::new();
    for ts in table.timestamps() {
        hasher.update(ts.to_string().as_bytes());
    }
    for key in table.keys() {
        hasher.update(key.to_string().as_bytes());
        for value in table.column(key).unwrap_or_default() {
            hasher.update(&value.to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// Seeded random-walk bars for each asset, skipping weekends.
///
/// Each asset's stream is derived from `seed` and its name, so adding an
/// asset does not change the others.
pub fn generate_synthetic(
    assets: &[&str],
    bars: usize,
    seed: u64,
    start: NaiveDate,
) -> BTreeMap<String, Vec<RawBar>> {
    assets
        .iter()
        .map(|asset| (asset.to_string(), synthetic_series(asset, bars, seed, start)))
        .collect()
}

fn synthetic_series(asset: &str, bars: usize, seed: u64, start: NaiveDate) -> Vec<RawBar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut hasher = blake3::Hasher::new();
    hasher.update(&seed.to_le_bytes());
    hasher.update(asset.as_bytes());
    let mut rng = StdRng::from_seed(*hasher.finalize().as_bytes());

    let mut out = Vec::with_capacity(bars);
    let mut price = 100.0_f64;
    let mut current = start;

    while out.len() < bars {
        let weekday = current.weekday();
        if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
            current += chrono::Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64) as f64;

        if let Some(timestamp) = current.and_hms_opt(0, 0, 0) {
            out.push(RawBar {
                timestamp,
                open,
                high,
                low,
                close,
                volume: Some(volume),
            });
        }

        price = close;
        current += chrono::Duration::days(1);
    }

    out
}
