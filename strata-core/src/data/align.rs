//! Multi-asset time alignment.
//!
//! Given bars for multiple assets, align them to a common timeline.
//! Missing bars get strict NaN (no forward-fill of tradable price data).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::table::{ColumnKey, TableError, TimeSeriesTable, Timestamp, CLOSE, HIGH, LOW, OPEN, VOLUME};

/// One raw OHLC(V) bar for a single asset, as produced by ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub timestamp: Timestamp,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: Option<f64>,
}

impl RawBar {
    /// Basic sanity: high >= max(open, close), low <= min(open, close).
    pub fn is_sane(&self) -> bool {
        self.high >= self.open.max(self.close) && self.low <= self.open.min(self.close)
    }
}

/// Align per-asset bar lists onto the union of their timestamps.
///
/// Every asset gets `Open/High/Low/Close` columns; `Volume` is added for
/// assets where at least one bar carries it. Rows an asset has no bar for
/// are NaN.
pub fn align(series: &BTreeMap<String, Vec<RawBar>>) -> Result<TimeSeriesTable, TableError> {
    let mut all_timestamps = BTreeSet::new();
    for bars in series.values() {
        for bar in bars {
            all_timestamps.insert(bar.timestamp);
        }
    }
    let index: Vec<Timestamp> = all_timestamps.into_iter().collect();

    let mut columns = Vec::with_capacity(series.len() * 5);
    for (asset, bars) in series {
        let mut by_time: HashMap<Timestamp, &RawBar> = HashMap::with_capacity(bars.len());
        for bar in bars {
            if by_time.insert(bar.timestamp, bar).is_some() {
                return Err(TableError::DuplicateBar {
                    asset: asset.clone(),
                    timestamp: bar.timestamp,
                });
            }
        }

        let pick = |f: fn(&RawBar) -> f64| -> Vec<f64> {
            index
                .iter()
                .map(|ts| by_time.get(ts).map_or(f64::NAN, |b| f(b)))
                .collect()
        };

        columns.push((ColumnKey::new(asset.as_str(), OPEN), pick(|b| b.open)));
        columns.push((ColumnKey::new(asset.as_str(), HIGH), pick(|b| b.high)));
        columns.push((ColumnKey::new(asset.as_str(), LOW), pick(|b| b.low)));
        columns.push((ColumnKey::new(asset.as_str(), CLOSE), pick(|b| b.close)));
        if bars.iter().any(|b| b.volume.is_some()) {
            columns.push((
                ColumnKey::new(asset.as_str(), VOLUME),
                pick(|b| b.volume.unwrap_or(f64::NAN)),
            ));
        }
    }

    TimeSeriesTable::from_columns(index, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(d: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bar(d: u32, close: f64) -> RawBar {
        RawBar {
            timestamp: ts(d),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: None,
        }
    }

    #[test]
    fn aligns_to_union_with_nan_gaps() {
        let mut series = BTreeMap::new();
        series.insert("SPY".to_string(), vec![bar(1, 100.0), bar(2, 101.0), bar(3, 102.0)]);
        series.insert("QQQ".to_string(), vec![bar(1, 200.0), bar(3, 202.0)]);

        let table = align(&series).unwrap();
        assert_eq!(table.len(), 3);
        let qqq = table.column(&ColumnKey::close("QQQ")).unwrap();
        assert_eq!(qqq[0], 200.0);
        assert!(qqq[1].is_nan());
        assert_eq!(qqq[2], 202.0);
        let spy = table.column(&ColumnKey::close("SPY")).unwrap();
        assert_eq!(spy, &[100.0, 101.0, 102.0]);
    }

    #[test]
    fn volume_column_only_when_present() {
        let mut with_volume = bar(1, 10.0);
        with_volume.volume = Some(1_000.0);
        let mut series = BTreeMap::new();
        series.insert("AAA".to_string(), vec![with_volume]);
        series.insert("BBB".to_string(), vec![bar(1, 20.0)]);

        let table = align(&series).unwrap();
        assert!(table.contains(&ColumnKey::new("AAA", VOLUME)));
        assert!(!table.contains(&ColumnKey::new("BBB", VOLUME)));
    }

    #[test]
    fn duplicate_bar_is_rejected() {
        let mut series = BTreeMap::new();
        series.insert("AAA".to_string(), vec![bar(1, 10.0), bar(1, 11.0)]);
        let err = align(&series).unwrap_err();
        assert!(matches!(err, TableError::DuplicateBar { .. }));
    }

    #[test]
    fn unsorted_input_is_sorted() {
        let mut series = BTreeMap::new();
        series.insert("AAA".to_string(), vec![bar(3, 12.0), bar(1, 10.0), bar(2, 11.0)]);
        let table = align(&series).unwrap();
        assert_eq!(table.timestamps(), &[ts(1), ts(2), ts(3)]);
        assert_eq!(table.column(&ColumnKey::close("AAA")).unwrap(), &[10.0, 11.0, 12.0]);
    }

    #[test]
    fn sanity_check() {
        assert!(bar(1, 10.0).is_sane());
        let mut bad = bar(1, 10.0);
        bad.high = 5.0;
        assert!(!bad.is_sane());
    }
}
