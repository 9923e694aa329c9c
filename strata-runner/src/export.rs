//! Reporting and export: JSON and CSV artifacts for runs and sweeps.
//!
//! Provides:
//! - **JSON**: full run result wrapped with schema version and data provenance
//! - **CSV**: book history, trade tape, processed orders, sweep summary
//! - **Text**: ranked sweep summary for the terminal
//!
//! Persisted JSON carries a `schema_version` field. Newer versions are
//! rejected on load.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use strata_core::domain::OrderStatus;
use strata_core::engine::RunResult;

use crate::sweep::SweepResults;

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// A run result plus where its data came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    pub result: RunResult,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl RunArtifact {
    pub fn new(result: RunResult, dataset_hash: impl Into<String>, has_synthetic: bool) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            dataset_hash: dataset_hash.into(),
            has_synthetic,
            result,
        }
    }
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(artifact: &RunArtifact) -> Result<String> {
    serde_json::to_string_pretty(artifact).context("failed to serialize RunArtifact to JSON")
}

/// Deserialize a `RunArtifact` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<RunArtifact> {
    let artifact: RunArtifact =
        serde_json::from_str(json).context("failed to deserialize RunArtifact from JSON")?;
    if artifact.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            artifact.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(artifact)
}

// ─── CSV export ─────────────────────────────────────────────────────

/// Book history as CSV: one row per bar, one `{book}.{field}` column per
/// history column.
pub fn export_history_csv(result: &RunResult) -> Result<String> {
    let history = result.book_history();
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["timestamp".to_string()];
    header.extend(
        history
            .columns
            .iter()
            .map(|c| format!("{}.{}", c.book, c.field)),
    );
    wtr.write_record(&header)?;

    for (row, ts) in history.timestamps.iter().enumerate() {
        let mut record = vec![ts.to_string()];
        record.extend(history.columns.iter().map(|c| c.values[row].to_string()));
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Trade tape across every book.
///
/// Columns: book, timestamp, asset, quantity, price, total, label
pub fn export_trades_csv(result: &RunResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["book", "timestamp", "asset", "quantity", "price", "total", "label"])?;

    for book in &result.books {
        for t in book.trades() {
            wtr.write_record([
                book.name(),
                &t.timestamp.to_string(),
                &t.asset,
                &t.quantity.to_string(),
                &t.price.to_string(),
                &t.total.to_string(),
                t.label.as_deref().unwrap_or(""),
            ])?;
        }
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Every processed order with its status.
///
/// Columns: bar, timestamp, strategy, book, asset, size, size_type, label, status
pub fn export_orders_csv(result: &RunResult) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "bar",
        "timestamp",
        "strategy",
        "book",
        "asset",
        "size",
        "size_type",
        "label",
        "status",
    ])?;

    for o in &result.orders {
        let status = match &o.status {
            OrderStatus::Complete => "complete".to_string(),
            OrderStatus::Rejected(reason) => format!("rejected:{reason:?}"),
        };
        wtr.write_record([
            o.bar.to_string().as_str(),
            &o.timestamp.to_string(),
            &o.strategy.to_string(),
            &o.book.to_string(),
            &o.order.asset,
            &o.order.size.to_string(),
            &format!("{:?}", o.order.size_type),
            o.order.label.as_deref().unwrap_or(""),
            &status,
        ])?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per sweep run, in input order.
///
/// Columns: index, run_id, params, status, final_total, trades, rejected, error
pub fn export_summary_csv(results: &SweepResults) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "index",
        "run_id",
        "params",
        "status",
        "final_total",
        "trades",
        "rejected",
        "error",
    ])?;

    for (i, outcome) in results.all().iter().enumerate() {
        match outcome {
            Ok(r) => wtr.write_record([
                i.to_string().as_str(),
                &r.run_id,
                &r.params.to_string(),
                "ok",
                &r.final_total().to_string(),
                &r.trades().count().to_string(),
                &r.rejected_orders().count().to_string(),
                "",
            ])?,
            Err(e) => {
                let params = e.params().map(ToString::to_string).unwrap_or_default();
                let run_id = e.params().map(|p| p.run_id()).unwrap_or_default();
                let status = if e.is_cancelled() { "cancelled" } else { "failed" };
                wtr.write_record([
                    i.to_string().as_str(),
                    &run_id,
                    &params,
                    status,
                    "",
                    "",
                    "",
                    &e.to_string(),
                ])?
            }
        }
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Text summary ───────────────────────────────────────────────────

/// Ranked table of the best `top` runs plus a failure count.
pub fn format_summary(results: &SweepResults, top: usize) -> String {
    let mut out = String::new();
    let ranked = results.ranked();
    let _ = writeln!(
        out,
        "{} runs, {} ok, {} failed",
        results.len(),
        ranked.len(),
        results.failure_count()
    );
    let _ = writeln!(
        out,
        "{:>4}  {:<12}  {:>16}  {:>6}  params",
        "rank", "run_id", "final_total", "trades"
    );
    for (rank, r) in ranked.iter().take(top).enumerate() {
        let _ = writeln!(
            out,
            "{:>4}  {:<12}  {:>16}  {:>6}  {}",
            rank + 1,
            &r.run_id[..12.min(r.run_id.len())],
            r.final_total().round_dp(2).to_string(),
            r.trades().count(),
            r.params
        );
    }
    out
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save the artifact set for a single run.
///
/// Creates `run_{id}/` under `output_dir`, where `id` is the first 12 hex
/// characters of the run id, containing:
/// - `result.json`: the full `RunArtifact`
/// - `history.csv`: bar-by-bar book history
/// - `trades.csv`: trade tape
/// - `orders.csv`: processed-order log
///
/// Returns the path to the created directory.
pub fn save_artifacts(artifact: &RunArtifact, output_dir: &Path) -> Result<PathBuf> {
    let id = &artifact.result.run_id;
    let run_dir = output_dir.join(format!("run_{}", &id[..12.min(id.len())]));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    let files = [
        ("result.json", export_json(artifact)?),
        ("history.csv", export_history_csv(&artifact.result)?),
        ("trades.csv", export_trades_csv(&artifact.result)?),
        ("orders.csv", export_orders_csv(&artifact.result)?),
    ];
    for (name, content) in files {
        let path = run_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    Ok(run_dir)
}

/// Load the artifact saved by [`save_artifacts`].
pub fn load_artifacts(dir: &Path) -> Result<RunArtifact> {
    let path = dir.join("result.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}

/// Write `summary.csv` for a sweep plus the full artifact set of the best
/// run. Returns the best run's directory, if any run succeeded.
pub fn save_sweep(
    results: &SweepResults,
    dataset_hash: &str,
    has_synthetic: bool,
    output_dir: &Path,
) -> Result<Option<PathBuf>> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;
    let summary = export_summary_csv(results)?;
    let path = output_dir.join("summary.csv");
    std::fs::write(&path, summary).with_context(|| format!("failed to write {}", path.display()))?;

    results
        .best()
        .map(|best| {
            let artifact = RunArtifact::new(best.clone(), dataset_hash, has_synthetic);
            save_artifacts(&artifact, output_dir)
        })
        .transpose()
}
