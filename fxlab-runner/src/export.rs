//! Artifact export — CSV and JSON for every pipeline stage.
//!
//! - Labeled dataset CSV + JSON manifest (schema-versioned)
//! - Calibrated thresholds JSON and predictions CSV
//! - Backtest trajectory CSV, trades CSV, summary JSON, projection JSON
//!
//! Floats in the labeled dataset use Rust's shortest round-trip formatting so
//! a re-read dataset is bit-identical.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use fxlab_core::LabeledBar;

use crate::backtest::{BacktestResult, CapitalPoint, TradeRecord};
use crate::bootstrap::Projection;
use crate::calibrate::Calibration;
use crate::predictions::PredictionRow;
use crate::runner::{LabelManifest, SCHEMA_VERSION};

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

fn opt<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

// ─── Labeled dataset ────────────────────────────────────────────────

/// Columns: date, open, high, low, close, label, entry_price, entry_date,
/// exit_date, exit_reason, hit_offset, lookahead_return.
/// Exit fields are empty for neutral rows.
pub fn export_labeled_csv(rows: &[LabeledBar]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "open",
        "high",
        "low",
        "close",
        "label",
        "entry_price",
        "entry_date",
        "exit_date",
        "exit_reason",
        "hit_offset",
        "lookahead_return",
    ])?;

    for r in rows {
        wtr.write_record([
            r.date().to_string(),
            r.bar.open.to_string(),
            r.bar.high.to_string(),
            r.bar.low.to_string(),
            r.bar.close.to_string(),
            r.label.to_string(),
            r.entry_price.to_string(),
            r.entry_date.to_string(),
            opt(r.exit_date),
            opt(r.exit_reason),
            opt(r.hit_offset),
            r.lookahead_return.to_string(),
        ])?;
    }
    finish(wtr)
}

pub fn export_manifest_json(manifest: &LabelManifest) -> Result<String> {
    serde_json::to_string_pretty(manifest).context("failed to serialize label manifest")
}

/// Deserialize a manifest, rejecting unknown schema versions.
pub fn import_manifest_json(json: &str) -> Result<LabelManifest> {
    let manifest: LabelManifest =
        serde_json::from_str(json).context("failed to deserialize label manifest")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

/// Manifest path next to a labeled CSV: `labeled.csv` → `labeled.manifest.json`.
pub fn manifest_path(labeled_csv: &Path) -> PathBuf {
    labeled_csv.with_extension("manifest.json")
}

/// Write the labeled CSV and its manifest. Returns the manifest path.
pub fn save_labeled_dataset(
    labeled_csv: &Path,
    rows: &[LabeledBar],
    manifest: &LabelManifest,
) -> Result<PathBuf> {
    if let Some(dir) = labeled_csv.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }
    std::fs::write(labeled_csv, export_labeled_csv(rows)?)
        .with_context(|| format!("failed to write {}", labeled_csv.display()))?;

    let mpath = manifest_path(labeled_csv);
    std::fs::write(&mpath, export_manifest_json(manifest)?)
        .with_context(|| format!("failed to write {}", mpath.display()))?;
    Ok(mpath)
}

// ─── Calibration ────────────────────────────────────────────────────

pub fn export_calibration_json(calibration: &Calibration) -> Result<String> {
    serde_json::to_string_pretty(calibration).context("failed to serialize calibration")
}

/// Columns: date, label_true, signal_prob, direction_prob_up, combined_pred.
pub fn export_predictions_csv(rows: &[PredictionRow]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "label_true",
        "signal_prob",
        "direction_prob_up",
        "combined_pred",
    ])?;
    for r in rows {
        wtr.write_record([
            r.date.to_string(),
            r.label_true.to_string(),
            r.signal_prob.to_string(),
            r.direction_prob_up.to_string(),
            r.combined_pred.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Write `thresholds.json` and `predictions_calibrated.csv` under `output_dir`.
/// Returns the predictions path.
pub fn save_calibration(
    output_dir: &Path,
    calibration: &Calibration,
    predictions: &[PredictionRow],
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    std::fs::write(
        output_dir.join("thresholds.json"),
        export_calibration_json(calibration)?,
    )?;
    let preds = output_dir.join("predictions_calibrated.csv");
    std::fs::write(&preds, export_predictions_csv(predictions)?)?;
    Ok(preds)
}

// ─── Backtest ───────────────────────────────────────────────────────

/// Columns: date, capital_after, pnl, opened, settled.
pub fn export_trajectory_csv(points: &[CapitalPoint]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "capital_after", "pnl", "opened", "settled"])?;
    for p in points {
        wtr.write_record([
            p.date.to_string(),
            format!("{:.2}", p.capital_after),
            format!("{:.2}", p.pnl),
            p.opened.to_string(),
            p.settled.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Columns: signal_date, side, label_true, entry_date, entry_price,
/// exit_date, exit_reason, stake, realized_return, pnl, booked_on, auto_stopped.
pub fn export_trades_csv(trades: &[TradeRecord]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "signal_date",
        "side",
        "label_true",
        "entry_date",
        "entry_price",
        "exit_date",
        "exit_reason",
        "stake",
        "realized_return",
        "pnl",
        "booked_on",
        "auto_stopped",
    ])?;
    for t in trades {
        wtr.write_record([
            t.signal_date.to_string(),
            t.side.to_string(),
            t.label_true.to_string(),
            t.entry_date.to_string(),
            format!("{:.6}", t.entry_price),
            t.exit_date.to_string(),
            t.exit_reason.to_string(),
            format!("{:.2}", t.stake),
            format!("{:.6}", t.realized_return),
            format!("{:.2}", t.pnl),
            t.booked_on.to_string(),
            t.auto_stopped.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Save the backtest artifact set under `output_dir`:
/// - `trajectory.csv`
/// - `trades.csv`
/// - `summary.json` (policy + summary)
/// - `projection.json` when a projection was run
pub fn save_backtest(
    output_dir: &Path,
    result: &BacktestResult,
    projection: Option<&Projection>,
) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    std::fs::write(
        output_dir.join("trajectory.csv"),
        export_trajectory_csv(&result.points)?,
    )?;
    std::fs::write(output_dir.join("trades.csv"), export_trades_csv(&result.trades)?)?;

    let summary = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "policy": result.policy,
        "summary": result.summary,
    });
    std::fs::write(
        output_dir.join("summary.json"),
        serde_json::to_string_pretty(&summary).context("failed to serialize summary")?,
    )?;

    if let Some(p) = projection {
        std::fs::write(
            output_dir.join("projection.json"),
            serde_json::to_string_pretty(p).context("failed to serialize projection")?,
        )?;
    }

    Ok(output_dir.to_path_buf())
}
