//! Experiment runner — wires loading, labeling, calibration and backtesting.
//!
//! Three entry points, one per pipeline stage, each driven by an
//! `ExperimentConfig`:
//! - `run_labeling()`: prices → labeled dataset + manifest.
//! - `run_calibration()`: predictions → thresholds + recomputed decisions.
//! - `run_backtest()`: prices + predictions → capital trajectory (+ projection).
//!
//! Nothing here writes files; see `export` for artifacts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fxlab_core::domain::IngestReport;
use fxlab_core::{ConfigHash, DatasetHash, LabelParams, LabelRun, LabelRunId, LabelStats, Labeler};

use crate::backtest::{BacktestEngine, BacktestError, BacktestResult};
use crate::bootstrap::{project, Projection, ProjectionError};
use crate::calibrate::{calibrate, Calibration, CalibrationError};
use crate::config::{ConfigError, ExperimentConfig};
use crate::data_loader::{load_prices_csv, LoadError};
use crate::predictions::{load_predictions_csv, PredictionRow};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("calibration error: {0}")]
    Calibration(#[from] CalibrationError),
    #[error("backtest error: {0}")]
    Backtest(#[from] BacktestError),
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),
    #[error("no predictions file configured (set paths.predictions_csv)")]
    NoPredictions,
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Provenance for one labeled dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelManifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub label_params: LabelParams,
    pub fingerprint: ConfigHash,
    pub dataset_hash: DatasetHash,
    /// Combined digest of parameters and data.
    pub run_id: String,
    pub rows: usize,
    pub skipped: usize,
    pub stats: LabelStats,
    pub ingest: IngestReport,
    pub unparseable_rows: usize,
}

#[derive(Debug, Clone)]
pub struct LabelOutput {
    pub run: LabelRun,
    pub manifest: LabelManifest,
}

#[derive(Debug, Clone)]
pub struct CalibrationOutput {
    pub calibration: Calibration,
    /// Input predictions with `combined_pred` recomputed.
    pub predictions: Vec<PredictionRow>,
}

#[derive(Debug, Clone)]
pub struct BacktestOutput {
    pub result: BacktestResult,
    pub projection: Option<Projection>,
}

/// Label the configured price file.
pub fn run_labeling(config: &ExperimentConfig) -> Result<LabelOutput, RunError> {
    let loaded = load_prices_csv(&config.paths.prices_csv)?;
    let params = config.label;
    let run = Labeler::new(params).label(&loaded.series);

    let run_id = LabelRunId::new(&params, &loaded.series);
    let manifest = LabelManifest {
        schema_version: SCHEMA_VERSION,
        label_params: params,
        fingerprint: run_id.config.clone(),
        dataset_hash: loaded.dataset_hash,
        run_id: run_id.hash(),
        rows: run.rows.len(),
        skipped: run.skipped,
        stats: run.stats,
        ingest: loaded.ingest,
        unparseable_rows: loaded.unparseable,
    };
    tracing::info!(run = %run_id, rows = manifest.rows, "labeled dataset ready");

    Ok(LabelOutput { run, manifest })
}

/// Calibrate thresholds on the configured predictions file.
pub fn run_calibration(config: &ExperimentConfig) -> Result<CalibrationOutput, RunError> {
    let mut predictions = load_configured_predictions(config, None)?;
    let calibration = calibrate(&predictions, &config.calibration)?;
    for (row, &pred) in predictions.iter_mut().zip(&calibration.combined) {
        row.combined_pred = pred;
    }
    Ok(CalibrationOutput {
        calibration,
        predictions,
    })
}

/// Backtest predictions against the configured price file.
///
/// `predictions_override` replaces `paths.predictions_csv`, e.g. with the
/// output of `run_calibration`.
pub fn run_backtest(
    config: &ExperimentConfig,
    predictions_override: Option<&Path>,
) -> Result<BacktestOutput, RunError> {
    let loaded = load_prices_csv(&config.paths.prices_csv)?;
    let predictions = load_configured_predictions(config, predictions_override)?;

    let engine = BacktestEngine::new(&loaded.series, config.label, config.backtest)?;
    let result = engine.run(&predictions);

    let projection = config
        .projection
        .as_ref()
        .map(|p| project(&result, p))
        .transpose()?;

    Ok(BacktestOutput { result, projection })
}

fn load_configured_predictions(
    config: &ExperimentConfig,
    override_path: Option<&Path>,
) -> Result<Vec<PredictionRow>, RunError> {
    let path = override_path
        .or(config.paths.predictions_csv.as_deref())
        .ok_or(RunError::NoPredictions)?;
    Ok(load_predictions_csv(path)?.rows)
}
