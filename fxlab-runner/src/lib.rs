//! fxlab runner — experiment orchestration over `fxlab-core`.
//!
//! This crate builds on the pure core to provide:
//! - Typed TOML experiment configuration
//! - CSV loading for prices and classifier predictions
//! - Threshold calibration on held-out probabilities
//! - The backtest engine (stake strategies, settlement timing, leverage)
//! - Summary metrics and a seeded bootstrap capital projection
//! - CSV/JSON artifact export

pub mod backtest;
pub mod bootstrap;
pub mod calibrate;
pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod predictions;
pub mod runner;

pub use backtest::{
    run_backtest, BacktestEngine, BacktestError, BacktestPolicy, BacktestResult, BacktestSummary,
    CapitalPoint, CapitalState, NeutralDayRule, ReturnConvention, Settlement, StakeStrategy,
    TradeRecord,
};
pub use bootstrap::{project, Projection, ProjectionBasis, ProjectionConfig, ProjectionError};
pub use calibrate::{
    calibrate, combine_predictions, tune_direction_thresholds, tune_signal_trade_threshold,
    Calibration, CalibrationConfig, CalibrationError, CalibrationStatus, CostModel,
    DegenerateReason, ThresholdGrid,
};
pub use config::{ConfigError, ExperimentConfig, PathsConfig};
pub use data_loader::{load_prices_csv, LoadError, LoadedSeries};
pub use predictions::{load_predictions_csv, PredictionRow};
pub use runner::{LabelManifest, RunError, SCHEMA_VERSION};
