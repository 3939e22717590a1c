//! Experiment configuration, loaded from one TOML file.
//!
//! ```toml
//! [paths]
//! prices_csv = "data/eurusd_daily.csv"
//! predictions_csv = "data/predictions_test.csv"
//! output_dir = "out"
//!
//! [label]
//! horizon_days = 4
//! tp_pct = 0.02
//! sl_mode = "atr"
//! atr_window = 14
//! atr_mult = 1.0
//!
//! [backtest]
//! settlement = "at_exit"
//! strategy = { type = "fractional", frac_capital = 0.1 }
//! ```
//!
//! Every section except `paths` and `label` has defaults. Relative paths are
//! resolved against the directory holding the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fxlab_core::{ConfigHash, LabelParams};

use crate::backtest::{BacktestError, BacktestPolicy};
use crate::bootstrap::{ProjectionConfig, ProjectionError};
use crate::calibrate::{CalibrationConfig, CalibrationError};

/// Errors from loading or validating a config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Syntax errors and invalid `[label]` values both surface here.
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("calibration: {0}")]
    Calibration(#[from] CalibrationError),

    #[error("backtest: {0}")]
    Backtest(#[from] BacktestError),

    #[error("projection: {0}")]
    Projection(#[from] ProjectionError),
}

/// File locations for one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    pub prices_csv: PathBuf,
    /// Defaults to `<output_dir>/labeled.csv`.
    #[serde(default)]
    pub labeled_csv: Option<PathBuf>,
    #[serde(default)]
    pub predictions_csv: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

impl PathsConfig {
    pub fn labeled_csv(&self) -> PathBuf {
        self.labeled_csv
            .clone()
            .unwrap_or_else(|| self.output_dir.join("labeled.csv"))
    }

    /// Rebase relative paths onto `base`.
    fn resolve(&mut self, base: &Path) {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        rebase(&mut self.prices_csv);
        rebase(&mut self.output_dir);
        if let Some(p) = self.labeled_csv.as_mut() {
            rebase(p);
        }
        if let Some(p) = self.predictions_csv.as_mut() {
            rebase(p);
        }
    }
}

/// Everything one experiment needs, validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub paths: PathsConfig,
    pub label: LabelParams,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub backtest: BacktestPolicy,
    /// Bootstrap projection after the backtest; off when absent.
    #[serde(default)]
    pub projection: Option<ProjectionConfig>,
}

impl ExperimentConfig {
    /// Load, resolve paths against the file's directory, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.paths.resolve(base);
        }
        tracing::debug!(
            path = %path.display(),
            experiment = %config.experiment_id().short(),
            "loaded experiment config"
        );
        Ok(config)
    }

    /// Parse and validate without touching paths.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calibration.validate()?;
        self.backtest.validate()?;
        if let Some(p) = &self.projection {
            p.validate()?;
        }
        Ok(())
    }

    /// Identity of the labeling configuration.
    pub fn experiment_id(&self) -> ConfigHash {
        self.label.fingerprint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::{ReturnConvention, Settlement, StakeStrategy};
    use fxlab_core::{ConflictPolicy, StopRule};

    const MINIMAL: &str = r#"
[paths]
prices_csv = "prices.csv"

[label]
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = ExperimentConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(cfg.label.horizon_days(), 4);
        assert_eq!(cfg.label.stop(), StopRule::FixedPct { pct: 0.01 });
        assert_eq!(cfg.label.conflict_policy(), ConflictPolicy::First);
        assert_eq!(cfg.backtest, BacktestPolicy::default());
        assert_eq!(cfg.calibration, CalibrationConfig::default());
        assert!(cfg.projection.is_none());
        assert_eq!(cfg.paths.labeled_csv(), PathBuf::from("out/labeled.csv"));
    }

    #[test]
    fn full_config_parses() {
        let text = r#"
[paths]
prices_csv = "p.csv"
predictions_csv = "preds.csv"
output_dir = "results"

[label]
horizon_days = 5
entry = "next_open"
tp_pct = 0.015
sl_mode = "atr"
atr_window = 10
atr_mult = 1.5
conflict_policy = "neutral"

[calibration]
min_pred_down = 2
min_pred_up = 2
direction_grid = { thr_min = 0.1, thr_max = 0.9, thr_step = 0.1 }

[backtest]
start_capital = 5000.0
settlement = "at_exit"
convention = "tp_only"
strategy = { type = "fractional", frac_capital = 0.2 }

[projection]
n_paths = 50
seed = 9
"#;
        let cfg = ExperimentConfig::from_toml_str(text).unwrap();
        assert_eq!(cfg.label.stop(), StopRule::Atr { window: 10, mult: 1.5 });
        assert_eq!(cfg.calibration.min_pred_down, 2);
        assert_eq!(cfg.calibration.signal_grid, CalibrationConfig::default().signal_grid);
        assert_eq!(cfg.backtest.settlement, Settlement::AtExit);
        assert_eq!(cfg.backtest.convention, ReturnConvention::TpOnly);
        assert_eq!(
            cfg.backtest.strategy,
            StakeStrategy::Fractional { frac_capital: 0.2 }
        );
        assert_eq!(cfg.projection.unwrap().n_paths, 50);
        assert_eq!(cfg.projection.unwrap().horizon_days, 252);
    }

    #[test]
    fn invalid_enum_value_fails_at_load() {
        let text = MINIMAL.replace("[label]", "[label]\nconflict_policy = \"latest\"");
        let err = ExperimentConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
        assert!(err.to_string().contains("conflict_policy"));
    }

    #[test]
    fn non_positive_horizon_fails_at_load() {
        let text = MINIMAL.replace("[label]", "[label]\nhorizon_days = 0");
        assert!(ExperimentConfig::from_toml_str(&text).is_err());
    }

    #[test]
    fn invalid_backtest_policy_fails_at_load() {
        let text = format!("{MINIMAL}\n[backtest]\nleverage = 0.0\n");
        assert!(matches!(
            ExperimentConfig::from_toml_str(&text),
            Err(ConfigError::Backtest(_))
        ));
    }

    #[test]
    fn relative_paths_resolve_against_config_dir() {
        let mut paths = PathsConfig {
            prices_csv: PathBuf::from("data/p.csv"),
            labeled_csv: None,
            predictions_csv: Some(PathBuf::from("/abs/preds.csv")),
            output_dir: PathBuf::from("out"),
        };
        paths.resolve(Path::new("/experiments/a"));
        assert_eq!(paths.prices_csv, PathBuf::from("/experiments/a/data/p.csv"));
        assert_eq!(paths.predictions_csv, Some(PathBuf::from("/abs/preds.csv")));
        assert_eq!(paths.labeled_csv(), PathBuf::from("/experiments/a/out/labeled.csv"));
    }

    #[test]
    fn experiment_id_tracks_label_params() {
        let a = ExperimentConfig::from_toml_str(MINIMAL).unwrap();
        let wider_tp = MINIMAL.replace("[label]", "[label]\ntp_pct = 0.03");
        let b = ExperimentConfig::from_toml_str(&wider_tp).unwrap();
        assert_ne!(a.experiment_id(), b.experiment_id());
    }
}
