//! Bootstrap capital projection.
//!
//! Resamples the observed per-day outcomes of a backtest (zero-P&L days
//! included) with replacement to build forward capital paths, and reports
//! per-step percentile bands. Seeded `StdRng`, so the same seed gives the same
//! bands. Nothing here feeds back into labeling, calibration or the backtest.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backtest::BacktestResult;

// ─── Configuration ───────────────────────────────────────────────────

/// What each resampled draw represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionBasis {
    /// Absolute daily P&L, added to capital (fixed-stake runs).
    Pnl,
    /// Daily P&L relative to capital before the day, compounded.
    ReturnOnCapital,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectionConfig {
    /// Number of simulated paths (default 1000).
    pub n_paths: usize,
    /// Days projected forward (default 252).
    pub horizon_days: usize,
    /// RNG seed for reproducibility.
    pub seed: u64,
    pub basis: ProjectionBasis,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            n_paths: 1000,
            horizon_days: 252,
            seed: 42,
            basis: ProjectionBasis::Pnl,
        }
    }
}

impl ProjectionConfig {
    pub fn validate(&self) -> Result<(), ProjectionError> {
        if self.n_paths == 0 {
            return Err(ProjectionError::InvalidParameter {
                name: "n_paths",
                reason: "must be > 0".into(),
            });
        }
        if self.horizon_days == 0 {
            return Err(ProjectionError::InvalidParameter {
                name: "horizon_days",
                reason: "must be > 0".into(),
            });
        }
        Ok(())
    }
}

// ─── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionStep {
    /// 1-based day offset from the projection start.
    pub step: usize,
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub start_capital: f64,
    pub observations: usize,
    pub seed: u64,
    pub steps: Vec<ProjectionStep>,
    /// Terminal capital of every path, in path order.
    pub final_capitals: Vec<f64>,
}

/// Errors from projection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("no observed days to resample")]
    NoObservations,
    #[error("invalid projection parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

// ─── Projection ──────────────────────────────────────────────────────

/// Project forward from the end of a backtest.
pub fn project(
    result: &BacktestResult,
    config: &ProjectionConfig,
) -> Result<Projection, ProjectionError> {
    let observations: Vec<f64> = match config.basis {
        ProjectionBasis::Pnl => result.points.iter().map(|p| p.pnl).collect(),
        ProjectionBasis::ReturnOnCapital => result
            .points
            .iter()
            .filter_map(|p| {
                let before = p.capital_after - p.pnl;
                (before > 0.0).then(|| p.pnl / before)
            })
            .collect(),
    };
    bootstrap_paths(&observations, result.summary.final_capital, config)
}

/// Resample `observations` with replacement into `n_paths` capital paths.
pub fn bootstrap_paths(
    observations: &[f64],
    start_capital: f64,
    config: &ProjectionConfig,
) -> Result<Projection, ProjectionError> {
    config.validate()?;
    if observations.is_empty() {
        return Err(ProjectionError::NoObservations);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let n = observations.len();
    let h = config.horizon_days;

    // Row-major: paths[path * h + step].
    let mut paths = vec![0.0; config.n_paths * h];
    for path in paths.chunks_mut(h) {
        let mut capital = start_capital;
        for slot in path.iter_mut() {
            let draw = observations[rng.gen_range(0..n)];
            capital = match config.basis {
                ProjectionBasis::Pnl => capital + draw,
                ProjectionBasis::ReturnOnCapital => capital * (1.0 + draw),
            };
            *slot = capital;
        }
    }

    let mut column = Vec::with_capacity(config.n_paths);
    let steps = (0..h)
        .map(|step| {
            column.clear();
            column.extend(paths.iter().skip(step).step_by(h).copied());
            column.sort_by(f64::total_cmp);
            ProjectionStep {
                step: step + 1,
                p5: percentile_sorted(&column, 5.0),
                p50: percentile_sorted(&column, 50.0),
                p95: percentile_sorted(&column, 95.0),
            }
        })
        .collect();

    let final_capitals = paths.chunks(h).map(|p| p[h - 1]).collect();

    Ok(Projection {
        start_capital,
        observations: n,
        seed: config.seed,
        steps,
        final_capitals,
    })
}

/// Linear-interpolated percentile of a sorted slice. `p` in [0, 100].
fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = (lo + 1).min(n - 1);
    let frac = rank - lo as f64;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}
