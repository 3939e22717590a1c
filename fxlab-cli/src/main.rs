//! fxlab CLI — label, calibrate and backtest commands.
//!
//! Commands:
//! - `label` — label the configured price file, write labeled CSV + manifest
//! - `calibrate` — tune decision thresholds on held-out predictions
//! - `backtest` — replay predictions through the configured capital policy
//!
//! Every command takes `--config <experiment.toml>`. Logging goes to stderr;
//! set `RUST_LOG` to change the level (default `info`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fxlab_core::Label;
use fxlab_runner::export::{save_backtest, save_calibration, save_labeled_dataset};
use fxlab_runner::runner::{run_backtest, run_calibration, run_labeling, BacktestOutput};
use fxlab_runner::{Calibration, ExperimentConfig};

#[derive(Parser)]
#[command(
    name = "fxlab",
    about = "fxlab CLI — EURUSD trade labeling, threshold calibration and backtesting"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Label every admissible day of the price series.
    Label {
        /// Path to the experiment TOML file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Calibrate signal and direction thresholds on validation predictions.
    Calibrate {
        /// Path to the experiment TOML file.
        #[arg(long)]
        config: PathBuf,

        /// Print thresholds as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Backtest predictions against the price series.
    Backtest {
        /// Path to the experiment TOML file.
        #[arg(long)]
        config: PathBuf,

        /// Predictions CSV to use instead of `paths.predictions_csv`.
        #[arg(long)]
        predictions: Option<PathBuf>,

        /// Also report a post-hoc leveraged variant (fixed stake only).
        #[arg(long)]
        leverage: Option<f64>,

        /// Print the summary as JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Label { config } => run_label_cmd(&load_config(&config)?),
        Commands::Calibrate { config, json } => run_calibrate_cmd(&load_config(&config)?, json),
        Commands::Backtest {
            config,
            predictions,
            leverage,
            json,
        } => run_backtest_cmd(&load_config(&config)?, predictions, leverage, json),
    }
}

fn load_config(path: &std::path::Path) -> Result<ExperimentConfig> {
    ExperimentConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn run_label_cmd(config: &ExperimentConfig) -> Result<()> {
    let out = run_labeling(config)?;
    let csv_path = config.paths.labeled_csv();
    let manifest_path = save_labeled_dataset(&csv_path, &out.run.rows, &out.manifest)?;

    let stats = &out.run.stats;
    println!();
    println!("=== Labeling Result ===");
    println!("Experiment:     {}", out.manifest.fingerprint.short());
    println!("Rows:           {} ({} skipped)", stats.total, out.run.skipped);
    for label in [Label::Up, Label::Down, Label::Neutral] {
        println!(
            "{:<15} {:.1}%",
            format!("{}:", label),
            stats.share(label) * 100.0
        );
    }
    println!("Same-bar ties:  {}", stats.same_bar_conflicts);
    println!("Mean hit day:   {:.2}", stats.mean_hit_offset);
    println!();
    println!("Labeled CSV:    {}", csv_path.display());
    println!("Manifest:       {}", manifest_path.display());
    Ok(())
}

fn run_calibrate_cmd(config: &ExperimentConfig, json: bool) -> Result<()> {
    let out = run_calibration(config)?;
    let preds_path =
        save_calibration(&config.paths.output_dir, &out.calibration, &out.predictions)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&out.calibration)?);
    } else {
        print_calibration(&out.calibration);
        println!("Predictions:    {}", preds_path.display());
    }
    Ok(())
}

fn print_calibration(c: &Calibration) {
    println!();
    println!("=== Calibration ===");
    println!(
        "Direction:      down <= {:.3}, up >= {:.3} ({} down / {} up)",
        c.direction.thr_down, c.direction.thr_up, c.direction.n_down, c.direction.n_up
    );
    println!("Direction P&L:  {:.2}", c.direction.best_pnl);
    println!(
        "Signal:         >= {:.3} ({} trades)",
        c.signal.thr_signal, c.signal.n_trades
    );
    println!("Signal P&L:     {:.2}", c.signal.best_pnl);
    println!("Validation P&L: {:.2}", c.validation_pnl);
    if c.direction.status.is_degenerate() || c.signal.status.is_degenerate() {
        println!();
        println!("WARNING: calibration degenerate, default thresholds in use");
    }
}

fn run_backtest_cmd(
    config: &ExperimentConfig,
    predictions: Option<PathBuf>,
    leverage: Option<f64>,
    json: bool,
) -> Result<()> {
    let out = run_backtest(config, predictions.as_deref())?;
    let dir = save_backtest(&config.paths.output_dir, &out.result, out.projection.as_ref())?;

    let leveraged = leverage
        .map(|l| out.result.with_leverage(l))
        .transpose()
        .context("post-hoc leverage")?;

    if json {
        let summary = serde_json::json!({
            "summary": out.result.summary,
            "leveraged": leveraged.as_ref().map(|r| r.summary),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&out);
        if let (Some(l), Some(r)) = (leverage, &leveraged) {
            println!();
            println!("--- Leverage x{l} ---");
            println!("Final Capital:  {:.2}", r.summary.final_capital);
            println!("Max Drawdown:   {:.2}%", r.summary.max_drawdown * 100.0);
        }
        println!();
        println!("Artifacts saved to: {}", dir.display());
    }
    Ok(())
}

fn print_summary(out: &BacktestOutput) {
    let s = &out.result.summary;
    let p = &out.result.policy;
    println!();
    println!("=== Backtest Result ===");
    println!(
        "Policy:         {:?} / {:?} / {:?}",
        p.strategy, p.settlement, p.convention
    );
    println!("Start Capital:  {:.2}", s.start_capital);
    println!("Final Capital:  {:.2}", s.final_capital);
    println!("Total P&L:      {:.2}", s.total_pnl);
    println!("Total Return:   {:.2}%", s.total_return * 100.0);
    println!();
    println!("--- Trades ---");
    println!("Trades:         {}", s.trades);
    println!("Wins / Losses:  {} / {}", s.wins, s.losses);
    println!("Win Rate:       {:.1}%", s.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", s.profit_factor);
    println!("Loss Streak:    {}", s.max_consecutive_losses);
    println!("Max Drawdown:   {:.2}%", s.max_drawdown * 100.0);
    if s.skipped_predictions > 0 {
        println!();
        println!(
            "WARNING: {} predictions skipped (date missing or window incomplete)",
            s.skipped_predictions
        );
    }
    if let Some(proj) = &out.projection {
        if let Some(last) = proj.steps.last() {
            println!();
            let paths = proj.final_capitals.len();
            println!("--- Projection ({} days, {paths} paths) ---", last.step);
            println!("P5 / P50 / P95: {:.2} / {:.2} / {:.2}", last.p5, last.p50, last.p95);
        }
    }
}
