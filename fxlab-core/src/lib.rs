//! fxlab core — price series, trade outcome simulation, labeling.
//!
//! This crate contains the deterministic heart of the research pipeline:
//! - Domain types (bars, price series, trade outcomes, labels)
//! - Validated labeling parameters
//! - ATR on simple-moving-average smoothing
//! - The trade outcome simulator (TP / SL / horizon, intrabar tie-breaking)
//! - The labeler (long/short candidates, conflict resolution)
//! - Fingerprints that key each immutable labeled dataset
//!
//! Everything here is pure: identical inputs give bit-identical outputs.

pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod indicators;
pub mod labeling;
pub mod params;
pub mod simulator;

pub use domain::{Bar, ExitReason, Label, LabeledBar, PriceSeries, RawBar, Side, TradeOutcome};
pub use error::LabelError;
pub use fingerprint::{ConfigHash, DatasetHash, LabelRunId};
pub use labeling::{label, LabelRun, LabelStats, Labeler};
pub use params::{
    ConflictPolicy, EntryMode, LabelParams, LabelParamsBuilder, StopLossMode, StopRule, TieBreaker,
};
pub use simulator::{simulate, TradeSimulator};
