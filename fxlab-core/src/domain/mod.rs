//! Domain types for fxlab

pub mod bar;
pub mod label;
pub mod series;
pub mod trade;

pub use bar::{Bar, RawBar};
pub use label::{Label, LabeledBar};
pub use series::{IngestReport, PriceSeries, SeriesError};
pub use trade::{ExitReason, Side, TradeOutcome};
