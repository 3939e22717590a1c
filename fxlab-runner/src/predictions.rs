//! Per-day classifier output consumed by calibration and backtesting.

use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use fxlab_core::Label;

use crate::data_loader::{csv_reader, open, parse_date, parse_f64, HeaderIndex, LoadError};

/// One out-of-sample prediction day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionRow {
    pub date: NaiveDate,
    pub label_true: Label,
    /// Probability that a tradable move happens at all.
    pub signal_prob: f64,
    /// Probability of `up`, conditioned on a move.
    pub direction_prob_up: f64,
    /// Final decision after thresholding.
    pub combined_pred: Label,
}

impl PredictionRow {
    pub fn is_trade(&self) -> bool {
        self.combined_pred != Label::Neutral
    }
}

/// Parsed prediction file.
#[derive(Debug, Clone, Default)]
pub struct LoadedPredictions {
    /// Sorted ascending by date, one row per date.
    pub rows: Vec<PredictionRow>,
    pub unparseable: usize,
    pub duplicates: usize,
}

pub fn load_predictions_csv(path: &Path) -> Result<LoadedPredictions, LoadError> {
    let loaded = read_predictions(open(path)?)?;
    tracing::info!(
        path = %path.display(),
        rows = loaded.rows.len(),
        "loaded predictions"
    );
    Ok(loaded)
}

/// Parse predictions from CSV.
///
/// Required columns: `date`, `label_true`, `signal_prob`, `direction_prob_up`.
/// `combined_pred` is optional and defaults to `neutral`; calibration
/// recomputes it anyway. Probabilities outside `[0, 1]` make the row
/// unparseable.
pub fn read_predictions<R: Read>(reader: R) -> Result<LoadedPredictions, LoadError> {
    let mut rdr = csv_reader(reader);
    let headers = rdr.headers()?.clone();
    let columns = HeaderIndex::new(&headers);

    let date_col = columns.require("date")?;
    let truth_col = columns.require("label_true")?;
    let signal_col = columns.require("signal_prob")?;
    let dir_col = columns.require("direction_prob_up")?;
    let pred_col = columns.find("combined_pred");

    let mut rows = Vec::new();
    let mut unparseable = 0usize;

    for record in rdr.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");
        let prob = |i: usize| parse_f64(field(i)).filter(|p| (0.0..=1.0).contains(p));
        let parsed = (|| {
            Some(PredictionRow {
                date: parse_date(field(date_col))?,
                label_true: field(truth_col).parse().ok()?,
                signal_prob: prob(signal_col)?,
                direction_prob_up: prob(dir_col)?,
                combined_pred: match pred_col {
                    Some(i) => field(i).parse().ok()?,
                    None => Label::Neutral,
                },
            })
        })();
        match parsed {
            Some(row) => rows.push(row),
            None => unparseable += 1,
        }
    }

    rows.sort_by_key(|r| r.date);
    let before = rows.len();
    rows.dedup_by_key(|r| r.date);
    let duplicates = before - rows.len();

    if unparseable + duplicates > 0 {
        tracing::warn!(unparseable, duplicates, "dropped prediction rows");
    }

    Ok(LoadedPredictions {
        rows,
        unparseable,
        duplicates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_sorts_predictions() {
        let csv = "\
date,label_true,signal_prob,direction_prob_up,combined_pred
2024-01-03,down,0.7,0.2,down
2024-01-02,up,0.6,0.8,up
2024-01-02,neutral,0.1,0.5,neutral
2024-01-04,sideways,0.5,0.5,neutral
2024-01-05,0,1.5,0.5,neutral
";
        let loaded = read_predictions(csv.as_bytes()).unwrap();
        assert_eq!(loaded.rows.len(), 2);
        assert_eq!(loaded.duplicates, 1);
        assert_eq!(loaded.unparseable, 2);
        assert_eq!(loaded.rows[0].label_true, Label::Up);
        assert_eq!(loaded.rows[1].combined_pred, Label::Down);
        assert!(loaded.rows[1].is_trade());
    }

    #[test]
    fn combined_pred_is_optional() {
        let csv = "date,label_true,signal_prob,direction_prob_up\n2024-01-02,-1,0.9,0.1\n";
        let loaded = read_predictions(csv.as_bytes()).unwrap();
        assert_eq!(loaded.rows[0].label_true, Label::Down);
        assert_eq!(loaded.rows[0].combined_pred, Label::Neutral);
    }
}
