//! Price loading for the runner.
//!
//! Reads daily OHLC records from CSV and hands them to
//! `PriceSeries::from_raw`, which owns the weekend / garbage-row policy.
//! The CSV layer only deals with what the core never sees: header lookup,
//! date formats and fields that do not parse as numbers.
//!
//! Also provides a seeded synthetic EURUSD-like generator for tests and
//! dry runs.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use thiserror::Error;

use fxlab_core::domain::{IngestReport, SeriesError};
use fxlab_core::{Bar, DatasetHash, PriceSeries, RawBar};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("price series: {0}")]
    Series(#[from] SeriesError),
}

/// Result of loading a price file, including what was thrown away.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub series: PriceSeries,
    /// Rows whose date or prices did not parse.
    pub unparseable: usize,
    /// Drop counts from series construction.
    pub ingest: IngestReport,
    pub dataset_hash: DatasetHash,
}

/// Load an OHLC CSV file.
pub fn load_prices_csv(path: &Path) -> Result<LoadedSeries, LoadError> {
    let file = open(path)?;
    let loaded = read_prices(file)?;
    tracing::info!(
        path = %path.display(),
        bars = loaded.series.len(),
        first = %loaded.series.first_date(),
        last = %loaded.series.last_date(),
        "loaded price series"
    );
    Ok(loaded)
}

/// Parse OHLC records from any reader.
///
/// Columns are located by case-insensitive header name: `date`, `open`,
/// `high`, `low`, `close`, and optionally `volume`. Extra columns are ignored.
pub fn read_prices<R: Read>(reader: R) -> Result<LoadedSeries, LoadError> {
    let mut rdr = csv_reader(reader);
    let headers = rdr.headers()?.clone();
    let columns = HeaderIndex::new(&headers);

    let date_col = columns.require("date")?;
    let open_col = columns.require("open")?;
    let high_col = columns.require("high")?;
    let low_col = columns.require("low")?;
    let close_col = columns.require("close")?;
    let volume_col = columns.find("volume");

    let mut raw: Vec<RawBar> = Vec::new();
    let mut unparseable = 0usize;

    for record in rdr.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");
        let parsed = (|| {
            let date = parse_date(field(date_col))?;
            let mut bar = Bar::new(
                date,
                parse_f64(field(open_col))?,
                parse_f64(field(high_col))?,
                parse_f64(field(low_col))?,
                parse_f64(field(close_col))?,
            );
            bar.volume = volume_col.and_then(|i| parse_f64(field(i)));
            Some(bar)
        })();
        match parsed {
            Some(bar) => raw.push(bar),
            None => unparseable += 1,
        }
    }

    if unparseable > 0 {
        tracing::warn!(unparseable, "skipped price rows with unparseable fields");
    }

    let (series, ingest) = PriceSeries::from_raw(raw)?;
    let dataset_hash = DatasetHash::of(&series);
    Ok(LoadedSeries {
        series,
        unparseable,
        ingest,
        dataset_hash,
    })
}

/// Parse a calendar day. Timestamps are truncated to their date.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    for fmt in ["%Y-%m-%d", "%d.%m.%Y", "%Y/%m/%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

pub(crate) fn parse_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

pub(crate) fn open(path: &Path) -> Result<File, LoadError> {
    File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader)
}

/// Case-insensitive header lookup.
pub(crate) struct HeaderIndex {
    names: Vec<String>,
}

impl HeaderIndex {
    pub(crate) fn new(headers: &csv::StringRecord) -> Self {
        Self {
            names: headers.iter().map(|h| h.trim().to_ascii_lowercase()).collect(),
        }
    }

    pub(crate) fn find(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub(crate) fn require(&self, name: &'static str) -> Result<usize, LoadError> {
        self.find(name).ok_or(LoadError::MissingColumn(name))
    }
}

/// Generate a seeded EURUSD-like random walk on weekdays.
///
/// Prices start at 1.10 with daily moves within ±0.6% and wicks up to 0.4%.
/// Same seed, same bars.
pub fn synthetic_bars(seed: u64, start: NaiveDate, days: usize) -> Vec<RawBar> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);
    let mut bars = Vec::with_capacity(days);
    let mut price = 1.10_f64;
    let mut current = start;

    while bars.len() < days {
        let weekday = current.weekday();
        if weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun {
            current += chrono::Duration::days(1);
            continue;
        }

        let daily_return: f64 = rng.gen_range(-0.006..0.006);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.004));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.004));
        bars.push(Bar::new(current, open, high, low, close));

        price = close;
        current += chrono::Duration::days(1);
    }

    bars
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Date,Open,High,Low,Close,Volume
2024-01-02,1.1000,1.1050,1.0950,1.1020,1200
2024-01-03,1.1020,1.1080,1.1000,1.1060,
2024-01-06,1.1060,1.1070,1.1040,1.1050,10
not-a-date,1.1,1.1,1.1,1.1,0
2024-01-04,1.1060,abc,1.1000,1.1010,0
2024-01-05,1.1010,1.1000,1.0990,1.1050,0
";

    #[test]
    fn read_prices_drops_garbage_and_weekends() {
        let loaded = read_prices(SAMPLE.as_bytes()).unwrap();
        assert_eq!(loaded.series.len(), 2);
        assert_eq!(loaded.unparseable, 2);
        assert_eq!(loaded.ingest.weekend, 1);
        // 01-05: close above high.
        assert_eq!(loaded.ingest.invalid, 1);
        assert_eq!(loaded.series.bars()[0].volume, Some(1200.0));
        assert_eq!(loaded.series.bars()[1].volume, None);
    }

    #[test]
    fn missing_column_is_reported() {
        let csv = "date,open,high,close\n2024-01-02,1,1,1\n";
        assert!(matches!(
            read_prices(csv.as_bytes()),
            Err(LoadError::MissingColumn("low"))
        ));
    }

    #[test]
    fn all_rows_invalid_is_an_empty_series() {
        let csv = "date,open,high,low,close\n2024-01-06,1,1,1,1\n";
        assert!(matches!(
            read_prices(csv.as_bytes()),
            Err(LoadError::Series(SeriesError::Empty))
        ));
    }

    #[test]
    fn parse_date_accepts_known_formats() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(parse_date("2024-03-15"), Some(d));
        assert_eq!(parse_date("15.03.2024"), Some(d));
        assert_eq!(parse_date("2024-03-15 22:00:00"), Some(d));
        assert_eq!(parse_date("2024-03-15T00:00:00"), Some(d));
        assert_eq!(parse_date("03/15/2024"), None);
    }

    #[test]
    fn synthetic_bars_are_deterministic_and_sane() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let a = synthetic_bars(7, start, 300);
        let b = synthetic_bars(7, start, 300);
        assert_eq!(a, b);
        assert_eq!(a.len(), 300);
        assert!(a.iter().all(|bar| bar.is_sane() && !bar.is_weekend()));
        let (series, report) = PriceSeries::from_raw(a).unwrap();
        assert_eq!(series.len(), 300);
        assert_eq!(report.dropped(), 0);
    }
}
