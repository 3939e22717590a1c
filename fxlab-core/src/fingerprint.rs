//! Run fingerprinting — deterministic identification of labeling runs.
//!
//! - `ConfigHash`: exact identity of a `LabelParams` (canonical JSON → BLAKE3).
//! - `DatasetHash`: content hash of the price series.
//! - `LabelRunId`: config + dataset. One id names one immutable labeled dataset.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::PriceSeries;
use crate::params::{LabelParams, LabelParamsBuilder};

/// BLAKE3 hex digest of the canonical parameter serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigHash(pub String);

impl ConfigHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// First 12 hex characters, for directory and file names.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl fmt::Display for ConfigHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic dataset hash (content hash of the canonical series).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetHash(pub String);

impl DatasetHash {
    pub fn of(series: &PriceSeries) -> Self {
        Self(series.dataset_hash())
    }
}

impl fmt::Display for DatasetHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl LabelParams {
    /// Exact identity of this parameter set.
    ///
    /// Serializes through the flat builder form, whose field order is fixed by
    /// the struct definition, so the digest is stable across runs and builds.
    pub fn fingerprint(&self) -> ConfigHash {
        let flat = LabelParamsBuilder::from(*self);
        let json = serde_json::to_string(&flat).unwrap_or_default();
        ConfigHash::from_bytes(json.as_bytes())
    }
}

/// Identity of one labeling run: parameters + data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelRunId {
    pub config: ConfigHash,
    pub dataset: DatasetHash,
}

impl LabelRunId {
    pub fn new(params: &LabelParams, series: &PriceSeries) -> Self {
        Self {
            config: params.fingerprint(),
            dataset: DatasetHash::of(series),
        }
    }

    /// Combined BLAKE3 digest.
    pub fn hash(&self) -> String {
        let canonical = serde_json::json!({
            "config": &self.config.0,
            "dataset": &self.dataset.0,
        });
        blake3::hash(canonical.to_string().as_bytes())
            .to_hex()
            .to_string()
    }
}

impl fmt::Display for LabelRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.config.short(), &self.dataset.0[..self.dataset.0.len().min(12)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Bar;
    use crate::params::ConflictPolicy;
    use chrono::NaiveDate;

    fn series(close: f64) -> PriceSeries {
        let d = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        PriceSeries::new(vec![Bar::new(d, close, close, close, close)]).unwrap()
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let p = LabelParams::builder().build().unwrap();
        assert_eq!(p.fingerprint(), p.fingerprint());
        assert_eq!(p.fingerprint().0.len(), 64);
    }

    #[test]
    fn fingerprint_differs_for_different_params() {
        let a = LabelParams::builder().build().unwrap();
        let b = LabelParams::builder()
            .conflict_policy(ConflictPolicy::Neutral)
            .build()
            .unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_inactive_stop_fields() {
        let mut a = LabelParams::builder().no_stop();
        let mut b = LabelParams::builder().no_stop();
        a.sl_pct = 0.03;
        b.sl_pct = 0.07;
        assert_eq!(a.build().unwrap().fingerprint(), b.build().unwrap().fingerprint());
    }

    #[test]
    fn run_id_tracks_dataset() {
        let p = LabelParams::builder().build().unwrap();
        let a = LabelRunId::new(&p, &series(1.10));
        let b = LabelRunId::new(&p, &series(1.10));
        let c = LabelRunId::new(&p, &series(1.11));
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }
}
