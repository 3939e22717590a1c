//! Labeling / simulation parameters.
//!
//! `LabelParams` is immutable and can only be obtained through
//! `LabelParamsBuilder::build()` (or deserialization, which routes through the
//! builder), so every instance in circulation has passed validation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::LabelError;

/// Where the hypothetical position is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum EntryMode {
    /// Enter at the signal day's close.
    Close,
    /// Enter at the following bar's open.
    NextOpen,
}

/// Stop-loss mode as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum StopLossMode {
    FixedPct,
    Atr,
    None,
}

/// Which exit wins when TP and SL are both touched inside one bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum TieBreaker {
    /// Conservative: the stop wins.
    Stop,
    /// Optimistic: the take-profit wins.
    Tp,
}

/// How a same-bar long-TP / short-TP conflict is labeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ConflictPolicy {
    /// Historical default. On a same-bar tie it resolves to `down`.
    First,
    Neutral,
    PreferDown,
}

macro_rules! string_enum {
    ($ty:ident, $name:literal, { $($text:literal => $variant:ident),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = LabelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim() {
                    $($text => Ok($ty::$variant),)+
                    other => Err(LabelError::invalid(
                        $name,
                        format!(
                            "'{other}' is not one of: {}",
                            [$($text),+].join(", ")
                        ),
                    )),
                }
            }
        }

        impl TryFrom<String> for $ty {
            type Error = LabelError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(EntryMode, "entry", { "close" => Close, "next_open" => NextOpen });
string_enum!(StopLossMode, "sl_mode", { "fixed_pct" => FixedPct, "atr" => Atr, "none" => None });
string_enum!(TieBreaker, "intraday_tie_breaker", { "stop" => Stop, "tp" => Tp });
string_enum!(ConflictPolicy, "conflict_policy", {
    "first" => First,
    "neutral" => Neutral,
    "prefer_down" => PreferDown,
});

/// The active stop rule. Exactly one form applies, or none at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StopRule {
    None,
    FixedPct { pct: f64 },
    Atr { window: usize, mult: f64 },
}

impl StopRule {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, StopRule::None)
    }

    pub fn atr_window(&self) -> Option<usize> {
        match self {
            StopRule::Atr { window, .. } => Some(*window),
            _ => None,
        }
    }
}

/// Flat, serde-friendly form of `LabelParams`.
///
/// Numeric fields that must be positive are signed here so that a bad value
/// surfaces as `InvalidParameter` rather than a type error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelParamsBuilder {
    pub horizon_days: i64,
    pub entry: EntryMode,
    pub tp_pct: f64,
    pub sl_mode: StopLossMode,
    pub sl_pct: f64,
    pub atr_window: i64,
    pub atr_mult: f64,
    pub intraday_tie_breaker: TieBreaker,
    pub conflict_policy: ConflictPolicy,
}

impl Default for LabelParamsBuilder {
    fn default() -> Self {
        Self {
            horizon_days: 4,
            entry: EntryMode::Close,
            tp_pct: 0.02,
            sl_mode: StopLossMode::FixedPct,
            sl_pct: 0.01,
            atr_window: 14,
            atr_mult: 1.0,
            intraday_tie_breaker: TieBreaker::Stop,
            conflict_policy: ConflictPolicy::First,
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64, LabelError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(LabelError::invalid(name, format!("must be a positive finite number, got {value}")))
    }
}

fn positive_count(name: &'static str, value: i64) -> Result<usize, LabelError> {
    if value > 0 {
        Ok(value as usize)
    } else {
        Err(LabelError::invalid(name, format!("must be > 0, got {value}")))
    }
}

impl LabelParamsBuilder {
    pub fn horizon_days(mut self, days: i64) -> Self {
        self.horizon_days = days;
        self
    }

    pub fn entry(mut self, entry: EntryMode) -> Self {
        self.entry = entry;
        self
    }

    pub fn tp_pct(mut self, pct: f64) -> Self {
        self.tp_pct = pct;
        self
    }

    pub fn fixed_stop(mut self, pct: f64) -> Self {
        self.sl_mode = StopLossMode::FixedPct;
        self.sl_pct = pct;
        self
    }

    pub fn atr_stop(mut self, window: i64, mult: f64) -> Self {
        self.sl_mode = StopLossMode::Atr;
        self.atr_window = window;
        self.atr_mult = mult;
        self
    }

    pub fn no_stop(mut self) -> Self {
        self.sl_mode = StopLossMode::None;
        self
    }

    pub fn tie_breaker(mut self, tie: TieBreaker) -> Self {
        self.intraday_tie_breaker = tie;
        self
    }

    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Validate eagerly and freeze.
    pub fn build(&self) -> Result<LabelParams, LabelError> {
        let horizon_days = positive_count("horizon_days", self.horizon_days)?;
        let tp_pct = positive("tp_pct", self.tp_pct)?;
        let stop = match self.sl_mode {
            StopLossMode::None => StopRule::None,
            StopLossMode::FixedPct => StopRule::FixedPct {
                pct: positive("sl_pct", self.sl_pct)?,
            },
            StopLossMode::Atr => StopRule::Atr {
                window: positive_count("atr_window", self.atr_window)?,
                mult: positive("atr_mult", self.atr_mult)?,
            },
        };

        Ok(LabelParams {
            horizon_days,
            entry: self.entry,
            tp_pct,
            stop,
            tie_breaker: self.intraday_tie_breaker,
            conflict_policy: self.conflict_policy,
        })
    }
}

/// Validated labeling and trade-simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LabelParamsBuilder", into = "LabelParamsBuilder")]
pub struct LabelParams {
    horizon_days: usize,
    entry: EntryMode,
    tp_pct: f64,
    stop: StopRule,
    tie_breaker: TieBreaker,
    conflict_policy: ConflictPolicy,
}

impl LabelParams {
    pub fn builder() -> LabelParamsBuilder {
        LabelParamsBuilder::default()
    }

    pub fn horizon_days(&self) -> usize {
        self.horizon_days
    }

    pub fn entry(&self) -> EntryMode {
        self.entry
    }

    pub fn tp_pct(&self) -> f64 {
        self.tp_pct
    }

    pub fn stop(&self) -> StopRule {
        self.stop
    }

    pub fn tie_breaker(&self) -> TieBreaker {
        self.tie_breaker
    }

    pub fn conflict_policy(&self) -> ConflictPolicy {
        self.conflict_policy
    }
}

impl TryFrom<LabelParamsBuilder> for LabelParams {
    type Error = LabelError;

    fn try_from(builder: LabelParamsBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}

impl From<LabelParams> for LabelParamsBuilder {
    fn from(params: LabelParams) -> Self {
        let defaults = LabelParamsBuilder::default();
        let (atr_window, atr_mult) = (defaults.atr_window, defaults.atr_mult);
        let (sl_mode, sl_pct, atr_window, atr_mult) = match params.stop {
            StopRule::None => (StopLossMode::None, defaults.sl_pct, atr_window, atr_mult),
            StopRule::FixedPct { pct } => (StopLossMode::FixedPct, pct, atr_window, atr_mult),
            StopRule::Atr { window, mult } => {
                (StopLossMode::Atr, defaults.sl_pct, window as i64, mult)
            }
        };
        Self {
            horizon_days: params.horizon_days as i64,
            entry: params.entry,
            tp_pct: params.tp_pct,
            sl_mode,
            sl_pct,
            atr_window,
            atr_mult,
            intraday_tie_breaker: params.tie_breaker,
            conflict_policy: params.conflict_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_build() {
        let params = LabelParams::builder().build().unwrap();
        assert_eq!(params.horizon_days(), 4);
        assert_eq!(params.entry(), EntryMode::Close);
        assert_eq!(params.stop(), StopRule::FixedPct { pct: 0.01 });
        assert_eq!(params.conflict_policy(), ConflictPolicy::First);
    }

    #[test]
    fn rejects_non_positive_horizon() {
        for bad in [0, -3] {
            let err = LabelParams::builder().horizon_days(bad).build().unwrap_err();
            assert!(matches!(err, LabelError::InvalidParameter { name: "horizon_days", .. }));
        }
    }

    #[test]
    fn rejects_non_positive_tp() {
        let err = LabelParams::builder().tp_pct(0.0).build().unwrap_err();
        assert!(matches!(err, LabelError::InvalidParameter { name: "tp_pct", .. }));
        let err = LabelParams::builder().tp_pct(f64::NAN).build().unwrap_err();
        assert!(matches!(err, LabelError::InvalidParameter { name: "tp_pct", .. }));
    }

    #[test]
    fn stop_rule_follows_mode() {
        let atr = LabelParams::builder().atr_stop(10, 1.5).build().unwrap();
        assert_eq!(atr.stop(), StopRule::Atr { window: 10, mult: 1.5 });
        assert_eq!(atr.stop().atr_window(), Some(10));

        let none = LabelParams::builder().no_stop().build().unwrap();
        assert!(!none.stop().is_enabled());

        let err = LabelParams::builder().atr_stop(0, 1.5).build().unwrap_err();
        assert!(matches!(err, LabelError::InvalidParameter { name: "atr_window", .. }));

        let err = LabelParams::builder().fixed_stop(-0.01).build().unwrap_err();
        assert!(matches!(err, LabelError::InvalidParameter { name: "sl_pct", .. }));
    }

    #[test]
    fn sl_pct_ignored_without_fixed_mode() {
        let mut builder = LabelParams::builder().no_stop();
        builder.sl_pct = -1.0;
        assert!(builder.build().is_ok());
    }

    #[test]
    fn enum_parsing_rejects_unknown_values() {
        assert_eq!("next_open".parse::<EntryMode>().unwrap(), EntryMode::NextOpen);
        assert_eq!("prefer_down".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::PreferDown);
        let err = "open".parse::<EntryMode>().unwrap_err();
        assert!(matches!(err, LabelError::InvalidParameter { name: "entry", .. }));
        assert!("trailing".parse::<StopLossMode>().is_err());
        assert!("random".parse::<TieBreaker>().is_err());
        assert!("last".parse::<ConflictPolicy>().is_err());
    }

    #[test]
    fn deserialization_validates() {
        let ok: LabelParams = serde_json::from_str(
            r#"{"horizon_days": 5, "tp_pct": 0.015, "sl_mode": "atr", "atr_window": 7, "atr_mult": 2.0, "conflict_policy": "neutral"}"#,
        )
        .unwrap();
        assert_eq!(ok.horizon_days(), 5);
        assert_eq!(ok.stop(), StopRule::Atr { window: 7, mult: 2.0 });
        assert_eq!(ok.conflict_policy(), ConflictPolicy::Neutral);

        assert!(serde_json::from_str::<LabelParams>(r#"{"horizon_days": 0}"#).is_err());
        assert!(serde_json::from_str::<LabelParams>(r#"{"entry": "midday"}"#).is_err());
        assert!(serde_json::from_str::<LabelParams>(r#"{"horizon": 3}"#).is_err());
    }

    #[test]
    fn serialization_roundtrip_preserves_params() {
        let params = LabelParams::builder()
            .entry(EntryMode::NextOpen)
            .atr_stop(21, 0.8)
            .tie_breaker(TieBreaker::Tp)
            .build()
            .unwrap();
        let json = serde_json::to_string(&params).unwrap();
        let back: LabelParams = serde_json::from_str(&json).unwrap();
        assert_eq!(params, back);
    }
}
