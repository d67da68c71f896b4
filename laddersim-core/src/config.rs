//! Strategy configuration: entry trigger, ladder legs, stops, re-entry, costs.
//!
//! Everything here is plain serde data. `StrategyConfig::validate` is the
//! single construction-time gate; the simulator refuses to run an invalid
//! config.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::PositionSide;
use crate::execution::SlippageModel;

/// Tolerance for the ladder allocation check.
const ALLOCATION_EPSILON: f64 = 1e-9;

/// One ladder rung: release `percent` of the initial size at `target_multiple`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyLeg {
    #[serde(alias = "target", alias = "targetMultiple")]
    pub target_multiple: f64,
    pub percent: f64,
}

impl StrategyLeg {
    pub fn new(target_multiple: f64, percent: f64) -> Self {
        Self {
            target_multiple,
            percent,
        }
    }
}

/// Trailing stop: disarmed, or armed once the favorable excursion reaches
/// `activation`, then firing on a retracement of `distance` from the peak.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "TrailingRepr", into = "TrailingRepr")]
pub enum TrailingConfig {
    #[default]
    None,
    Active { activation: f64, distance: f64 },
}

/// Wire forms accepted for `stop_loss.trailing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TrailingRepr {
    Keyword(String),
    Distance(f64),
    Active {
        #[serde(default)]
        activation: f64,
        distance: f64,
    },
}

impl TryFrom<TrailingRepr> for TrailingConfig {
    type Error = String;

    fn try_from(repr: TrailingRepr) -> Result<Self, Self::Error> {
        match repr {
            TrailingRepr::Keyword(word) if word.eq_ignore_ascii_case("none") => Ok(Self::None),
            TrailingRepr::Keyword(word) => Err(format!("unknown trailing mode '{word}'")),
            TrailingRepr::Distance(distance) => Ok(Self::Active {
                activation: 0.0,
                distance,
            }),
            TrailingRepr::Active {
                activation,
                distance,
            } => Ok(Self::Active {
                activation,
                distance,
            }),
        }
    }
}

impl From<TrailingConfig> for TrailingRepr {
    fn from(config: TrailingConfig) -> Self {
        match config {
            TrailingConfig::None => Self::Keyword("none".into()),
            TrailingConfig::Active {
                activation,
                distance,
            } => Self::Active {
                activation,
                distance,
            },
        }
    }
}

/// Fixed and trailing stop configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopLossConfig {
    /// Signed fractional return threshold, e.g. `-0.2` for −20%.
    pub initial: f64,
    #[serde(default)]
    pub trailing: TrailingConfig,
}

impl StopLossConfig {
    pub fn fixed(initial: f64) -> Self {
        Self {
            initial,
            trailing: TrailingConfig::None,
        }
    }

    pub fn with_trailing(mut self, activation: f64, distance: f64) -> Self {
        self.trailing = TrailingConfig::Active {
            activation,
            distance,
        };
        self
    }
}

/// When the initial entry fires.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EntryTrigger {
    /// Enter at the open of the first visible candle.
    #[default]
    #[serde(alias = "none")]
    Immediate,
    /// Wait for the price to fall `percent` below the first open.
    PriceDrop { percent: f64 },
    /// Wait for the price to rise `percent` above the first open.
    Breakout { percent: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EntryConfig {
    #[serde(default)]
    pub trigger: EntryTrigger,
    /// Conditional triggers expire this many seconds after the alert.
    #[serde(default, alias = "maxWaitTime", alias = "max_wait_time")]
    pub max_wait_secs: Option<u64>,
}

/// Re-entry trigger after a position closes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReEntryTrigger {
    #[default]
    None,
    /// Re-enter once price retraces `fraction` from the last exit.
    Retrace { fraction: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReEntryConfig {
    #[serde(default)]
    pub trigger: ReEntryTrigger,
    #[serde(default, alias = "maxReEntries", alias = "max_reentries")]
    pub max_re_entries: u32,
    #[serde(default = "default_size_percent", alias = "sizePercent")]
    pub size_percent: f64,
}

fn default_size_percent() -> f64 {
    1.0
}

impl Default for ReEntryConfig {
    fn default() -> Self {
        Self {
            trigger: ReEntryTrigger::None,
            max_re_entries: 0,
            size_percent: default_size_percent(),
        }
    }
}

impl ReEntryConfig {
    pub fn retrace(fraction: f64, max_re_entries: u32, size_percent: f64) -> Self {
        Self {
            trigger: ReEntryTrigger::Retrace { fraction },
            max_re_entries,
            size_percent,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self.trigger, ReEntryTrigger::None) && self.max_re_entries > 0
    }
}

/// Fees, slippage, borrow, participation and latency parameters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostConfig {
    #[serde(default, alias = "takerFeeBps")]
    pub taker_fee_bps: f64,
    #[serde(default, alias = "entrySlippageBps")]
    pub entry_slippage_bps: f64,
    #[serde(default, alias = "exitSlippageBps")]
    pub exit_slippage_bps: f64,
    #[serde(default, alias = "borrowAprBps")]
    pub borrow_apr_bps: f64,
    /// Full entry model; overrides `entry_slippage_bps` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_slippage: Option<SlippageModel>,
    /// Full exit model; overrides `exit_slippage_bps` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_slippage: Option<SlippageModel>,
    /// Cap on the share of a candle's volume one fill may take.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "maxParticipation")]
    pub max_participation: Option<f64>,
    #[serde(default, alias = "baseLatencyMs")]
    pub base_latency_ms: u64,
    #[serde(default, alias = "latencyJitterMs")]
    pub latency_jitter_ms: u64,
}

impl CostConfig {
    pub fn frictionless() -> Self {
        Self::default()
    }

    pub fn flat(taker_fee_bps: f64, slippage_bps: f64) -> Self {
        Self {
            taker_fee_bps,
            entry_slippage_bps: slippage_bps,
            exit_slippage_bps: slippage_bps,
            ..Self::default()
        }
    }

    pub fn entry_model(&self) -> SlippageModel {
        self.entry_slippage
            .unwrap_or_else(|| SlippageModel::fixed(self.entry_slippage_bps))
    }

    pub fn exit_model(&self) -> SlippageModel {
        self.exit_slippage
            .unwrap_or_else(|| SlippageModel::fixed(self.exit_slippage_bps))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, v) in [
            ("taker_fee_bps", self.taker_fee_bps),
            ("entry_slippage_bps", self.entry_slippage_bps),
            ("exit_slippage_bps", self.exit_slippage_bps),
            ("borrow_apr_bps", self.borrow_apr_bps),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(ConfigError::InvalidCost(format!(
                    "{field} must be finite and >= 0, got {v}"
                )));
            }
        }
        if self.taker_fee_bps >= 10_000.0 {
            return Err(ConfigError::InvalidCost(
                "taker_fee_bps must be below 10000".into(),
            ));
        }
        if let Some(p) = self.max_participation {
            if !p.is_finite() || p <= 0.0 || p > 1.0 {
                return Err(ConfigError::InvalidCost(format!(
                    "max_participation must be in (0, 1], got {p}"
                )));
            }
        }
        self.entry_model().validate("entry")?;
        self.exit_model().validate("exit")?;
        Ok(())
    }
}

/// Complete strategy configuration for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(default)]
    pub side: PositionSide,
    #[serde(default)]
    pub entry: EntryConfig,
    #[serde(default)]
    pub legs: Vec<StrategyLeg>,
    #[serde(default)]
    pub stop_loss: Option<StopLossConfig>,
    #[serde(default)]
    pub re_entry: ReEntryConfig,
    #[serde(default)]
    pub cost: CostConfig,
    /// Caps the simulation window; set by time-exit overlays.
    #[serde(default)]
    pub max_candles: Option<usize>,
    /// Quote-currency notional of the full position; scales trade size for
    /// size-dependent slippage.
    #[serde(default = "default_notional")]
    pub position_notional: f64,
}

fn default_notional() -> f64 {
    1.0
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            side: PositionSide::Long,
            entry: EntryConfig::default(),
            legs: Vec::new(),
            stop_loss: None,
            re_entry: ReEntryConfig::default(),
            cost: CostConfig::default(),
            max_candles: None,
            position_notional: default_notional(),
        }
    }
}

impl StrategyConfig {
    pub fn allocated_percent(&self) -> f64 {
        self.legs.iter().map(|leg| leg.percent).sum()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (index, leg) in self.legs.iter().enumerate() {
            if !leg.target_multiple.is_finite() || leg.target_multiple <= 1.0 {
                return Err(ConfigError::InvalidLegTarget {
                    index,
                    target: leg.target_multiple,
                });
            }
            if !leg.percent.is_finite() || leg.percent <= 0.0 || leg.percent > 1.0 {
                return Err(ConfigError::InvalidLegPercent {
                    index,
                    percent: leg.percent,
                });
            }
        }
        let total = self.allocated_percent();
        if total > 1.0 + ALLOCATION_EPSILON {
            return Err(ConfigError::LadderOverAllocated { total });
        }

        if let Some(stop) = &self.stop_loss {
            if !stop.initial.is_finite() || stop.initial <= -1.0 || stop.initial >= 0.0 {
                return Err(ConfigError::InvalidStopLoss(stop.initial));
            }
            if let TrailingConfig::Active {
                activation,
                distance,
            } = stop.trailing
            {
                if !activation.is_finite() || activation < 0.0 {
                    return Err(ConfigError::InvalidTrailing(format!(
                        "activation must be finite and >= 0, got {activation}"
                    )));
                }
                if !distance.is_finite() || distance <= 0.0 || distance >= 1.0 {
                    return Err(ConfigError::InvalidTrailing(format!(
                        "distance must be in (0, 1), got {distance}"
                    )));
                }
            }
        }

        match self.entry.trigger {
            EntryTrigger::Immediate => {}
            EntryTrigger::PriceDrop { percent } => {
                if !percent.is_finite() || percent <= 0.0 || percent >= 1.0 {
                    return Err(ConfigError::InvalidEntryTrigger(format!(
                        "price_drop percent must be in (0, 1), got {percent}"
                    )));
                }
            }
            EntryTrigger::Breakout { percent } => {
                if !percent.is_finite() || percent <= 0.0 {
                    return Err(ConfigError::InvalidEntryTrigger(format!(
                        "breakout percent must be > 0, got {percent}"
                    )));
                }
            }
        }

        if let ReEntryTrigger::Retrace { fraction } = self.re_entry.trigger {
            if !fraction.is_finite() || fraction < 0.0 || fraction >= 1.0 {
                return Err(ConfigError::InvalidReEntry(format!(
                    "retrace fraction must be in [0, 1), got {fraction}"
                )));
            }
        }
        let size = self.re_entry.size_percent;
        if !size.is_finite() || size <= 0.0 || size > 1.0 {
            return Err(ConfigError::InvalidReEntry(format!(
                "size_percent must be in (0, 1], got {size}"
            )));
        }

        self.cost.validate()?;

        if !self.position_notional.is_finite() || self.position_notional <= 0.0 {
            return Err(ConfigError::InvalidNotional(self.position_notional));
        }
        if self.max_candles == Some(0) {
            return Err(ConfigError::ZeroMaxCandles);
        }

        if !self.legs.is_empty() && total < 1.0 - ALLOCATION_EPSILON {
            tracing::warn!(
                allocated = total,
                "ladder leaves a residual; it exits by stop or final exit"
            );
        }
        Ok(())
    }
}

/// Construction-time configuration failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("ladder percents sum to {total}, which exceeds 1.0")]
    LadderOverAllocated { total: f64 },

    #[error("leg {index}: target multiple must be finite and > 1, got {target}")]
    InvalidLegTarget { index: usize, target: f64 },

    #[error("leg {index}: percent must be in (0, 1], got {percent}")]
    InvalidLegPercent { index: usize, percent: f64 },

    #[error("stop_loss.initial must be in (-1, 0), got {0}")]
    InvalidStopLoss(f64),

    #[error("invalid trailing stop: {0}")]
    InvalidTrailing(String),

    #[error("invalid entry trigger: {0}")]
    InvalidEntryTrigger(String),

    #[error("invalid re-entry config: {0}")]
    InvalidReEntry(String),

    #[error("invalid cost config: {0}")]
    InvalidCost(String),

    #[error("invalid slippage model: {0}")]
    InvalidSlippage(String),

    #[error("position_notional must be finite and > 0, got {0}")]
    InvalidNotional(f64),

    #[error("max_candles must be at least 1")]
    ZeroMaxCandles,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ladder(legs: &[(f64, f64)]) -> StrategyConfig {
        StrategyConfig {
            legs: legs.iter().map(|&(t, p)| StrategyLeg::new(t, p)).collect(),
            stop_loss: Some(StopLossConfig::fixed(-0.3)),
            ..StrategyConfig::default()
        }
    }

    #[test]
    fn valid_ladder_passes() {
        assert!(ladder(&[(2.0, 0.5), (3.0, 0.5)]).validate().is_ok());
    }

    #[test]
    fn over_allocated_ladder_rejected() {
        let err = ladder(&[(2.0, 0.6), (3.0, 0.5)]).validate().unwrap_err();
        assert!(matches!(err, ConfigError::LadderOverAllocated { .. }));
    }

    #[test]
    fn leg_target_must_exceed_one() {
        let err = ladder(&[(0.9, 0.5)]).validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidLegTarget {
                index: 0,
                target: 0.9
            }
        );
    }

    #[test]
    fn stop_must_be_negative() {
        let mut config = ladder(&[]);
        config.stop_loss = Some(StopLossConfig::fixed(0.1));
        assert_eq!(config.validate(), Err(ConfigError::InvalidStopLoss(0.1)));
        config.stop_loss = Some(StopLossConfig::fixed(-1.0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn trailing_distance_bounds() {
        let mut config = ladder(&[]);
        config.stop_loss = Some(StopLossConfig::fixed(-0.2).with_trailing(0.1, 0.0));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTrailing(_))
        ));
    }

    #[test]
    fn zero_max_candles_rejected() {
        let mut config = ladder(&[]);
        config.max_candles = Some(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroMaxCandles));
    }

    #[test]
    fn negative_fee_rejected() {
        let mut config = ladder(&[]);
        config.cost.taker_fee_bps = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidCost(_))));
    }

    #[test]
    fn trailing_accepts_all_wire_forms() {
        let none: StopLossConfig =
            serde_json::from_str(r#"{"initial":-0.2,"trailing":"none"}"#).unwrap();
        assert_eq!(none.trailing, TrailingConfig::None);

        let bare: StopLossConfig =
            serde_json::from_str(r#"{"initial":-0.2,"trailing":0.1}"#).unwrap();
        assert_eq!(
            bare.trailing,
            TrailingConfig::Active {
                activation: 0.0,
                distance: 0.1
            }
        );

        let full: StopLossConfig = serde_json::from_str(
            r#"{"initial":-0.2,"trailing":{"activation":0.5,"distance":0.1}}"#,
        )
        .unwrap();
        assert_eq!(
            full.trailing,
            TrailingConfig::Active {
                activation: 0.5,
                distance: 0.1
            }
        );

        assert!(
            serde_json::from_str::<StopLossConfig>(r#"{"initial":-0.2,"trailing":"sideways"}"#)
                .is_err()
        );
    }

    #[test]
    fn entry_trigger_wire_forms() {
        let none: EntryConfig = serde_json::from_str(r#"{"trigger":{"mode":"none"}}"#).unwrap();
        assert_eq!(none.trigger, EntryTrigger::Immediate);

        let drop: EntryConfig = serde_json::from_str(
            r#"{"trigger":{"mode":"price_drop","percent":0.1},"maxWaitTime":3600}"#,
        )
        .unwrap();
        assert_eq!(drop.trigger, EntryTrigger::PriceDrop { percent: 0.1 });
        assert_eq!(drop.max_wait_secs, Some(3600));

        let empty: EntryConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.trigger, EntryTrigger::Immediate);
    }

    #[test]
    fn cost_config_accepts_camel_case() {
        let cost: CostConfig = serde_json::from_str(
            r#"{"entrySlippageBps":10,"exitSlippageBps":20,"takerFeeBps":5}"#,
        )
        .unwrap();
        assert_eq!(cost.entry_slippage_bps, 10.0);
        assert_eq!(cost.exit_slippage_bps, 20.0);
        assert_eq!(cost.taker_fee_bps, 5.0);
        assert_eq!(cost.entry_model(), SlippageModel::fixed(10.0));
    }

    #[test]
    fn re_entry_wire_form() {
        let config: ReEntryConfig = serde_json::from_str(
            r#"{"trigger":{"mode":"retrace","fraction":0.1},"maxReEntries":2,"sizePercent":0.5}"#,
        )
        .unwrap();
        assert_eq!(config, ReEntryConfig::retrace(0.1, 2, 0.5));
    }

    #[test]
    fn re_entry_defaults_disabled() {
        let config = ReEntryConfig::default();
        assert!(!config.is_enabled());
        assert!(ReEntryConfig::retrace(0.1, 2, 0.5).is_enabled());
    }
}
