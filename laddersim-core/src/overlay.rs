//! Exit overlay DSL and its compiler.
//!
//! An overlay is a small declarative description of how a position should
//! exit. The compiler lowers it to the ladder legs, stop-loss and window cap
//! that the simulator consumes. The compiler is a pure function of its inputs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{StopLossConfig, StrategyConfig, StrategyLeg, TrailingConfig};
use crate::domain::CandleInterval;

const PERCENT_EPSILON: f64 = 1e-9;

/// Declarative exit rule. Percent parameters are in percent (20 = 20%).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExitOverlay {
    TimeExit {
        hold_ms: u64,
    },
    StopLoss {
        stop_pct: f64,
    },
    TakeProfit {
        take_pct: f64,
        /// Fraction of the initial size released at this target. When absent
        /// the remainder is split evenly across the take-profits of a combo.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        percent: Option<f64>,
    },
    TrailingStop {
        trail_pct: f64,
    },
    Combo {
        legs: Vec<ExitOverlay>,
    },
}

impl ExitOverlay {
    fn kind(&self) -> &'static str {
        match self {
            Self::TimeExit { .. } => "time_exit",
            Self::StopLoss { .. } => "stop_loss",
            Self::TakeProfit { .. } => "take_profit",
            Self::TrailingStop { .. } => "trailing_stop",
            Self::Combo { .. } => "combo",
        }
    }

    /// Depth-first flattening of nested combos.
    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a ExitOverlay>) {
        match self {
            Self::Combo { legs } => legs.iter().for_each(|leg| leg.flatten_into(out)),
            other => out.push(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OverlayError {
    #[error("overlay has more than one {0} directive")]
    ConflictingDirectives(&'static str),

    #[error("{kind}: percent must be finite and > 0, got {value}")]
    InvalidPercent { kind: &'static str, value: f64 },

    #[error("{kind} percent must be below 100, got {value}")]
    StopTooWide { kind: &'static str, value: f64 },

    #[error("take_profit size overrides sum to {0}, which exceeds 1.0")]
    OverAllocated(f64),

    #[error("take_profit size override must be in (0, 1], got {0}")]
    InvalidSizeOverride(f64),

    #[error("time_exit hold must be at least 1 ms")]
    ZeroHold,
}

/// Output of the compiler, in the shape the simulator consumes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompiledExit {
    pub legs: Vec<StrategyLeg>,
    pub stop_loss: Option<StopLossConfig>,
    pub max_candles: Option<usize>,
}

impl CompiledExit {
    /// Replace the exit section of `config` with this compiled overlay.
    pub fn apply_to(&self, config: &mut StrategyConfig) {
        config.legs = self.legs.clone();
        config.stop_loss = self.stop_loss;
        config.max_candles = self.max_candles;
    }
}

/// Lowers `ExitOverlay` trees for a given candle interval.
#[derive(Debug, Clone, Copy)]
pub struct OverlayCompiler {
    interval: CandleInterval,
    /// Candles available after the alert; time exits are clamped to it.
    available_candles: Option<usize>,
}

impl OverlayCompiler {
    pub fn new(interval: CandleInterval) -> Self {
        Self {
            interval,
            available_candles: None,
        }
    }

    pub fn with_available_candles(mut self, available: usize) -> Self {
        self.available_candles = Some(available);
        self
    }

    pub fn compile(&self, overlay: &ExitOverlay) -> Result<CompiledExit, OverlayError> {
        let mut members = Vec::new();
        overlay.flatten_into(&mut members);

        let mut take_profits: Vec<(f64, Option<f64>)> = Vec::new();
        let mut stop: Option<f64> = None;
        let mut trailing: Option<f64> = None;
        let mut hold_ms: Option<u64> = None;

        for member in members {
            match *member {
                ExitOverlay::TakeProfit { take_pct, percent } => {
                    check_percent("take_profit", take_pct)?;
                    if let Some(p) = percent {
                        if !p.is_finite() || p <= 0.0 || p > 1.0 {
                            return Err(OverlayError::InvalidSizeOverride(p));
                        }
                    }
                    take_profits.push((take_pct, percent));
                }
                ExitOverlay::StopLoss { stop_pct } => {
                    check_percent("stop_loss", stop_pct)?;
                    if stop_pct >= 100.0 {
                        return Err(OverlayError::StopTooWide {
                            kind: "stop_loss",
                            value: stop_pct,
                        });
                    }
                    set_once(&mut stop, stop_pct, member.kind())?;
                }
                ExitOverlay::TrailingStop { trail_pct } => {
                    check_percent("trailing_stop", trail_pct)?;
                    if trail_pct >= 100.0 {
                        return Err(OverlayError::StopTooWide {
                            kind: "trailing_stop",
                            value: trail_pct,
                        });
                    }
                    set_once(&mut trailing, trail_pct, member.kind())?;
                }
                ExitOverlay::TimeExit { hold_ms: ms } => {
                    if ms == 0 {
                        return Err(OverlayError::ZeroHold);
                    }
                    set_once(&mut hold_ms, ms, member.kind())?;
                }
                ExitOverlay::Combo { .. } => {}
            }
        }

        Ok(CompiledExit {
            legs: distribute_legs(&take_profits)?,
            stop_loss: compile_stop(stop, trailing),
            max_candles: hold_ms.map(|ms| self.candles_for(ms)),
        })
    }

    /// `ceil(hold / interval)`, clamped to the available data and at least 1.
    fn candles_for(&self, hold_ms: u64) -> usize {
        let interval_ms = self.interval.as_millis().max(1);
        let wanted = usize::try_from(hold_ms.div_ceil(interval_ms)).unwrap_or(usize::MAX);
        let clamped = match self.available_candles {
            Some(available) => wanted.min(available),
            None => wanted,
        };
        clamped.max(1)
    }
}

fn check_percent(kind: &'static str, value: f64) -> Result<(), OverlayError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(OverlayError::InvalidPercent { kind, value });
    }
    Ok(())
}

fn set_once<T>(slot: &mut Option<T>, value: T, kind: &'static str) -> Result<(), OverlayError> {
    if slot.is_some() {
        return Err(OverlayError::ConflictingDirectives(kind));
    }
    *slot = Some(value);
    Ok(())
}

/// Overrides are honored first; the remainder splits evenly across the rest.
fn distribute_legs(take_profits: &[(f64, Option<f64>)]) -> Result<Vec<StrategyLeg>, OverlayError> {
    let overridden: f64 = take_profits.iter().filter_map(|(_, p)| *p).sum();
    if overridden > 1.0 + PERCENT_EPSILON {
        return Err(OverlayError::OverAllocated(overridden));
    }
    let open_count = take_profits.iter().filter(|(_, p)| p.is_none()).count();
    let share = if open_count > 0 {
        (1.0 - overridden).max(0.0) / open_count as f64
    } else {
        0.0
    };

    let legs = take_profits
        .iter()
        .map(|&(take_pct, percent)| StrategyLeg::new(1.0 + take_pct / 100.0, percent.unwrap_or(share)))
        .filter(|leg| leg.percent > PERCENT_EPSILON)
        .collect();
    Ok(legs)
}

fn compile_stop(stop_pct: Option<f64>, trail_pct: Option<f64>) -> Option<StopLossConfig> {
    match (stop_pct, trail_pct) {
        (None, None) => None,
        (Some(stop), None) => Some(StopLossConfig::fixed(-stop / 100.0)),
        (stop, Some(trail)) => Some(StopLossConfig {
            initial: -stop.unwrap_or(trail) / 100.0,
            trailing: TrailingConfig::Active {
                activation: 0.0,
                distance: trail / 100.0,
            },
        }),
    }
}
