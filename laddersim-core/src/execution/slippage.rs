//! Slippage curves: how many basis points a fill loses to market impact.
//!
//! - Fixed: constant bps.
//! - Linear: coefficient × trade size.
//! - Sqrt: coefficient × √(trade size), diminishing marginal impact.
//! - Volume-based: trade size ÷ trailing 24h volume × impact coefficient.
//!
//! Curve output is clamped to `[min_bps, max_bps]`, then scaled by the
//! volatility multiplier, then jittered by one RNG draw.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Upper bound for any configured bps; a 100% slip would zero the fill price.
pub const MAX_SLIPPAGE_BPS: f64 = 10_000.0;

/// Curve shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlippageCurve {
    Fixed { bps: f64 },
    Linear { coefficient: f64 },
    Sqrt { coefficient: f64 },
    VolumeBased { impact_coefficient: f64 },
}

impl SlippageCurve {
    /// Unclamped curve output in bps.
    ///
    /// A volume-based curve with no visible volume returns infinity, which the
    /// clamp turns into `max_bps`.
    pub fn raw_bps(&self, trade_size: f64, volume_24h: f64) -> f64 {
        match *self {
            Self::Fixed { bps } => bps,
            Self::Linear { coefficient } => coefficient * trade_size,
            Self::Sqrt { coefficient } => coefficient * trade_size.max(0.0).sqrt(),
            Self::VolumeBased { impact_coefficient } => {
                if volume_24h > 0.0 {
                    trade_size / volume_24h * impact_coefficient
                } else if trade_size > 0.0 {
                    f64::INFINITY
                } else {
                    0.0
                }
            }
        }
    }

    fn parameter(&self) -> (&'static str, f64) {
        match *self {
            Self::Fixed { bps } => ("bps", bps),
            Self::Linear { coefficient } => ("coefficient", coefficient),
            Self::Sqrt { coefficient } => ("coefficient", coefficient),
            Self::VolumeBased { impact_coefficient } => ("impact_coefficient", impact_coefficient),
        }
    }
}

/// Parameterized slippage model for one side of a trade (entry or exit).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlippageModel {
    pub curve: SlippageCurve,
    #[serde(default)]
    pub min_bps: f64,
    #[serde(default = "default_max_bps")]
    pub max_bps: f64,
    /// Scale factor applied as `1 + volatility_multiplier × range fraction`.
    #[serde(default)]
    pub volatility_multiplier: f64,
    /// Symmetric random jitter amplitude in bps.
    #[serde(default)]
    pub jitter_bps: f64,
}

fn default_max_bps() -> f64 {
    1_000.0
}

impl SlippageModel {
    pub fn fixed(bps: f64) -> Self {
        Self {
            curve: SlippageCurve::Fixed { bps },
            min_bps: 0.0,
            max_bps: bps.max(default_max_bps()),
            volatility_multiplier: 0.0,
            jitter_bps: 0.0,
        }
    }

    pub fn frictionless() -> Self {
        Self::fixed(0.0)
    }

    pub fn with_jitter(mut self, jitter_bps: f64) -> Self {
        self.jitter_bps = jitter_bps;
        self
    }

    pub fn with_bounds(mut self, min_bps: f64, max_bps: f64) -> Self {
        self.min_bps = min_bps;
        self.max_bps = max_bps;
        self
    }

    pub fn with_volatility_multiplier(mut self, multiplier: f64) -> Self {
        self.volatility_multiplier = multiplier;
        self
    }

    pub fn validate(&self, label: &str) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSlippage(format!("{label}: {reason}"));

        let (name, value) = self.curve.parameter();
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(format!("{name} must be finite and >= 0, got {value}")));
        }
        for (field, v) in [
            ("min_bps", self.min_bps),
            ("max_bps", self.max_bps),
            ("volatility_multiplier", self.volatility_multiplier),
            ("jitter_bps", self.jitter_bps),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(invalid(format!("{field} must be finite and >= 0, got {v}")));
            }
        }
        if self.min_bps > self.max_bps {
            return Err(invalid(format!(
                "min_bps {} exceeds max_bps {}",
                self.min_bps, self.max_bps
            )));
        }
        if self.max_bps + self.jitter_bps >= MAX_SLIPPAGE_BPS {
            return Err(invalid(format!(
                "max_bps + jitter_bps must stay below {MAX_SLIPPAGE_BPS}"
            )));
        }
        Ok(())
    }

    /// Effective slippage in bps.
    ///
    /// `unit_draw` is a uniform `[0, 1)` draw supplied by the caller's RNG.
    pub fn effective_bps(&self, trade_size: f64, volume_24h: f64, volatility: f64, unit_draw: f64) -> f64 {
        let curve = self
            .curve
            .raw_bps(trade_size, volume_24h)
            .clamp(self.min_bps, self.max_bps);
        let scaled = curve * (1.0 + self.volatility_multiplier * volatility.max(0.0));
        let jitter = self.jitter_bps * (unit_draw * 2.0 - 1.0);
        (scaled + jitter).clamp(0.0, MAX_SLIPPAGE_BPS - 1.0)
    }
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self::frictionless()
    }
}
