//! Fill pricing for one trade: slippage, fees, participation cap, latency.
//!
//! Slippage is directional: buyers pay more (higher price), sellers receive less (lower price).
//! Fees are a flat taker rate on filled notional.
//! Every quote takes exactly two RNG draws (slippage jitter, latency jitter), so
//! the draw sequence depends only on the sequence of fills, never on which
//! knobs are configured.

use crate::config::CostConfig;
use crate::domain::TradeSide;
use crate::execution::{SlippageCurve, SlippageModel};
use crate::rng::SimRng;

/// Causal market snapshot handed to the cost model.
///
/// Built by the simulator from candles that closed strictly before the fill
/// candle.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MarketContext {
    /// Base-unit volume over the trailing 24 hours.
    pub volume_24h: f64,
    /// Range fraction `(high - low) / close` of the most recent closed candle.
    pub volatility: f64,
    /// Base-unit volume of the most recent closed candle.
    pub candle_volume: f64,
}

/// Which slippage curve applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillLeg {
    Entry,
    Exit,
}

/// Realized fill terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub fill_price: f64,
    /// Fee in price × size units: `fill_price × filled quantity × fee_bps / 10⁴`.
    pub fee_paid: f64,
    pub slippage_bps: f64,
    /// Share of the requested quantity that filled, in `(0, 1]`.
    pub partial_fill_fraction: f64,
    pub latency_ms: u64,
}

impl Quote {
    pub fn filled_quantity(&self, requested: f64) -> f64 {
        requested * self.partial_fill_fraction
    }
}

/// Cost model for execution friction (slippage + fee + participation + latency).
#[derive(Debug, Clone)]
pub struct CostModel {
    pub entry_slippage: SlippageModel,
    pub exit_slippage: SlippageModel,
    /// Taker fee in basis points per side.
    pub taker_fee_bps: f64,
    pub max_participation: Option<f64>,
    pub base_latency_ms: u64,
    pub latency_jitter_ms: u64,
    /// Quote notional of one full size unit.
    pub position_notional: f64,
}

impl CostModel {
    pub fn new(cost: &CostConfig, position_notional: f64) -> Self {
        Self {
            entry_slippage: cost.entry_model(),
            exit_slippage: cost.exit_model(),
            taker_fee_bps: cost.taker_fee_bps,
            max_participation: cost.max_participation,
            base_latency_ms: cost.base_latency_ms,
            latency_jitter_ms: cost.latency_jitter_ms,
            position_notional,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(&CostConfig::frictionless(), 1.0)
    }

    /// Whether any quote depends on the market snapshot. When false the
    /// simulator skips building one.
    pub fn needs_market(&self) -> bool {
        let market_sensitive = |m: &SlippageModel| {
            m.volatility_multiplier > 0.0 || matches!(m.curve, SlippageCurve::VolumeBased { .. })
        };
        self.max_participation.is_some()
            || market_sensitive(&self.entry_slippage)
            || market_sensitive(&self.exit_slippage)
    }

    fn slippage_for(&self, leg: FillLeg) -> &SlippageModel {
        match leg {
            FillLeg::Entry => &self.entry_slippage,
            FillLeg::Exit => &self.exit_slippage,
        }
    }

    /// Trade size in base units for a normalized quantity at `price`.
    pub fn trade_size(&self, quantity: f64, price: f64) -> f64 {
        if price <= 0.0 {
            return 0.0;
        }
        quantity * self.position_notional / price
    }

    /// Apply slippage to a raw fill price.
    ///
    /// Directional: buyers get a worse (higher) price, sellers get a worse (lower) price.
    pub fn apply_slippage(raw_price: f64, side: TradeSide, slippage_bps: f64) -> f64 {
        let slip_fraction = slippage_bps / 10_000.0;
        match side {
            TradeSide::Buy => raw_price * (1.0 + slip_fraction),
            TradeSide::Sell => raw_price * (1.0 - slip_fraction),
        }
    }

    /// `fee = fill_price × quantity × (taker_fee_bps / 10_000)`
    pub fn compute_fee(&self, fill_price: f64, quantity: f64) -> f64 {
        fill_price * quantity * (self.taker_fee_bps / 10_000.0)
    }

    /// Share of `trade_size` the candle's liquidity admits.
    fn fill_fraction(&self, trade_size: f64, forced: bool, market: &MarketContext) -> f64 {
        if forced || trade_size <= 0.0 {
            return 1.0;
        }
        match self.max_participation {
            Some(cap) if market.candle_volume > 0.0 => {
                let capacity = cap * market.candle_volume;
                if trade_size > capacity {
                    capacity / trade_size
                } else {
                    1.0
                }
            }
            _ => 1.0,
        }
    }

    /// Realize an intended trade.
    ///
    /// `forced` marks fills that must complete (final exits); they ignore the
    /// participation cap.
    #[allow(clippy::too_many_arguments)]
    pub fn quote(
        &self,
        side: TradeSide,
        leg: FillLeg,
        intended_price: f64,
        quantity: f64,
        forced: bool,
        market: &MarketContext,
        rng: &mut SimRng,
    ) -> Quote {
        let slippage_draw = rng.next_unit();
        let latency_draw = rng.next_unit();

        let trade_size = self.trade_size(quantity, intended_price);
        let slippage_bps = self.slippage_for(leg).effective_bps(
            trade_size,
            market.volume_24h,
            market.volatility,
            slippage_draw,
        );
        let fill_price = Self::apply_slippage(intended_price, side, slippage_bps);
        let partial_fill_fraction = self.fill_fraction(trade_size, forced, market);
        let fee_paid = self.compute_fee(fill_price, quantity * partial_fill_fraction);
        let latency_ms =
            self.base_latency_ms + (latency_draw * self.latency_jitter_ms as f64).floor() as u64;

        Quote {
            fill_price,
            fee_paid,
            slippage_bps,
            partial_fill_fraction,
            latency_ms,
        }
    }
}
