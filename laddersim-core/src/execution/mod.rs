//! Turning an intended trade into a realized fill.

pub mod cost_model;
pub mod slippage;

pub use cost_model::{CostModel, FillLeg, MarketContext, Quote};
pub use slippage::{SlippageCurve, SlippageModel, MAX_SLIPPAGE_BPS};
