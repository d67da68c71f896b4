//! Run result types.

use serde::{Deserialize, Serialize};

use crate::domain::{EventType, Position, SimulationEvent, TraceHash};

/// Why a run produced no trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoTradeReason {
    /// The window held no candles.
    NoData,
    /// The conditional entry never fired (or expired).
    EntryNotTriggered,
}

/// Position figures at the end of the run, in initial-notional units.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionSummary {
    pub realized_pnl: f64,
    pub total_fees: f64,
    pub borrow_cost: f64,
    pub re_entry_count: u32,
    pub max_size: f64,
    pub fills: usize,
}

impl PositionSummary {
    pub fn from_position(position: &Position) -> Self {
        Self {
            realized_pnl: position.realized_pnl,
            total_fees: position.total_fees,
            borrow_cost: position.borrow_cost,
            re_entry_count: position.re_entry_count,
            max_size: position.max_size,
            fills: position.executions.len(),
        }
    }
}

/// Output of one simulation run. Produced once; immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub events: Vec<SimulationEvent>,
    /// Fill price of the first entry; 0.0 when no trade happened.
    pub entry_price: f64,
    /// Fill price of the last exit; 0.0 when no trade happened.
    pub final_price: f64,
    /// Net multiplier on the initial notional (1.0 = breakeven).
    pub final_pnl: f64,
    pub total_candles: usize,
    pub trace_hash: TraceHash,
    pub seed: u64,
    pub gaps_skipped: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_trade: Option<NoTradeReason>,
    pub summary: PositionSummary,
}

impl SimulationResult {
    pub fn event_types(&self) -> Vec<EventType> {
        self.events.iter().map(|e| e.event_type).collect()
    }

    pub fn has_event(&self, kind: EventType) -> bool {
        self.events.iter().any(|e| e.event_type == kind)
    }

    pub fn traded(&self) -> bool {
        self.no_trade.is_none() && !self.events.is_empty()
    }
}
