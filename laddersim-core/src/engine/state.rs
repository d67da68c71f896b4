//! Mutable state that evolves candle-by-candle during one run.

use crate::domain::{Position, PositionSide, SimulationEvent};
use crate::execution::MarketContext;

use super::result::NoTradeReason;

/// Where the state machine is between candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the entry trigger.
    AwaitingEntry,
    /// Position open; exits are evaluated every candle.
    Open,
    /// Flat after a close, waiting for the re-entry trigger.
    AwaitingReEntry,
    /// Terminal. Remaining candles only count toward the window.
    Done,
}

/// Owned by exactly one run and passed by `&mut` through the loop.
#[derive(Debug, Clone)]
pub struct RunState {
    pub phase: Phase,
    pub position: Position,
    pub events: Vec<SimulationEvent>,
    /// Open of the first window candle; conditional entries measure from it.
    pub entry_reference: Option<f64>,
    pub first_entry_price: Option<f64>,
    pub window_len: usize,
    pub gaps_skipped: u64,
    pub no_trade: Option<NoTradeReason>,
    /// Market snapshot used for the most recent candle.
    pub last_market: MarketContext,
}

impl RunState {
    pub fn new(side: PositionSide) -> Self {
        Self {
            phase: Phase::AwaitingEntry,
            position: Position::new(side),
            events: Vec::new(),
            entry_reference: None,
            first_entry_price: None,
            window_len: 0,
            gaps_skipped: 0,
            no_trade: None,
            last_market: MarketContext::default(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }
}
