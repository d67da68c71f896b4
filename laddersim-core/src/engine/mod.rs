//! Simulation engine: the per-position state machine and its run loop.
//!
//! The engine pulls candles through a `CausalAccessor`, evaluates entry,
//! ladder, stop and re-entry transitions, realizes every fill through the
//! cost model with an explicitly threaded `SimRng`, and folds the event
//! trace into a `SimulationResult`.

pub mod result;
pub mod simulator;
pub mod state;

pub use result::{NoTradeReason, PositionSummary, SimulationResult};
pub use simulator::Simulator;
pub use state::{Phase, RunState};
