//! laddersim core: deterministic ladder-exit simulation engine.
//!
//! This crate contains the engine and everything it needs:
//! - Domain types (candles, positions, executions, events)
//! - Strategy configuration and its validation
//! - Causal candle accessors (upfront and store-backed)
//! - Execution cost model with slippage curves, fees, partial fills, latency
//! - Exit overlay compiler
//! - Candle-by-candle simulator emitting a hashed event trace
//! - Seeded SplitMix64 RNG and BLAKE3 seed hierarchy

pub mod accessor;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod execution;
pub mod fingerprint;
pub mod overlay;
pub mod rng;

pub use accessor::{CausalAccessor, StreamingAccessor, UpfrontAccessor};
pub use config::{ConfigError, StrategyConfig};
pub use engine::{SimulationResult, Simulator};
pub use error::{ErrorCode, SimError};
pub use rng::{RngHierarchy, SimRng};
