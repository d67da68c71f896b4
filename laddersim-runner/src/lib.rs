//! laddersim runner: the simulator's external boundary.
//!
//! This crate builds on `laddersim-core` to provide:
//! - The versioned `SimInput` / `SimResult` contract
//! - Runner configuration (TOML) with global execution overrides
//! - Single-run execution with per-run error isolation
//! - Bounded-concurrency batches on a rayon pool
//! - Candle CSV and input JSON/JSONL loading

pub mod batch;
pub mod config;
pub mod contract;
pub mod data_loader;
pub mod runner;

pub use batch::{run_batch, BatchError, BatchItem, BatchReport};
pub use config::{RunnerConfig, RunnerConfigError};
pub use contract::{
    ClockResolution, ContractError, ExitConfig, SimInput, SimResult, CONTRACT_VERSION,
};
pub use data_loader::{
    load_candles_csv, load_inputs, parse_inputs, InputEntry, LoadError, LoadedCandles,
    MalformedInput,
};
pub use runner::{RunError, RunOutcome, SimRunner};
