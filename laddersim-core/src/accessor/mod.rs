//! Causal candle access.
//!
//! The `CausalAccessor` trait answers "which candles are visible as of T"
//! and never returns a candle whose close time is after T. Two adapters
//! implement it and must agree on every query:
//! - `UpfrontAccessor`: the whole series is held in memory and cut by
//!   binary search.
//! - `StreamingAccessor`: every query goes to a `CandleStore`.

pub mod streaming;
pub mod upfront;

pub use streaming::{CandleStore, MemoryStore, StoreError, StreamingAccessor};
pub use upfront::UpfrontAccessor;

use thiserror::Error;

use crate::domain::{AssetId, Candle, CandleInterval, DataIntegrityError};

/// Errors surfaced by an accessor query.
///
/// "No data" is never an error: queries return an empty list or `None`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccessorError {
    #[error(transparent)]
    Integrity(#[from] DataIntegrityError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Point-in-time view over one (asset, interval) candle series.
pub trait CausalAccessor: Send + Sync {
    fn asset(&self) -> &AssetId;

    fn interval(&self) -> CandleInterval;

    /// Candles with `timestamp <= as_of`, oldest first.
    ///
    /// `lookback = Some(n)` keeps only the most recent `n`.
    fn candles_as_of(
        &self,
        as_of: i64,
        lookback: Option<usize>,
    ) -> Result<Vec<Candle>, AccessorError>;

    /// The first candle with `timestamp > after`, if any.
    fn next_candle_after(&self, after: i64) -> Result<Option<Candle>, AccessorError>;
}
