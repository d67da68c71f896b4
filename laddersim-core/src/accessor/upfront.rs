//! In-memory accessor over a pre-loaded, validated series.

use std::sync::Arc;

use super::{AccessorError, CausalAccessor};
use crate::domain::{validate_series, AssetId, Candle, CandleInterval, DataIntegrityError};

#[derive(Debug, Clone)]
pub struct UpfrontAccessor {
    asset: AssetId,
    interval: CandleInterval,
    candles: Arc<[Candle]>,
}

impl UpfrontAccessor {
    /// Validates ordering and OHLC sanity once, up front.
    pub fn new(
        asset: AssetId,
        interval: CandleInterval,
        candles: impl Into<Arc<[Candle]>>,
    ) -> Result<Self, DataIntegrityError> {
        let candles = candles.into();
        validate_series(&candles)?;
        Ok(Self {
            asset,
            interval,
            candles,
        })
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Number of candles visible at `as_of`.
    fn cutoff(&self, as_of: i64) -> usize {
        self.candles.partition_point(|c| c.timestamp <= as_of)
    }
}

impl CausalAccessor for UpfrontAccessor {
    fn asset(&self) -> &AssetId {
        &self.asset
    }

    fn interval(&self) -> CandleInterval {
        self.interval
    }

    fn candles_as_of(
        &self,
        as_of: i64,
        lookback: Option<usize>,
    ) -> Result<Vec<Candle>, AccessorError> {
        let end = self.cutoff(as_of);
        let start = lookback.map_or(0, |n| end.saturating_sub(n));
        Ok(self.candles[start..end].to_vec())
    }

    fn next_candle_after(&self, after: i64) -> Result<Option<Candle>, AccessorError> {
        Ok(self.candles.get(self.cutoff(after)).copied())
    }
}
