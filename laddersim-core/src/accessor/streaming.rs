//! Store-backed accessor: every query is a fresh read from a `CandleStore`.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use super::{AccessorError, CausalAccessor};
use crate::domain::{validate_series, AssetId, Candle, CandleInterval, DataIntegrityError};

/// Failure reported by a backing store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    Query(String),
}

/// Read-only candle storage shared across concurrent runs.
pub trait CandleStore: Send + Sync {
    /// Up to `limit` most recent candles with `timestamp <= end_inclusive`,
    /// oldest first. Unknown series yield an empty list.
    fn candles_until(
        &self,
        asset: &AssetId,
        interval: CandleInterval,
        end_inclusive: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, StoreError>;

    /// The first candle with `timestamp > after`.
    fn first_after(
        &self,
        asset: &AssetId,
        interval: CandleInterval,
        after: i64,
    ) -> Result<Option<Candle>, StoreError>;
}

type SeriesKey = (AssetId, CandleInterval);

/// In-process store keyed by (asset, interval), sorted by timestamp.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    series: BTreeMap<SeriesKey, BTreeMap<i64, Candle>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a validated series, merging with anything already stored.
    pub fn insert_series(
        &mut self,
        asset: AssetId,
        interval: CandleInterval,
        candles: &[Candle],
    ) -> Result<(), DataIntegrityError> {
        validate_series(candles)?;
        let entry = self.series.entry((asset, interval)).or_default();
        for candle in candles {
            entry.insert(candle.timestamp, *candle);
        }
        Ok(())
    }

    pub fn series_len(&self, asset: &AssetId, interval: CandleInterval) -> usize {
        self.series
            .get(&(asset.clone(), interval))
            .map_or(0, BTreeMap::len)
    }
}

impl CandleStore for MemoryStore {
    fn candles_until(
        &self,
        asset: &AssetId,
        interval: CandleInterval,
        end_inclusive: i64,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, StoreError> {
        let Some(series) = self.series.get(&(asset.clone(), interval)) else {
            return Ok(Vec::new());
        };
        let visible = series.range(..=end_inclusive).map(|(_, c)| *c);
        let mut out: Vec<Candle> = match limit {
            Some(n) => visible.rev().take(n).collect(),
            None => return Ok(visible.collect()),
        };
        out.reverse();
        Ok(out)
    }

    fn first_after(
        &self,
        asset: &AssetId,
        interval: CandleInterval,
        after: i64,
    ) -> Result<Option<Candle>, StoreError> {
        let Some(series) = self.series.get(&(asset.clone(), interval)) else {
            return Ok(None);
        };
        Ok(series
            .range((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
            .next()
            .map(|(_, c)| *c))
    }
}

/// Accessor that queries a shared store per call.
///
/// Results are re-validated and anything after `as_of` is dropped, so a
/// misbehaving store cannot leak future candles.
#[derive(Clone)]
pub struct StreamingAccessor {
    asset: AssetId,
    interval: CandleInterval,
    store: Arc<dyn CandleStore>,
}

impl StreamingAccessor {
    pub fn new(asset: AssetId, interval: CandleInterval, store: Arc<dyn CandleStore>) -> Self {
        Self {
            asset,
            interval,
            store,
        }
    }
}

impl std::fmt::Debug for StreamingAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingAccessor")
            .field("asset", &self.asset)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl CausalAccessor for StreamingAccessor {
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
        let mut candles = self
            .store
            .candles_until(&self.asset, self.interval, as_of, lookback)?;
        candles.retain(|c| c.timestamp <= as_of);
        validate_series(&candles)?;
        if let Some(n) = lookback {
            let excess = candles.len().saturating_sub(n);
            candles.drain(..excess);
        }
        Ok(candles)
    }

    fn next_candle_after(&self, after: i64) -> Result<Option<Candle>, AccessorError> {
        let next = self.store.first_after(&self.asset, self.interval, after)?;
        match next {
            Some(candle) if candle.timestamp <= after => {
                Err(DataIntegrityError::NonMonotonic {
                    index: 0,
                    previous: after,
                    timestamp: candle.timestamp,
                }
                .into())
            }
            Some(candle) if !candle.is_sane() => Err(DataIntegrityError::MalformedCandle {
                index: 0,
                timestamp: candle.timestamp,
            }
            .into()),
            other => Ok(other),
        }
    }
}
