//! OHLCV candles and candle intervals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// OHLCV candle for one instrument at one fixed interval.
///
/// `timestamp` is unix seconds with bar-close semantics: the candle becomes
/// observable at `timestamp`, never earlier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Flat candle at a single price, mostly useful for fixtures.
    pub fn flat(timestamp: i64, price: f64, volume: f64) -> Self {
        Self::new(timestamp, price, price, price, price, volume)
    }

    /// Returns true if any OHLCV field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite()
            && self.volume.is_finite())
    }

    /// OHLC envelope check plus strictly positive prices and non-negative volume.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
            && self.volume >= 0.0
    }

    /// Intrabar range as a fraction of the close. Used as the volatility proxy.
    pub fn range_fraction(&self) -> f64 {
        if self.close > 0.0 {
            (self.high - self.low) / self.close
        } else {
            0.0
        }
    }
}

/// Errors raised when a candle series breaks the ordering or envelope invariants.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataIntegrityError {
    #[error("candle {index} at {timestamp} is not after the previous candle at {previous}")]
    NonMonotonic {
        index: usize,
        previous: i64,
        timestamp: i64,
    },
    #[error("candle {index} at {timestamp} violates the OHLC envelope")]
    MalformedCandle { index: usize, timestamp: i64 },
}

/// Validate a candle series: strictly increasing timestamps and sane OHLC.
pub fn validate_series(candles: &[Candle]) -> Result<(), DataIntegrityError> {
    for (index, candle) in candles.iter().enumerate() {
        if !candle.is_sane() {
            return Err(DataIntegrityError::MalformedCandle {
                index,
                timestamp: candle.timestamp,
            });
        }
        if index > 0 {
            let previous = candles[index - 1].timestamp;
            if candle.timestamp <= previous {
                return Err(DataIntegrityError::NonMonotonic {
                    index,
                    previous,
                    timestamp: candle.timestamp,
                });
            }
        }
    }
    Ok(())
}

/// Fixed candle interval, stored in seconds.
///
/// Serialized as a compact string (`"1m"`, `"4h"`, `"1d"`, `"90s"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CandleInterval(u64);

impl CandleInterval {
    pub const ONE_MINUTE: Self = Self(60);
    pub const FIVE_MINUTES: Self = Self(300);
    pub const ONE_HOUR: Self = Self(3_600);
    pub const ONE_DAY: Self = Self(86_400);

    /// Build an interval from seconds. Returns `None` for zero.
    pub fn from_secs(secs: u64) -> Option<Self> {
        (secs > 0).then_some(Self(secs))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// Milliseconds, saturating at `u64::MAX` for absurdly long intervals.
    pub fn as_millis(&self) -> u64 {
        self.0.saturating_mul(1_000)
    }

    /// Smallest positive spacing between consecutive candles, if any.
    pub fn infer(candles: &[Candle]) -> Option<Self> {
        candles
            .windows(2)
            .map(|w| w[1].timestamp - w[0].timestamp)
            .filter(|d| *d > 0)
            .min()
            .and_then(|d| Self::from_secs(d as u64))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid candle interval '{0}' (expected e.g. 1m, 5m, 1h, 1d, 30s)")]
pub struct IntervalParseError(pub String);

impl FromStr for CandleInterval {
    type Err = IntervalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = || IntervalParseError(s.to_string());
        if trimmed.len() < 2 {
            return Err(err());
        }
        let (count, unit) = trimmed.split_at(trimmed.len() - 1);
        let count: u64 = count.parse().map_err(|_| err())?;
        let unit_secs = match unit {
            "s" => 1,
            "m" => 60,
            "h" => 3_600,
            "d" => 86_400,
            _ => return Err(err()),
        };
        count
            .checked_mul(unit_secs)
            .and_then(Self::from_secs)
            .ok_or_else(err)
    }
}

impl TryFrom<String> for CandleInterval {
    type Error = IntervalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CandleInterval> for String {
    fn from(value: CandleInterval) -> Self {
        value.to_string()
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0;
        if secs % 86_400 == 0 {
            write!(f, "{}d", secs / 86_400)
        } else if secs % 3_600 == 0 {
            write!(f, "{}h", secs / 3_600)
        } else if secs % 60 == 0 {
            write!(f, "{}m", secs / 60)
        } else {
            write!(f, "{secs}s")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candle() -> Candle {
        Candle::new(1_700_000_000, 1.0, 1.2, 0.9, 1.1, 5_000.0)
    }

    #[test]
    fn candle_is_sane() {
        assert!(sample_candle().is_sane());
    }

    #[test]
    fn candle_detects_void() {
        let mut candle = sample_candle();
        candle.close = f64::NAN;
        assert!(candle.is_void());
        assert!(!candle.is_sane());
    }

    #[test]
    fn candle_detects_broken_envelope() {
        let mut candle = sample_candle();
        candle.high = 0.95; // below close
        assert!(!candle.is_sane());
    }

    #[test]
    fn non_positive_prices_rejected() {
        let candle = Candle::new(0, 0.0, 0.0, 0.0, 0.0, 1.0);
        assert!(!candle.is_sane());
    }

    #[test]
    fn validate_series_rejects_duplicates() {
        let a = Candle::flat(60, 1.0, 1.0);
        let b = Candle::flat(60, 1.0, 1.0);
        let err = validate_series(&[a, b]).unwrap_err();
        assert_eq!(
            err,
            DataIntegrityError::NonMonotonic {
                index: 1,
                previous: 60,
                timestamp: 60
            }
        );
    }

    #[test]
    fn validate_series_accepts_gaps() {
        let series = [Candle::flat(60, 1.0, 1.0), Candle::flat(600, 1.0, 1.0)];
        assert!(validate_series(&series).is_ok());
    }

    #[test]
    fn range_fraction() {
        let candle = Candle::new(0, 10.0, 11.0, 9.0, 10.0, 0.0);
        assert!((candle.range_fraction() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn interval_parse_and_display() {
        let i: CandleInterval = "5m".parse().unwrap();
        assert_eq!(i.as_secs(), 300);
        assert_eq!(i.to_string(), "5m");
        assert_eq!("1d".parse::<CandleInterval>().unwrap(), CandleInterval::ONE_DAY);
        assert_eq!("90s".parse::<CandleInterval>().unwrap().to_string(), "90s");
        assert!("0m".parse::<CandleInterval>().is_err());
        assert!("5x".parse::<CandleInterval>().is_err());
        assert!("m".parse::<CandleInterval>().is_err());
    }

    #[test]
    fn huge_interval_millis_saturate() {
        let huge: CandleInterval = "20000000000000000s".parse().unwrap();
        assert_eq!(huge.as_millis(), u64::MAX);
        assert_eq!(CandleInterval::ONE_MINUTE.as_millis(), 60_000);
    }

    #[test]
    fn interval_serde_as_string() {
        let json = serde_json::to_string(&CandleInterval::ONE_HOUR).unwrap();
        assert_eq!(json, "\"1h\"");
        let back: CandleInterval = serde_json::from_str("\"15m\"").unwrap();
        assert_eq!(back.as_secs(), 900);
    }

    #[test]
    fn interval_infer_uses_smallest_step() {
        let series = [
            Candle::flat(0, 1.0, 0.0),
            Candle::flat(300, 1.0, 0.0),
            Candle::flat(900, 1.0, 0.0),
        ];
        assert_eq!(CandleInterval::infer(&series), Some(CandleInterval::FIVE_MINUTES));
        assert_eq!(CandleInterval::infer(&series[..1]), None);
    }
}
