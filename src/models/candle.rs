//! Bar (candle) models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single immutable OHLCV bar.
///
/// Bars of one series are keyed and ordered by
/// [`open_time`](CandleData::open_time); order them with
/// `sort_by_key(|bar| bar.open_time)`. Equality compares every field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandleData {
    pub open: Decimal,
    pub close: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    /// Start of this bar's interval, Unix seconds.
    pub open_time: i64,
    pub volume: Decimal,
    pub average_price: Decimal,
    /// Volume-weighted average price for this bar.
    pub vwap: Decimal,
    /// `true` when no trades occurred during this bar's interval.
    #[serde(default)]
    pub placeholder: bool,
}

impl CandleData {
    /// Builds a traded bar, deriving the average price as the midpoint of
    /// the high/low range and using it for the VWAP as well.
    #[must_use]
    pub fn new(
        open: Decimal,
        close: Decimal,
        high: Decimal,
        low: Decimal,
        open_time: i64,
        volume: Decimal,
    ) -> Self {
        let average_price = (high + low) / Decimal::TWO;
        Self {
            open,
            close,
            high,
            low,
            open_time,
            volume,
            average_price,
            vwap: average_price,
            placeholder: false,
        }
    }

    /// Builds a bar for an interval with no trades: every price equals the
    /// previous close and the volume is zero.
    #[must_use]
    pub fn placeholder(open_time: i64, prev_close: Decimal) -> Self {
        Self {
            open: prev_close,
            close: prev_close,
            high: prev_close,
            low: prev_close,
            open_time,
            volume: Decimal::ZERO,
            average_price: prev_close,
            vwap: prev_close,
            placeholder: true,
        }
    }

    /// End of this bar's interval (exclusive) for the given bar duration.
    #[inline]
    #[must_use]
    pub fn close_time(&self, bar_duration: u32) -> i64 {
        self.open_time + i64::from(bar_duration)
    }

    /// Returns `true` if `low <= open, close <= high`.
    ///
    /// Placeholders are always well formed.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.placeholder
            || (self.low <= self.open
                && self.low <= self.close
                && self.open <= self.high
                && self.close <= self.high)
    }
}

/// An ordered `(min, max)` pair over one metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Extrema<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Extrema<T> {
    /// Creates a new pair.
    ///
    /// # Panics
    ///
    /// Debug builds panic if `min > max`.
    #[must_use]
    pub fn new(min: T, max: T) -> Self {
        debug_assert!(min <= max, "extrema min must not exceed max");
        Self { min, max }
    }

    /// Widens this pair so that it also covers `other`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            min: if other.min < self.min { other.min } else { self.min },
            max: if other.max > self.max { other.max } else { self.max },
        }
    }
}

/// Volume and price extrema of one visible window of bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowExtrema {
    pub volume: Extrema<Decimal>,
    /// Lowest low and highest high in the window.
    pub price: Extrema<Decimal>,
}

/// Coarse reading of the still-open bar, assembled from finer sub-bars.
///
/// Phase one of the live catch-up: every trade before
/// [`current_till`](ApproxInProgress::current_till) is reflected here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproxInProgress {
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub last_price: Decimal,
    pub volume: Decimal,
    /// Sum of `price * qty` across the covered trades.
    pub notional: Decimal,
    /// Exclusive end of the time covered by this reading, Unix seconds.
    pub current_till: i64,
}
