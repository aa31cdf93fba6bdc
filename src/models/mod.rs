//! Shared data models for chart series.
//!
//! Contains the bar and trade value types, extrema pairs, and the key that
//! identifies one (trade-pair, bar-duration) series.

pub mod candle;
pub mod trade;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use candle::{ApproxInProgress, CandleData, Extrema, WindowExtrema};
pub use trade::{Side, TradeData};

/// Bar durations (seconds) the core accepts.
pub const SUPPORTED_GRANULARITIES: [u32; 11] = [
    60, 180, 300, 900, 1800, 3600, 7200, 14400, 21600, 43200, 86400,
];

/// Returns `true` if `bar_duration` is one of [`SUPPORTED_GRANULARITIES`].
#[must_use]
pub fn is_supported_granularity(bar_duration: u32) -> bool {
    SUPPORTED_GRANULARITIES.contains(&bar_duration)
}

/// Identifies one chronological bar series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    /// Trade pair, e.g. `"BTC/USD"`.
    pub symbol: String,
    /// Bar duration in seconds.
    pub bar_duration: u32,
}

impl SeriesKey {
    #[must_use]
    pub fn new(symbol: impl Into<String>, bar_duration: u32) -> Self {
        Self {
            symbol: symbol.into(),
            bar_duration,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}s", self.symbol, self.bar_duration)
    }
}
