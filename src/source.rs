//! Collaborator interfaces implemented by exchange clients.
//!
//! The core never performs I/O itself: historical bars, raw trades and the
//! coarse in-progress reading all arrive through these traits. Failures are
//! reported as [`BarscopeError::Fetch`](crate::BarscopeError::Fetch) and are
//! never retried by the core.

use std::future::Future;

use crate::Result;
use crate::models::{ApproxInProgress, CandleData, SeriesKey, TradeData};

/// Supplies successively older pages of bars for one series.
pub trait CandleDataSupplier: Send {
    /// The series this supplier pages through.
    fn series(&self) -> &SeriesKey;

    /// Fetches the next page, strictly older than every bar returned so far.
    ///
    /// Pages hold up to a fixed number of bars, consistently oldest-first or
    /// newest-first. An empty page means there is no more history.
    fn fetch_next_page(&mut self) -> impl Future<Output = Result<Vec<CandleData>>> + Send;
}

/// Supplies the data needed to catch a freshly attached chart up to "now".
pub trait LiveDataSource: Send + Sync {
    /// Every trade with `timestamp >= since`, oldest first.
    fn fetch_trades_since(&self, since: i64) -> impl Future<Output = Result<Vec<TradeData>>> + Send;

    /// A coarse reading of the bar opened at `open_time`, built from finer
    /// sub-bars spanning the `elapsed` seconds since it opened.
    ///
    /// Returns `None` when no trades happened in that span.
    fn fetch_approx_in_progress(
        &self,
        open_time: i64,
        elapsed: i64,
        bar_duration: u32,
    ) -> impl Future<Output = Result<Option<ApproxInProgress>>> + Send;
}
