//! In-memory collaborator backed by a recorded trade tape.
//!
//! [`MemorySupplier`] serves every collaborator request from one sorted list
//! of trades: historical pages (newest first, like most exchange REST
//! endpoints), raw trades since a timestamp, and coarse in-progress readings
//! built from finer sub-bars. Clones share the tape but page independently.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::debug;

use crate::Result;
use crate::aggregate::{approx_from_sub_bars, bars_from_trades};
use crate::models::{ApproxInProgress, CandleData, SeriesKey, TradeData};
use crate::source::{CandleDataSupplier, LiveDataSource};

/// Replays a trade tape as bars, trades and sub-bar readings.
#[derive(Debug, Clone)]
pub struct MemorySupplier {
    series: SeriesKey,
    tape: Arc<[TradeData]>,
    history_start: i64,
    page_size: usize,
    cursor: i64,
}

impl MemorySupplier {
    /// Creates a supplier whose history spans `[history_start, history_end)`,
    /// both rounded down to a bar boundary. Pages are served from the newest
    /// end backwards.
    #[must_use]
    pub fn new(
        series: SeriesKey,
        mut trades: Vec<TradeData>,
        history_start: i64,
        history_end: i64,
        page_size: usize,
    ) -> Self {
        trades.sort_by_key(|trade| trade.timestamp);
        let duration = i64::from(series.bar_duration.max(1));
        Self {
            series,
            tape: trades.into(),
            history_start: history_start.div_euclid(duration) * duration,
            page_size: page_size.max(1),
            cursor: history_end.div_euclid(duration) * duration,
        }
    }

    /// Number of trades on the tape.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tape.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tape.is_empty()
    }

    /// Open time the next page will end before.
    #[must_use]
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Last traded price strictly before `time`.
    fn price_before(&self, time: i64) -> Option<Decimal> {
        let idx = self.tape.partition_point(|trade| trade.timestamp < time);
        idx.checked_sub(1).map(|i| self.tape[i].price)
    }

    fn bars(&self, start: i64, end: i64, interval: u32) -> Vec<CandleData> {
        bars_from_trades(&self.tape, start, end, interval, self.price_before(start))
    }
}

impl CandleDataSupplier for MemorySupplier {
    fn series(&self) -> &SeriesKey {
        &self.series
    }

    async fn fetch_next_page(&mut self) -> Result<Vec<CandleData>> {
        if self.cursor <= self.history_start {
            return Ok(Vec::new());
        }

        let duration = i64::from(self.series.bar_duration);
        let span = duration.saturating_mul(self.page_size as i64);
        let start = self.history_start.max(self.cursor - span);
        let mut page = self.bars(start, self.cursor, self.series.bar_duration);
        debug!(
            series = %self.series,
            start,
            end = self.cursor,
            bars = page.len(),
            "Served memory page"
        );
        self.cursor = start;
        page.reverse();

        Ok(page)
    }
}

impl LiveDataSource for MemorySupplier {
    async fn fetch_trades_since(&self, since: i64) -> Result<Vec<TradeData>> {
        let idx = self.tape.partition_point(|trade| trade.timestamp < since);
        Ok(self.tape[idx..].to_vec())
    }

    /// Uses sub-bars of `max(1, elapsed / page_size)` seconds and counts only
    /// the ones that have fully elapsed. Returns `None` only when nothing
    /// traded in `[open_time, open_time + elapsed)`.
    async fn fetch_approx_in_progress(
        &self,
        open_time: i64,
        elapsed: i64,
        _bar_duration: u32,
    ) -> Result<Option<ApproxInProgress>> {
        if elapsed <= 0 {
            return Ok(None);
        }

        let sub = (elapsed / self.page_size as i64).max(1);
        let cutoff = open_time + (elapsed / sub) * sub;
        let sub = u32::try_from(sub).unwrap_or(u32::MAX);
        let sub_bars = self.bars(open_time, cutoff, sub);
        if let Some(approx) = approx_from_sub_bars(&sub_bars, open_time, cutoff) {
            return Ok(Some(approx));
        }

        // Quiet sub-bars, but the unfinished tail traded: a zero-volume
        // reading sends the caller after the tail's trades.
        let tail_end = open_time + elapsed;
        let from = self.tape.partition_point(|trade| trade.timestamp < cutoff);
        if self.tape.get(from).is_none_or(|trade| trade.timestamp >= tail_end) {
            return Ok(None);
        }
        let price = self.price_before(open_time).unwrap_or(Decimal::ZERO);
        debug!(open_time, cutoff, "Quiet sub-bars with a traded tail");
        Ok(Some(ApproxInProgress {
            open_time,
            open: price,
            high: price,
            low: price,
            last_price: price,
            volume: Decimal::ZERO,
            notional: Decimal::ZERO,
            current_till: cutoff,
        }))
    }
}
