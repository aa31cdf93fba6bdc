//! Shared test utilities.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use barscope::extrema::ExtremaIndex;
use barscope::models::{
    ApproxInProgress, CandleData, Extrema, SeriesKey, TradeData, WindowExtrema,
};
use barscope::source::{CandleDataSupplier, LiveDataSource};
use barscope::{BarscopeError, Result};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

/// Builds a traded bar whose close equals its open.
pub fn bar(open: Decimal, high: Decimal, low: Decimal, volume: Decimal, open_time: i64) -> CandleData {
    CandleData::new(open, open, high, low, open_time, volume)
}

/// O(N·W) reference: every bar keyed with the min/max over itself and the
/// next `window - 1` bars that exist.
pub fn brute_force_extrema(bars: &[CandleData], window: usize) -> ExtremaIndex {
    let mut index = ExtremaIndex::new();
    for (i, start) in bars.iter().enumerate() {
        let slice = &bars[i..(i + window).min(bars.len())];
        let volume = Extrema::new(
            slice.iter().map(|b| b.volume).min().unwrap(),
            slice.iter().map(|b| b.volume).max().unwrap(),
        );
        let price = Extrema::new(
            slice.iter().map(|b| b.low).min().unwrap(),
            slice.iter().map(|b| b.high).max().unwrap(),
        );
        index.insert(start.open_time, WindowExtrema { volume, price });
    }
    index
}

/// Well-formed bars `bar_duration` apart. Values are drawn from small
/// ranges so ties are common.
pub fn arb_bars(
    len: Range<usize>,
    bar_duration: i64,
) -> impl Strategy<Value = Vec<CandleData>> {
    proptest::collection::vec((1i64..=20, 0i64..5, 0i64..10), len).prop_map(move |rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (low, spread, volume))| {
                let low = Decimal::from(low);
                let high = low + Decimal::from(spread);
                bar(low, high, low, Decimal::from(volume), i as i64 * bar_duration)
            })
            .collect()
    })
}

/// `n` seeded bars with the same shape as [`arb_bars`].
pub fn random_bars(seed: u64, n: usize, bar_duration: i64) -> Vec<CandleData> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let low = Decimal::from(rng.random_range(1i64..=20));
            let high = low + Decimal::from(rng.random_range(0i64..5));
            let volume = Decimal::from(rng.random_range(0i64..10));
            bar(low, high, low, volume, i as i64 * bar_duration)
        })
        .collect()
}

/// Seeded trades at irregular timestamps across `[start, end)`.
pub fn random_trades(seed: u64, start: i64, end: i64) -> Vec<TradeData> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut trades = Vec::new();
    let mut t = start + rng.random_range(0i64..5);
    while t < end {
        let price = Decimal::new(10_000 + rng.random_range(0i64..400), 2);
        let qty = Decimal::new(rng.random_range(10i64..100), 2);
        trades.push(TradeData::new(price, qty, t));
        t += rng.random_range(1i64..=9);
    }
    trades
}

/// Serves scripted pages and counts how often it was asked.
pub struct ScriptedSupplier {
    series: SeriesKey,
    pages: VecDeque<Result<Vec<CandleData>>>,
    pub requests: Arc<AtomicUsize>,
}

impl ScriptedSupplier {
    pub fn new(pages: Vec<Result<Vec<CandleData>>>) -> Self {
        Self {
            series: SeriesKey::new("BTC/USD", 60),
            pages: pages.into(),
            requests: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl CandleDataSupplier for ScriptedSupplier {
    fn series(&self) -> &SeriesKey {
        &self.series
    }

    async fn fetch_next_page(&mut self) -> Result<Vec<CandleData>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.pages.pop_front().unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// Live source with canned phase results that records which phases ran.
pub struct ScriptedLiveSource {
    pub approx: std::result::Result<Option<ApproxInProgress>, String>,
    pub trades: std::result::Result<Vec<TradeData>, String>,
    pub trade_requests: AtomicUsize,
}

impl ScriptedLiveSource {
    pub fn new(
        approx: std::result::Result<Option<ApproxInProgress>, String>,
        trades: std::result::Result<Vec<TradeData>, String>,
    ) -> Self {
        Self {
            approx,
            trades,
            trade_requests: AtomicUsize::new(0),
        }
    }
}

impl LiveDataSource for ScriptedLiveSource {
    async fn fetch_trades_since(&self, since: i64) -> Result<Vec<TradeData>> {
        self.trade_requests.fetch_add(1, Ordering::SeqCst);
        self.trades
            .clone()
            .map(|trades| trades.into_iter().filter(|t| t.timestamp >= since).collect())
            .map_err(BarscopeError::Fetch)
    }

    async fn fetch_approx_in_progress(
        &self,
        _open_time: i64,
        _elapsed: i64,
        _bar_duration: u32,
    ) -> Result<Option<ApproxInProgress>> {
        self.approx.clone().map_err(BarscopeError::Fetch)
    }
}
