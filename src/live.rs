//! The still-open bar of a live series.
//!
//! [`InProgressCandle`] is an owned accumulator. The background live task
//! folds drained trades into it and sends the resulting [`LiveUpdate`] to the
//! session; nothing else mutates it.
//!
//! # Catch-up
//!
//! A chart that attaches to a live series knows bars up to the last closed
//! one, but the bar after it is already partly traded. [`InProgressCandle::catch_up`]
//! fills that gap in two bounded requests: a coarse reading built from finer
//! sub-bars, then the raw trades since that reading's cutoff.

use std::time::{SystemTime, UNIX_EPOCH};

use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::Result;
use crate::models::{ApproxInProgress, CandleData, TradeData};
use crate::source::LiveDataSource;

/// Lifecycle of the in-progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleState {
    /// Not caught up yet, or catch-up failed. No bar is shown.
    Empty,
    /// Folding trades into the open bar.
    Accumulating,
    /// The open bar's interval has elapsed; the next fold closes it.
    ClosingBoundary,
}

/// Result of one fold, sent to the session owner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveUpdate {
    /// Bars whose interval ended during this fold, oldest first.
    pub closed: Vec<CandleData>,
    /// The open bar after the fold, if there is one.
    pub snapshot: Option<CandleData>,
}

#[derive(Debug, Clone)]
struct Accumulation {
    open_time: i64,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    last_price: Decimal,
    volume: Decimal,
    notional: Decimal,
    placeholder: bool,
}

impl Accumulation {
    fn opening(open_time: i64, prev_close: Decimal) -> Self {
        Self {
            open_time,
            open: prev_close,
            high: prev_close,
            low: prev_close,
            last_price: prev_close,
            volume: Decimal::ZERO,
            notional: Decimal::ZERO,
            placeholder: true,
        }
    }

    fn add(&mut self, trade: &TradeData) {
        self.high = self.high.max(trade.price);
        self.low = self.low.min(trade.price);
        self.last_price = trade.price;
        self.volume += trade.qty;
        self.notional += trade.notional();
        self.placeholder = false;
    }

    fn to_bar(&self) -> CandleData {
        if self.placeholder {
            return CandleData::placeholder(self.open_time, self.last_price);
        }
        let vwap = if self.volume.is_zero() {
            self.last_price
        } else {
            self.notional / self.volume
        };
        CandleData {
            open: self.open,
            close: self.last_price,
            high: self.high,
            low: self.low,
            open_time: self.open_time,
            volume: self.volume,
            average_price: (self.high + self.low) / Decimal::TWO,
            vwap,
            placeholder: false,
        }
    }
}

/// Accumulator for the currently open bar.
#[derive(Debug, Clone)]
pub struct InProgressCandle {
    bar_duration: u32,
    bar: Option<Accumulation>,
    current_till: i64,
    pending: Vec<TradeData>,
}

impl InProgressCandle {
    /// Creates an empty candle; it shows nothing until caught up.
    #[must_use]
    pub fn new(bar_duration: u32) -> Self {
        Self {
            bar_duration,
            bar: None,
            current_till: 0,
            pending: Vec::new(),
        }
    }

    /// Opens a quiet bar at `open_time` priced at `prev_close`, with every
    /// trade before `current_till` accounted for.
    pub fn open_placeholder(&mut self, open_time: i64, prev_close: Decimal, current_till: i64) {
        self.bar = Some(Accumulation::opening(open_time, prev_close));
        self.current_till = current_till;
    }

    /// Seeds the open bar from a coarse sub-bar reading. A zero-volume
    /// reading seeds a placeholder.
    pub fn seed_from_approx(&mut self, approx: &ApproxInProgress) {
        self.bar = Some(Accumulation {
            open_time: approx.open_time,
            open: approx.open,
            high: approx.high.max(approx.open),
            low: approx.low.min(approx.open),
            last_price: approx.last_price,
            volume: approx.volume,
            notional: approx.notional,
            placeholder: approx.volume.is_zero(),
        });
        self.current_till = approx.current_till;
    }

    #[must_use]
    pub fn bar_duration(&self) -> u32 {
        self.bar_duration
    }

    #[must_use]
    pub fn state(&self, now: i64) -> CandleState {
        match &self.bar {
            None => CandleState::Empty,
            Some(bar) if now >= bar.open_time + i64::from(self.bar_duration) => {
                CandleState::ClosingBoundary
            }
            Some(_) => CandleState::Accumulating,
        }
    }

    #[must_use]
    pub fn open_time(&self) -> Option<i64> {
        self.bar.as_ref().map(|bar| bar.open_time)
    }

    /// Trades before this timestamp are already folded in.
    #[must_use]
    pub fn current_till(&self) -> i64 {
        self.current_till
    }

    /// Trades held for a later interval, or received before catch-up.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Frozen view of the open bar.
    #[must_use]
    pub fn snapshot(&self) -> Option<CandleData> {
        self.bar.as_ref().map(Accumulation::to_bar)
    }

    /// Folds `trades` in timestamp order and closes every interval that
    /// ended at or before `now`.
    ///
    /// Trades older than [`current_till`](Self::current_till) are already
    /// reflected and are dropped, as are late trades for a bar that already
    /// closed. Trades for a later interval wait in the
    /// pending buffer until their interval opens. An interval that closes
    /// with no trades becomes a placeholder bar. Before catch-up every trade
    /// is buffered.
    pub fn fold_trades(
        &mut self,
        trades: impl IntoIterator<Item = TradeData>,
        now: i64,
    ) -> LiveUpdate {
        self.pending.extend(trades);
        let Some(bar) = self.bar.as_mut() else {
            if !self.pending.is_empty() {
                warn!(
                    buffered = self.pending.len(),
                    "Trades arrived before catch-up; buffering"
                );
            }
            return LiveUpdate::default();
        };

        let watermark = self.current_till;
        let before = self.pending.len();
        self.pending.retain(|trade| trade.timestamp >= watermark);
        if self.pending.len() < before {
            debug!(
                dropped = before - self.pending.len(),
                current_till = watermark,
                "Dropped trades already folded in"
            );
        }
        let opened = bar.open_time;
        let before = self.pending.len();
        self.pending.retain(|trade| trade.timestamp >= opened);
        if self.pending.len() < before {
            warn!(
                dropped = before - self.pending.len(),
                open_time = opened,
                "Dropped late trades for a closed bar"
            );
        }
        self.pending.sort_by_key(|trade| trade.timestamp);

        let duration = i64::from(self.bar_duration);
        let mut closed = Vec::new();
        loop {
            let close_time = bar.open_time + duration;
            let due = self
                .pending
                .partition_point(|trade| trade.timestamp < close_time);
            for trade in self.pending.drain(..due) {
                bar.add(&trade);
                self.current_till = self.current_till.max(trade.timestamp);
            }

            if now < close_time {
                break;
            }

            let finished = bar.to_bar();
            *bar = Accumulation::opening(close_time, finished.close);
            debug!(
                open_time = finished.open_time,
                placeholder = finished.placeholder,
                "Closed live bar"
            );
            closed.push(finished);
        }

        LiveUpdate {
            closed,
            snapshot: Some(bar.to_bar()),
        }
    }

    /// Brings the bar after `last_bar` up to date as of `now`.
    ///
    /// Phase one asks for a coarse reading of the first interval after
    /// `last_bar`. Phase two folds every trade since the reading's cutoff on
    /// top of it. When the reading is empty and that interval is still open,
    /// the bar opens as a placeholder and phase two is skipped. When history
    /// is stale, a quiet first interval closes as a placeholder and phase
    /// two starts at the next one. Intervals that already ended by `now`
    /// come back as closed bars.
    ///
    /// # Errors
    ///
    /// Propagates the failure of either phase. The candle is then left
    /// [`CandleState::Empty`].
    pub async fn catch_up<L: LiveDataSource>(
        &mut self,
        source: &L,
        last_bar: &CandleData,
        now: i64,
    ) -> Result<LiveUpdate> {
        self.bar = None;
        let open_time = last_bar.close_time(self.bar_duration);
        let duration = i64::from(self.bar_duration);
        let elapsed = (now - open_time).clamp(0, duration);

        let approx = source
            .fetch_approx_in_progress(open_time, elapsed, self.bar_duration)
            .await
            .inspect_err(|e| error!(open_time, "Catch-up phase one failed: {e}"))?;

        let since = match &approx {
            Some(approx) => approx.current_till,
            None if now - open_time >= duration => open_time + duration,
            None => {
                info!(open_time, "No trades since the last bar; opening a placeholder");
                self.open_placeholder(open_time, last_bar.close, now);
                return Ok(self.fold_trades(Vec::new(), now));
            }
        };

        let trades = source
            .fetch_trades_since(since)
            .await
            .inspect_err(|e| error!(since, "Catch-up phase two failed: {e}"))?;

        info!(
            open_time,
            cutoff = since,
            trades = trades.len(),
            "Caught up in-progress bar"
        );
        match &approx {
            Some(approx) => self.seed_from_approx(approx),
            None => self.open_placeholder(open_time, last_bar.close, since),
        }
        // The fetch covers everything before `now`; the live feed the rest.
        self.pending.retain(|trade| trade.timestamp >= now);
        let fetched = trades.into_iter().filter(|trade| trade.timestamp < now);
        let update = self.fold_trades(fetched, now);
        self.current_till = self.current_till.max(now);
        Ok(update)
    }
}

/// Current wall-clock time in Unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}
