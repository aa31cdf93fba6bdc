//! Single-writer owner of one chart's data.
//!
//! [`ChartSession`] holds the working set, the zoom-level arena and the live
//! snapshot. Background tasks never touch them: page fetches and live folds
//! run on tokio tasks and report back as [`SessionMessage`]s over an
//! unbounded channel, which the owner applies one at a time with
//! [`ChartSession::handle`].
//!
//! While a page request is outstanding the pager itself lives inside the
//! fetch task, so a second request cannot be issued. Live updates that
//! arrive in that window are held back and applied after the page.

use std::ops::RangeBounds;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ChartConfig;
use crate::error::{BarscopeError, Result};
use crate::live::{InProgressCandle, LiveUpdate};
use crate::models::{CandleData, SeriesKey, TradeData, WindowExtrema};
use crate::pager::{CandleDataPager, PageOutcome};
use crate::source::CandleDataSupplier;
use crate::working_set::WorkingSet;
use crate::zoom::{ZoomDirection, ZoomKey, ZoomLevel, ZoomLevels};

/// Messages from background tasks to the session owner.
#[derive(Debug)]
pub enum SessionMessage<S> {
    /// A page request finished; the pager comes back with it.
    PageLoaded {
        pager: CandleDataPager<S>,
        outcome: PageOutcome,
    },
    /// A page request failed; the pager comes back with the error.
    PageFailed {
        pager: CandleDataPager<S>,
        error: BarscopeError,
    },
    /// The live aggregator folded a batch of trades.
    LiveUpdate(LiveUpdate),
}

/// Headless chart state for one series.
#[derive(Debug)]
pub struct ChartSession<S> {
    series: SeriesKey,
    working: WorkingSet,
    levels: ZoomLevels,
    current: ZoomKey,
    pager: Option<CandleDataPager<S>>,
    history_exhausted: bool,
    live: Option<CandleData>,
    deferred_live: Vec<LiveUpdate>,
}

impl<S: CandleDataSupplier + 'static> ChartSession<S> {
    /// Creates an empty session paging through `pager`.
    #[must_use]
    pub fn new(pager: CandleDataPager<S>, config: &ChartConfig) -> Self {
        Self {
            series: pager.supplier().series().clone(),
            working: WorkingSet::new(),
            levels: ZoomLevels::new(config.viewport_width),
            current: ZoomKey::new(config.bar_duration, config.bar_width),
            pager: Some(pager),
            history_exhausted: false,
            live: None,
            deferred_live: Vec::new(),
        }
    }

    #[must_use]
    pub fn series(&self) -> &SeriesKey {
        &self.series
    }

    #[must_use]
    pub fn working_set(&self) -> &WorkingSet {
        &self.working
    }

    #[must_use]
    pub fn current_zoom(&self) -> ZoomKey {
        self.current
    }

    /// The active zoom level, once the first data has been applied.
    #[must_use]
    pub fn current_level(&self) -> Option<&ZoomLevel> {
        self.levels.get(self.current)
    }

    #[must_use]
    pub fn zoom_levels(&self) -> &ZoomLevels {
        &self.levels
    }

    /// Latest snapshot of the in-progress bar.
    #[must_use]
    pub fn live_snapshot(&self) -> Option<&CandleData> {
        self.live.as_ref()
    }

    /// `true` while a page request is outstanding.
    #[must_use]
    pub fn is_paging(&self) -> bool {
        self.pager.is_none()
    }

    #[must_use]
    pub fn history_exhausted(&self) -> bool {
        self.history_exhausted
    }

    /// Bars whose open time falls in `range`, oldest first.
    pub fn visible_bars<R: RangeBounds<i64>>(
        &self,
        range: R,
    ) -> impl DoubleEndedIterator<Item = &CandleData> {
        self.working.range(range)
    }

    /// Extrema of the window starting at `open_time` at the current zoom.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::UnknownZoomLevel`] before any data has been
    /// applied, or [`BarscopeError::MissingExtrema`] if `open_time` is not
    /// indexed.
    pub fn current_extrema(&self, open_time: i64) -> Result<WindowExtrema> {
        self.levels
            .get(self.current)
            .ok_or(BarscopeError::UnknownZoomLevel {
                bar_duration: self.current.bar_duration,
                bar_width: self.current.bar_width,
            })?
            .extrema_at(open_time)
    }

    /// Returns `true` if the viewport's left edge at `lower_bound` reaches
    /// past the oldest known bar and more history can be requested now.
    #[must_use]
    pub fn needs_page(&self, lower_bound: i64) -> bool {
        !self.history_exhausted
            && self.pager.is_some()
            && self
                .working
                .oldest()
                .is_none_or(|oldest| lower_bound < oldest.open_time)
    }

    /// Starts fetching the next older page on a background task.
    ///
    /// Returns `false` without doing anything once history is exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::PagingInProgress`] if a request is already
    /// outstanding.
    pub fn request_page(&mut self, tx: &mpsc::UnboundedSender<SessionMessage<S>>) -> Result<bool> {
        if self.history_exhausted {
            debug!(series = %self.series, "History exhausted; page request ignored");
            return Ok(false);
        }
        let Some(pager) = self.pager.take() else {
            debug!(series = %self.series, "Page request already in flight");
            return Err(BarscopeError::PagingInProgress);
        };

        spawn_page_request(pager, tx.clone());
        Ok(true)
    }

    /// Applies one message from a background task.
    ///
    /// # Errors
    ///
    /// Returns the fetch error carried by [`SessionMessage::PageFailed`]
    /// after taking the pager back, leaving the data untouched. Otherwise
    /// propagates errors from applying the data.
    pub fn handle(&mut self, message: SessionMessage<S>) -> Result<()> {
        match message {
            SessionMessage::PageLoaded { pager, outcome } => {
                self.pager = Some(pager);
                let applied = match outcome {
                    PageOutcome::Received(bars) => self.apply_page(&bars),
                    PageOutcome::Exhausted => {
                        info!(series = %self.series, bars = self.working.len(), "Reached start of history");
                        self.history_exhausted = true;
                        Ok(())
                    }
                };
                self.apply_deferred_live()?;
                applied
            }
            SessionMessage::PageFailed { pager, error } => {
                self.pager = Some(pager);
                warn!(series = %self.series, "Page request failed; keeping last good state");
                self.apply_deferred_live()?;
                Err(error)
            }
            SessionMessage::LiveUpdate(update) => self.apply_live(update),
        }
    }

    /// Merges a page of older bars, oldest first.
    ///
    /// The first page builds the current level's index; later pages extend
    /// it leftward. Other cached levels are brought up to date when zoomed
    /// back to.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::UnorderedPage`] or
    /// [`BarscopeError::NonMonotonicPage`] if the page does not strictly
    /// precede the known bars.
    pub fn apply_page(&mut self, bars: &[CandleData]) -> Result<()> {
        self.working.prepend_page(bars)?;

        let level = self.levels.get_or_create(self.current);
        if level.is_empty() {
            level.rebuild(&self.working.to_vec())?;
        } else {
            level.extend(bars, &self.working)?;
        }

        debug!(
            series = %self.series,
            page = bars.len(),
            total = self.working.len(),
            "Applied page"
        );
        Ok(())
    }

    /// Records closed live bars and the latest snapshot, then refreshes the
    /// newest windows of the current level.
    ///
    /// Held back while a page request is outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::StaleLiveBar`] if a bar predates the newest
    /// known bar.
    pub fn apply_live(&mut self, update: LiveUpdate) -> Result<()> {
        if self.is_paging() {
            debug!(series = %self.series, "Page in flight; deferring live update");
            self.deferred_live.push(update);
            return Ok(());
        }

        for bar in update.closed {
            self.working.upsert_newest(bar)?;
        }
        if let Some(snapshot) = update.snapshot {
            self.working.upsert_newest(snapshot.clone())?;
            self.live = Some(snapshot);
        }

        if !self.working.is_empty() {
            self.levels
                .get_or_create(self.current)
                .refresh_newest(&self.working)?;
        }
        Ok(())
    }

    fn apply_deferred_live(&mut self) -> Result<()> {
        for update in std::mem::take(&mut self.deferred_live) {
            self.apply_live(update)?;
        }
        Ok(())
    }

    /// Steps the bar width and switches to that level, reusing its cached
    /// index when it still covers the working set.
    ///
    /// Returns `false` if the step would make bars too narrow.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::PagingInProgress`] while a page is in flight.
    pub fn zoom(&mut self, direction: ZoomDirection) -> Result<bool> {
        if self.is_paging() {
            return Err(BarscopeError::PagingInProgress);
        }
        let Some(next) = self.current.step(direction) else {
            debug!(bar_width = self.current.bar_width, "Zoom limit reached");
            return Ok(false);
        };

        let level = self.levels.get_or_create(next);
        let oldest = self.working.oldest().map(|bar| bar.open_time);
        if !level.covers(&self.working) {
            if !level.is_empty() && level.min_known_time() == oldest {
                level.refresh_newest(&self.working)?;
            } else {
                level.rebuild(&self.working.to_vec())?;
            }
        }

        info!(
            zoom_level = level.id(),
            bar_width = next.bar_width,
            visible_bars = level.visible_bars(),
            "Zoomed"
        );
        self.current = next;
        Ok(true)
    }

    /// Applies a new viewport width: every level is cleared and the current
    /// one is rebuilt.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::PagingInProgress`] while a page is in flight.
    pub fn resize(&mut self, viewport_width: u32) -> Result<()> {
        if self.is_paging() {
            return Err(BarscopeError::PagingInProgress);
        }
        self.levels.resize(viewport_width);
        if !self.working.is_empty() {
            self.levels
                .get_or_create(self.current)
                .rebuild(&self.working.to_vec())?;
        }
        info!(viewport_width, "Resized chart");
        Ok(())
    }
}

/// Fetches the next page on a background task and sends the pager back with
/// the result.
pub fn spawn_page_request<S: CandleDataSupplier + 'static>(
    mut pager: CandleDataPager<S>,
    tx: mpsc::UnboundedSender<SessionMessage<S>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let message = match pager.request_next_page().await {
            Ok(outcome) => SessionMessage::PageLoaded { pager, outcome },
            Err(error) => SessionMessage::PageFailed { pager, error },
        };
        if tx.send(message).is_err() {
            debug!("Session dropped before page arrived; discarding");
        }
    })
}

/// Drains the trade queue every `drain_every`, folds the batch into `candle`
/// and sends each update to the owner.
///
/// `now` supplies the current Unix time. The task ends when the trade queue
/// closes or the owner goes away, returning the candle.
pub fn spawn_live_aggregator<S, F>(
    mut candle: InProgressCandle,
    mut trades: mpsc::Receiver<TradeData>,
    drain_every: Duration,
    now: F,
    tx: mpsc::UnboundedSender<SessionMessage<S>>,
) -> JoinHandle<InProgressCandle>
where
    S: Send + 'static,
    F: Fn() -> i64 + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(drain_every);
        loop {
            interval.tick().await;

            let mut batch = Vec::new();
            let feed_closed = loop {
                match trades.try_recv() {
                    Ok(trade) => batch.push(trade),
                    Err(TryRecvError::Empty) => break false,
                    Err(TryRecvError::Disconnected) => break true,
                }
            };

            let drained = batch.len();
            let update = candle.fold_trades(batch, now());
            if update.snapshot.is_some() || !update.closed.is_empty() {
                debug!(drained, closed = update.closed.len(), "Folded live trades");
                if tx.send(SessionMessage::LiveUpdate(update)).is_err() {
                    debug!("Session dropped; stopping live aggregator");
                    break;
                }
            }

            if feed_closed {
                info!("Trade feed closed; stopping live aggregator");
                break;
            }
        }
        candle
    })
}
