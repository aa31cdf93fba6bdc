//! The authoritative chronological bar record for one series.

use std::collections::BTreeMap;
use std::ops::RangeBounds;

use tracing::error;

use crate::error::{BarscopeError, Result};
use crate::models::CandleData;

/// Bars of one series keyed by open time, ascending.
///
/// Grows only at the front (older pages) or at the back (live bars).
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    bars: BTreeMap<i64, CandleData>,
}

impl WorkingSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    #[must_use]
    pub fn oldest(&self) -> Option<&CandleData> {
        self.bars.values().next()
    }

    #[must_use]
    pub fn newest(&self) -> Option<&CandleData> {
        self.bars.values().next_back()
    }

    #[must_use]
    pub fn get(&self, open_time: i64) -> Option<&CandleData> {
        self.bars.get(&open_time)
    }

    /// Iterates all bars oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &CandleData> {
        self.bars.values()
    }

    /// Iterates the bars whose open time falls in `range`, oldest first.
    pub fn range<R>(&self, range: R) -> impl DoubleEndedIterator<Item = &CandleData>
    where
        R: RangeBounds<i64>,
    {
        self.bars.range(range).map(|(_, bar)| bar)
    }

    /// Returns every bar from `open_time` onward, preceded by up to
    /// `lookback` older bars.
    #[must_use]
    pub fn window_from(&self, open_time: i64, lookback: usize) -> Vec<CandleData> {
        let mut bars: Vec<CandleData> = self
            .range(..open_time)
            .rev()
            .take(lookback)
            .cloned()
            .collect();
        bars.reverse();
        bars.extend(self.range(open_time..).cloned());
        bars
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<CandleData> {
        self.bars.values().cloned().collect()
    }

    /// Prepends a page of older bars.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::UnorderedPage`] if the page is not strictly
    /// ascending, or [`BarscopeError::NonMonotonicPage`] if its newest bar is
    /// not older than every known bar. The set is unchanged on error.
    pub fn prepend_page(&mut self, page: &[CandleData]) -> Result<()> {
        if page.windows(2).any(|w| w[0].open_time >= w[1].open_time) {
            error!("Paged bars must be in ascending order by open time");
            return Err(BarscopeError::UnorderedPage);
        }

        if let (Some(last), Some(oldest)) = (page.last(), self.oldest()) {
            if last.open_time >= oldest.open_time {
                error!(
                    page_newest = last.open_time,
                    known_oldest = oldest.open_time,
                    "Page overlaps known bars"
                );
                return Err(BarscopeError::NonMonotonicPage {
                    page_newest: last.open_time,
                    known_oldest: oldest.open_time,
                });
            }
        }

        self.bars
            .extend(page.iter().map(|bar| (bar.open_time, bar.clone())));
        Ok(())
    }

    /// Inserts a live bar at the back, or replaces the newest bar if it
    /// shares its open time.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::StaleLiveBar`] if `bar` is older than the
    /// newest known bar.
    pub fn upsert_newest(&mut self, bar: CandleData) -> Result<()> {
        if let Some(newest) = self.newest() {
            if bar.open_time < newest.open_time {
                error!(
                    open_time = bar.open_time,
                    newest = newest.open_time,
                    "Live bar is older than the newest known bar"
                );
                return Err(BarscopeError::StaleLiveBar {
                    open_time: bar.open_time,
                    newest: newest.open_time,
                });
            }
        }

        self.bars.insert(bar.open_time, bar);
        Ok(())
    }
}
