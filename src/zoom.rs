//! Zoom levels and their cached extrema indexes.
//!
//! A [`ZoomLevel`] is one resolution (bar duration, bar pixel width). It owns
//! the window extrema for its visible bar count and remembers the oldest open
//! time its index covers, so paged-in history only costs the new bars plus a
//! `W - 1` bar seed. Levels live in a [`ZoomLevels`] arena keyed by
//! [`ZoomKey`] and are reused when the chart zooms back to them.

use std::collections::HashMap;

use tracing::{debug, error};

use crate::error::{BarscopeError, Result};
use crate::extrema::{ExtremaIndex, put_sliding_window_extrema, put_window_extrema};
use crate::models::{CandleData, WindowExtrema};
use crate::working_set::WorkingSet;

/// Direction of a zoom step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    /// Wider bars, fewer of them on screen.
    In,
    /// Narrower bars, more of them on screen.
    Out,
}

/// Identifies one resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ZoomKey {
    /// Bar duration in seconds.
    pub bar_duration: u32,
    /// Bar width in pixels.
    pub bar_width: u32,
}

impl ZoomKey {
    #[must_use]
    pub fn new(bar_duration: u32, bar_width: u32) -> Self {
        Self {
            bar_duration,
            bar_width,
        }
    }

    /// Returns the neighbouring resolution, or `None` if zooming out would
    /// shrink bars to a single pixel or less.
    #[must_use]
    pub fn step(self, direction: ZoomDirection) -> Option<Self> {
        let bar_width = match direction {
            ZoomDirection::In => self.bar_width.checked_add(1)?,
            ZoomDirection::Out => self.bar_width.saturating_sub(1),
        };
        (bar_width > 1).then_some(Self { bar_width, ..self })
    }
}

/// One resolution's geometry and extrema index.
#[derive(Debug, Clone)]
pub struct ZoomLevel {
    id: u32,
    key: ZoomKey,
    visible_bars: usize,
    index: ExtremaIndex,
    min_known_time: Option<i64>,
    newest_known_time: Option<i64>,
}

impl ZoomLevel {
    /// Creates an empty level for a viewport `viewport_width` pixels wide.
    #[must_use]
    pub fn new(id: u32, key: ZoomKey, viewport_width: u32) -> Self {
        Self {
            id,
            key,
            visible_bars: visible_bar_count(viewport_width, key.bar_width),
            index: ExtremaIndex::new(),
            min_known_time: None,
            newest_known_time: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn key(&self) -> ZoomKey {
        self.key
    }

    /// Number of bars that fit in the viewport; the sliding window size.
    #[must_use]
    pub fn visible_bars(&self) -> usize {
        self.visible_bars
    }

    /// Oldest open time with an indexed window.
    #[must_use]
    pub fn min_known_time(&self) -> Option<i64> {
        self.min_known_time
    }

    #[must_use]
    pub fn seconds_per_pixel(&self) -> f64 {
        f64::from(self.key.bar_duration) / f64::from(self.key.bar_width)
    }

    #[must_use]
    pub fn pixels_per_second(&self) -> f64 {
        1.0 / self.seconds_per_pixel()
    }

    /// Time span covered by one screen of bars, in seconds.
    #[must_use]
    pub fn x_axis_range_secs(&self) -> i64 {
        self.visible_bars as i64 * i64::from(self.key.bar_duration)
    }

    #[must_use]
    pub fn index(&self) -> &ExtremaIndex {
        &self.index
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns `true` if the index spans exactly the bars of `working`.
    #[must_use]
    pub fn covers(&self, working: &WorkingSet) -> bool {
        self.min_known_time == working.oldest().map(|b| b.open_time)
            && self.newest_known_time == working.newest().map(|b| b.open_time)
    }

    /// Changes the viewport width and drops the index; the caller rebuilds.
    pub fn resize(&mut self, viewport_width: u32) {
        self.visible_bars = visible_bar_count(viewport_width, self.key.bar_width);
        self.clear();
    }

    fn clear(&mut self) {
        self.index.clear();
        self.min_known_time = None;
        self.newest_known_time = None;
    }

    /// Extrema of the window whose oldest bar opens at `open_time`.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::MissingExtrema`] if nothing is indexed for
    /// `open_time`. That always means an extend or rebuild was skipped.
    pub fn extrema_at(&self, open_time: i64) -> Result<WindowExtrema> {
        self.index.get(&open_time).copied().ok_or_else(|| {
            error!(
                zoom_level = self.id,
                open_time,
                min_known_time = ?self.min_known_time,
                "Extrema lookup missed; windowing bookkeeping is out of sync"
            );
            BarscopeError::MissingExtrema { open_time }
        })
    }

    /// Clears the index and recomputes it over `bars`, which must be the
    /// whole known series in ascending order.
    ///
    /// # Errors
    ///
    /// Propagates [`BarscopeError::InvalidWindow`] from the extrema pass.
    pub fn rebuild(&mut self, bars: &[CandleData]) -> Result<()> {
        self.clear();
        let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
            return Ok(());
        };

        self.index_through_newest(bars)?;
        self.min_known_time = Some(first.open_time);
        self.newest_known_time = Some(last.open_time);
        debug!(
            zoom_level = self.id,
            bars = bars.len(),
            window = self.visible_bars,
            "Rebuilt extrema index"
        );

        Ok(())
    }

    /// Indexes a page of `older` bars that has just been prepended to
    /// `working`, seeding the window with the oldest `W - 1` bars already
    /// indexed instead of rescanning the whole series.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::NonMonotonicPage`] if `older` does not end
    /// before the oldest indexed bar.
    pub fn extend(&mut self, older: &[CandleData], working: &WorkingSet) -> Result<()> {
        let Some(min_known) = self.min_known_time else {
            return self.rebuild(&working.to_vec());
        };
        let (Some(first), Some(last)) = (older.first(), older.last()) else {
            return Ok(());
        };

        if last.open_time >= min_known {
            error!(
                zoom_level = self.id,
                page_newest = last.open_time,
                known_oldest = min_known,
                "Extend called with a page that is not older than the index"
            );
            return Err(BarscopeError::NonMonotonicPage {
                page_newest: last.open_time,
                known_oldest: min_known,
            });
        }

        let seed_len = self.visible_bars - 1;
        let mut combined = older.to_vec();
        combined.extend(working.range(min_known..).take(seed_len).cloned());

        if combined.len() - older.len() < seed_len {
            // The seed already reaches the newest bar.
            self.index_through_newest(&combined)?;
        } else {
            put_sliding_window_extrema(&mut self.index, &combined, self.visible_bars)?;
        }

        self.min_known_time = Some(first.open_time);
        debug!(
            zoom_level = self.id,
            page = older.len(),
            min_known_time = first.open_time,
            "Extended extrema index"
        );

        Ok(())
    }

    /// Re-indexes the windows touched by bars appended or replaced at the
    /// newest end of `working` since the last index update.
    ///
    /// # Errors
    ///
    /// Propagates [`BarscopeError::InvalidWindow`] from the extrema pass.
    pub fn refresh_newest(&mut self, working: &WorkingSet) -> Result<()> {
        let (Some(from), Some(newest)) = (self.newest_known_time, working.newest()) else {
            return self.rebuild(&working.to_vec());
        };
        let newest = newest.open_time;

        let tail = working.window_from(from, self.visible_bars - 1);
        self.index_through_newest(&tail)?;
        self.newest_known_time = Some(newest);

        Ok(())
    }

    /// Indexes `bars`, which must end at the newest bar and either start at
    /// the oldest bar or carry at least `W - 1` bars of lookback.
    ///
    /// A series shorter than the window is one screen wide: a window of
    /// `bars.len()` gives exactly the truncated windows.
    fn index_through_newest(&mut self, bars: &[CandleData]) -> Result<()> {
        let window = self.visible_bars.min(bars.len());
        put_window_extrema(&mut self.index, bars, window)
    }
}

fn visible_bar_count(viewport_width: u32, bar_width: u32) -> usize {
    (viewport_width / bar_width.max(1)).max(1) as usize
}

/// Arena of zoom levels keyed by resolution.
#[derive(Debug, Default)]
pub struct ZoomLevels {
    levels: HashMap<ZoomKey, ZoomLevel>,
    viewport_width: u32,
    next_id: u32,
}

impl ZoomLevels {
    #[must_use]
    pub fn new(viewport_width: u32) -> Self {
        Self {
            levels: HashMap::new(),
            viewport_width,
            next_id: 0,
        }
    }

    #[must_use]
    pub fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: ZoomKey) -> Option<&ZoomLevel> {
        self.levels.get(&key)
    }

    /// Returns the level for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`BarscopeError::UnknownZoomLevel`] if it was never created.
    pub fn get_mut(&mut self, key: ZoomKey) -> Result<&mut ZoomLevel> {
        self.levels
            .get_mut(&key)
            .ok_or(BarscopeError::UnknownZoomLevel {
                bar_duration: key.bar_duration,
                bar_width: key.bar_width,
            })
    }

    /// Returns the cached level for `key`, creating an empty one on first use.
    pub fn get_or_create(&mut self, key: ZoomKey) -> &mut ZoomLevel {
        let viewport_width = self.viewport_width;
        let next_id = &mut self.next_id;
        self.levels.entry(key).or_insert_with(|| {
            let level = ZoomLevel::new(*next_id, key, viewport_width);
            debug!(
                zoom_level = *next_id,
                bar_width = key.bar_width,
                visible_bars = level.visible_bars(),
                "Created zoom level"
            );
            *next_id += 1;
            level
        })
    }

    /// Applies a new viewport width to every cached level, clearing their
    /// indexes while keeping the levels themselves.
    pub fn resize(&mut self, viewport_width: u32) {
        self.viewport_width = viewport_width;
        for level in self.levels.values_mut() {
            level.resize(viewport_width);
        }
    }
}
