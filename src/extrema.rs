//! Sliding-window minimum/maximum over chronological bars.
//!
//! Each visible window of `W` bars is keyed by the open time of its oldest
//! bar. The renderer looks extrema up by the bar at the left edge of the
//! viewport, so that offset must not change.
//!
//! Full windows come from a monotonic-deque pass (amortized O(1) per bar,
//! independent of `W`). The newest `W - 1` keys, whose windows run past the
//! last known bar, come from a backward running min/max over the available
//! partial window.

use std::collections::{BTreeMap, VecDeque};

use rust_decimal::Decimal;
use tracing::error;

use crate::error::{BarscopeError, Result};
use crate::models::{CandleData, Extrema, WindowExtrema};

/// Window extrema keyed by the open time of each window's oldest bar.
pub type ExtremaIndex = BTreeMap<i64, WindowExtrema>;

/// Returns, for every full window `[i, i + window)`, the extreme value of
/// `value` inside it, in window order.
///
/// `supersedes(new, old)` is `true` when `new` makes `old` useless as a
/// future extreme: `<=` for a minimum, `>=` for a maximum.
fn monotonic_window<V, S>(bars: &[CandleData], window: usize, value: V, supersedes: S) -> Vec<Decimal>
where
    V: Fn(&CandleData) -> Decimal,
    S: Fn(Decimal, Decimal) -> bool,
{
    let mut deque: VecDeque<usize> = VecDeque::with_capacity(window);
    let mut extremes = Vec::with_capacity(bars.len() + 1 - window);

    for (i, bar) in bars.iter().enumerate() {
        let v = value(bar);
        while deque
            .back()
            .is_some_and(|&j| supersedes(v, value(&bars[j])))
        {
            deque.pop_back();
        }
        deque.push_back(i);

        while deque.front().is_some_and(|&j| j + window <= i) {
            deque.pop_front();
        }

        if i + 1 >= window {
            extremes.push(value(&bars[deque[0]]));
        }
    }

    extremes
}

fn check_window(bars: &[CandleData], window: usize) -> Result<()> {
    if window == 0 || window > bars.len() {
        error!(window, len = bars.len(), "Invalid sliding window size");
        return Err(BarscopeError::InvalidWindow {
            window,
            len: bars.len(),
        });
    }
    Ok(())
}

/// Inserts the extrema of every full window of `window` bars into `index`.
///
/// Produces `bars.len() - window + 1` entries, keyed by the open time of each
/// window's oldest bar. Existing entries for the same keys are overwritten.
///
/// # Errors
///
/// Returns [`BarscopeError::InvalidWindow`] unless `1 <= window <= bars.len()`.
pub fn put_sliding_window_extrema(
    index: &mut ExtremaIndex,
    bars: &[CandleData],
    window: usize,
) -> Result<()> {
    check_window(bars, window)?;

    let min_volume = monotonic_window(bars, window, |b| b.volume, |new, old| new <= old);
    let max_volume = monotonic_window(bars, window, |b| b.volume, |new, old| new >= old);
    let min_price = monotonic_window(bars, window, |b| b.low, |new, old| new <= old);
    let max_price = monotonic_window(bars, window, |b| b.high, |new, old| new >= old);

    for (start, bar) in bars.iter().take(min_volume.len()).enumerate() {
        index.insert(
            bar.open_time,
            WindowExtrema {
                volume: Extrema::new(min_volume[start], max_volume[start]),
                price: Extrema::new(min_price[start], max_price[start]),
            },
        );
    }

    Ok(())
}

/// Inserts extrema for windows that run past the newest bar.
///
/// `tail` must end at the newest known bar. Each bar in it is keyed with the
/// min/max over itself and every newer bar in `tail`.
pub fn put_trailing_extrema(index: &mut ExtremaIndex, tail: &[CandleData]) {
    let mut running: Option<WindowExtrema> = None;

    for bar in tail.iter().rev() {
        let own = WindowExtrema {
            volume: Extrema::new(bar.volume, bar.volume),
            price: Extrema::new(bar.low, bar.high),
        };
        let merged = match running {
            Some(prev) => WindowExtrema {
                volume: prev.volume.merge(own.volume),
                price: prev.price.merge(own.price),
            },
            None => own,
        };
        index.insert(bar.open_time, merged);
        running = Some(merged);
    }
}

/// Computes extrema for every bar of a series that ends at its newest bar:
/// full windows first, then the trailing `window - 1` partial windows.
///
/// # Errors
///
/// Returns [`BarscopeError::InvalidWindow`] unless `1 <= window <= bars.len()`.
pub fn window_extrema(bars: &[CandleData], window: usize) -> Result<ExtremaIndex> {
    let mut index = ExtremaIndex::new();
    put_window_extrema(&mut index, bars, window)?;
    Ok(index)
}

/// Like [`window_extrema`], writing into an existing index.
///
/// # Errors
///
/// Returns [`BarscopeError::InvalidWindow`] unless `1 <= window <= bars.len()`.
pub fn put_window_extrema(
    index: &mut ExtremaIndex,
    bars: &[CandleData],
    window: usize,
) -> Result<()> {
    put_sliding_window_extrema(index, bars, window)?;
    put_trailing_extrema(index, &bars[bars.len() + 1 - window..]);
    Ok(())
}
