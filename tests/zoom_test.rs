//! Zoom-level index maintenance: rebuild, leftward extension and live
//! refresh must all agree with a full recomputation.

mod common;

use barscope::models::CandleData;
use barscope::working_set::WorkingSet;
use barscope::zoom::{ZoomKey, ZoomLevel};
use common::{arb_bars, brute_force_extrema, random_bars};
use proptest::prelude::*;
use rust_decimal_macros::dec;

fn working(bars: &[CandleData]) -> WorkingSet {
    let mut set = WorkingSet::new();
    set.prepend_page(bars).unwrap();
    set
}

#[test]
fn test_rebuild_is_idempotent() {
    let bars = random_bars(3, 60, 60);
    let mut level = ZoomLevel::new(0, ZoomKey::new(60, 8), 80);

    level.rebuild(&bars).unwrap();
    let once = level.index().clone();
    level.rebuild(&bars).unwrap();

    assert_eq!(level.index(), &once);
}

proptest! {
    #[test]
    fn test_extend_matches_full_rebuild(
        bars in arb_bars(2..80, 60),
        viewport in 10u32..400,
        page_sizes in proptest::collection::vec(1usize..15, 1..8),
    ) {
        let mut full = ZoomLevel::new(0, ZoomKey::new(60, 10), viewport);
        full.rebuild(&bars).unwrap();

        // Split newest first, cycling through the generated page sizes.
        let mut pages = Vec::new();
        let mut end = bars.len();
        for size in page_sizes.iter().cycle() {
            if end == 0 {
                break;
            }
            let start = end.saturating_sub(*size);
            pages.push(&bars[start..end]);
            end = start;
        }

        let mut incremental = ZoomLevel::new(1, ZoomKey::new(60, 10), viewport);
        let mut set = working(pages[0]);
        incremental.rebuild(pages[0]).unwrap();
        for page in &pages[1..] {
            set.prepend_page(page).unwrap();
            incremental.extend(page, &set).unwrap();
        }

        prop_assert_eq!(incremental.index(), full.index());
        prop_assert_eq!(incremental.min_known_time(), Some(0));
        prop_assert!(incremental.covers(&set));
    }
}

#[test]
fn test_extend_with_pages_smaller_than_window() {
    let bars = random_bars(9, 30, 60);
    let mut level = ZoomLevel::new(0, ZoomKey::new(60, 5), 50);
    let mut set = working(&bars[27..]);
    level.rebuild(&bars[27..]).unwrap();

    for chunk in (0..27).step_by(3).rev() {
        let page = &bars[chunk..chunk + 3];
        set.prepend_page(page).unwrap();
        level.extend(page, &set).unwrap();
    }

    assert_eq!(level.index(), &brute_force_extrema(&bars, level.visible_bars()));
}

#[test]
fn test_refresh_newest_tracks_live_bars() {
    let bars = random_bars(11, 30, 60);
    let mut level = ZoomLevel::new(0, ZoomKey::new(60, 10), 60);
    let mut set = working(&bars[..20]);
    level.rebuild(&bars[..20]).unwrap();

    for bar in &bars[20..] {
        set.upsert_newest(bar.clone()).unwrap();
        level.refresh_newest(&set).unwrap();
    }
    // Replace the newest bar in place, as a live snapshot does.
    let mut revised = bars[29].clone();
    revised.high = dec!(500);
    revised.volume = dec!(99);
    set.upsert_newest(revised).unwrap();
    level.refresh_newest(&set).unwrap();

    let expected = brute_force_extrema(&set.to_vec(), level.visible_bars());
    assert_eq!(level.index(), &expected);
    assert_eq!(level.extrema_at(bars[24].open_time).unwrap().price.max, dec!(500));
}

#[test]
fn test_short_series_grows_into_full_windows() {
    let bars = random_bars(5, 12, 60);
    let mut level = ZoomLevel::new(0, ZoomKey::new(60, 10), 100);
    let mut set = working(&bars[..3]);
    level.rebuild(&bars[..3]).unwrap();

    for bar in &bars[3..] {
        set.upsert_newest(bar.clone()).unwrap();
        level.refresh_newest(&set).unwrap();
    }

    assert_eq!(level.index(), &brute_force_extrema(&bars, level.visible_bars()));
}
