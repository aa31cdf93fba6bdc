//! Windowing and aggregation core for scrollable, live candlestick charts.
//!
//! Keeps the bars of one series in a [`WorkingSet`](working_set::WorkingSet),
//! pages older history in on demand, folds live trades into the still-open
//! bar, and maintains per-zoom-level sliding-window extrema so a renderer can
//! scale its axes without rescanning the visible bars.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod extrema;
pub mod live;
pub mod memory;
pub mod models;
pub mod pager;
pub mod session;
pub mod source;
pub mod working_set;
pub mod zoom;

pub use error::{BarscopeError, Result};
