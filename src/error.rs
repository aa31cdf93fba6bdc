//! Crate-level error types.
//!
//! [`BarscopeError`] unifies every error source (configuration, collaborator
//! fetches, windowing preconditions, JSON) behind a single enum so callers can
//! match on the variant they care about while still using the `?` operator
//! for easy propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BarscopeError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum BarscopeError {
    /// Configuration could not be read, parsed, or failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A collaborator (bar supplier, trade feed) failed to deliver data.
    ///
    /// Transient; the core never retries on its own.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A sliding window was requested that does not fit the bars supplied.
    #[error("window size {window} is invalid for {len} bars")]
    InvalidWindow { window: usize, len: usize },

    /// A page was applied that is not strictly older than the known data.
    #[error("page ending at {page_newest} does not precede known data starting at {known_oldest}")]
    NonMonotonicPage { page_newest: i64, known_oldest: i64 },

    /// A page's bars were not in strictly ascending open-time order.
    #[error("page bars must be strictly ascending by open time")]
    UnorderedPage,

    /// A live bar arrived that is older than the newest known bar.
    #[error("live bar at {open_time} is older than newest bar at {newest}")]
    StaleLiveBar { open_time: i64, newest: i64 },

    /// A zoom level's extrema index has no entry for the requested bar.
    ///
    /// Always a windowing bookkeeping bug: an extend or rebuild was skipped.
    #[error("no extrema indexed for open time {open_time}")]
    MissingExtrema { open_time: i64 },

    /// The requested zoom level has not been created.
    #[error("zoom level (duration {bar_duration}s, width {bar_width}px) does not exist")]
    UnknownZoomLevel { bar_duration: u32, bar_width: u32 },

    /// A page request was issued while another one is still outstanding.
    #[error("a page request for this series is already in flight")]
    PagingInProgress,

    /// The channel linking a background task to its owner was closed.
    #[error("channel to the session owner closed")]
    ChannelClosed,
}
