//! On-demand backward paging of historical bars.
//!
//! [`CandleDataPager`] asks its [`CandleDataSupplier`] for the next older page
//! and forwards what is usable. Until the first traded bar of a series has
//! been seen, leading placeholder bars are stripped and pages made only of
//! placeholders are skipped. After that every non-empty page is forwarded
//! whole, since placeholders then mark real gaps in trading.

use std::fmt;

use tracing::{debug, error, info};

use crate::Result;
use crate::models::CandleData;
use crate::source::CandleDataSupplier;

/// Hook invoked with every page the pager forwards.
pub type PageCallback = Box<dyn FnMut(&[CandleData]) + Send>;

/// What a page request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Bars to merge, oldest first.
    Received(Vec<CandleData>),
    /// The supplier has no older history.
    Exhausted,
}

/// Pages older bars from a supplier, forwarding each usable page once.
pub struct CandleDataPager<S> {
    supplier: S,
    hit_first_non_placeholder: bool,
    on_page_received: Option<PageCallback>,
    pages_forwarded: usize,
}

impl<S: CandleDataSupplier> CandleDataPager<S> {
    #[must_use]
    pub fn new(supplier: S) -> Self {
        Self {
            supplier,
            hit_first_non_placeholder: false,
            on_page_received: None,
            pages_forwarded: 0,
        }
    }

    /// Registers a hook called with each forwarded page.
    #[must_use]
    pub fn on_page_received(mut self, callback: impl FnMut(&[CandleData]) + Send + 'static) -> Self {
        self.on_page_received = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn supplier(&self) -> &S {
        &self.supplier
    }

    /// Number of pages forwarded so far.
    #[must_use]
    pub fn pages_forwarded(&self) -> usize {
        self.pages_forwarded
    }

    /// `true` once a traded bar has been seen for this series.
    #[must_use]
    pub fn has_seen_traded_bar(&self) -> bool {
        self.hit_first_non_placeholder
    }

    /// Filters one fetched page, returning the bars to forward, oldest
    /// first, or `None` if nothing in it is usable yet.
    pub fn preprocess(&mut self, mut page: Vec<CandleData>) -> Option<Vec<CandleData>> {
        if page.is_empty() {
            return None;
        }

        if page.first()?.open_time > page.last()?.open_time {
            page.reverse();
        }

        if self.hit_first_non_placeholder {
            return Some(page);
        }

        let first_traded = page.iter().position(|bar| !bar.placeholder)?;
        self.hit_first_non_placeholder = true;
        if first_traded > 0 {
            debug!(
                skipped = first_traded,
                "Dropped leading placeholder bars before first trade"
            );
        }
        page.drain(..first_traded);
        Some(page)
    }

    /// Fetches pages until one has usable bars or history runs out.
    ///
    /// A page made only of placeholders before the first trade is skipped
    /// and the next page is requested straight away.
    ///
    /// # Errors
    ///
    /// Propagates the supplier's error. Nothing is retried.
    pub async fn request_next_page(&mut self) -> Result<PageOutcome> {
        loop {
            let page = self
                .supplier
                .fetch_next_page()
                .await
                .inspect_err(|e| {
                    error!(series = %self.supplier.series(), "Failed to fetch bar page: {e}");
                })?;

            if page.is_empty() {
                info!(series = %self.supplier.series(), "No more history");
                return Ok(PageOutcome::Exhausted);
            }

            let fetched = page.len();
            match self.preprocess(page) {
                Some(bars) => {
                    self.pages_forwarded += 1;
                    if let Some(callback) = self.on_page_received.as_mut() {
                        callback(&bars);
                    }
                    return Ok(PageOutcome::Received(bars));
                }
                None => {
                    debug!(
                        series = %self.supplier.series(),
                        fetched,
                        "Page held only placeholders; requesting the next one"
                    );
                }
            }
        }
    }
}

impl<S> fmt::Debug for CandleDataPager<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandleDataPager")
            .field("hit_first_non_placeholder", &self.hit_first_non_placeholder)
            .field("pages_forwarded", &self.pages_forwarded)
            .finish_non_exhaustive()
    }
}
