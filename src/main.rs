use std::time::Duration;

use barscope::BarscopeError;
use barscope::config::fetch_config;
use barscope::live::{InProgressCandle, unix_now};
use barscope::memory::MemorySupplier;
use barscope::models::{SeriesKey, TradeData};
use barscope::pager::CandleDataPager;
use barscope::session::{ChartSession, spawn_live_aggregator};
use barscope::zoom::ZoomDirection;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Pages of history the synthetic tape spans.
const HISTORY_PAGES: i64 = 3;

#[tokio::main]
async fn main() -> Result<(), BarscopeError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let config = fetch_config()?;
    let now = unix_now();
    let duration = i64::from(config.bar_duration);
    let series = SeriesKey::new("BTC/USD", config.bar_duration);

    let history_start = now - duration * config.page_size as i64 * HISTORY_PAGES;
    let mut walk = PriceWalk::new(now as u64);
    let tape = walk.trades(history_start, now);
    info!(series = %series, trades = tape.len(), "Generated synthetic tape");

    let supplier = MemorySupplier::new(series, tape, history_start, now, config.page_size);
    let live_source = supplier.clone();
    let pager = CandleDataPager::new(supplier).on_page_received(|bars| {
        info!(bars = bars.len(), "Page received");
    });

    let mut session = ChartSession::new(pager, &config);
    let (tx, mut rx) = mpsc::unbounded_channel();

    // First screen of history.
    session.request_page(&tx)?;
    session.handle(rx.recv().await.ok_or(BarscopeError::ChannelClosed)?)?;
    let Some(last_bar) = session.working_set().newest().cloned() else {
        warn!("No history available; nothing to chart");
        return Ok(());
    };

    let mut candle = InProgressCandle::new(config.bar_duration);
    let caught_up = candle.catch_up(&live_source, &last_bar, now).await?;
    session.apply_live(caught_up)?;
    if let Some(bar) = session.live_snapshot() {
        info!(open_time = bar.open_time, close = %bar.close, volume = %bar.volume, "Caught up");
    }

    let (trade_tx, trade_rx) = mpsc::channel(config.trade_queue_capacity);
    tokio::spawn(async move {
        for _ in 0..12 {
            tokio::time::sleep(Duration::from_millis(500)).await;
            if trade_tx.send(walk.next_trade(unix_now())).await.is_err() {
                break;
            }
        }
    });
    let aggregator = spawn_live_aggregator(
        candle,
        trade_rx,
        config.live_drain_interval(),
        unix_now,
        tx.clone(),
    );

    // Page in the rest of history; live updates wait behind each page.
    while session.request_page(&tx)? {
        while session.is_paging() {
            let message = rx.recv().await.ok_or(BarscopeError::ChannelClosed)?;
            session.handle(message)?;
        }
    }
    info!(bars = session.working_set().len(), "History loaded");

    session.zoom(ZoomDirection::In)?;
    if let Some(level) = session.current_level() {
        let screen_start = session
            .working_set()
            .iter()
            .rev()
            .nth(level.visible_bars() - 1)
            .or_else(|| session.working_set().oldest())
            .map(|bar| bar.open_time);
        if let Some(open_time) = screen_start {
            let extrema = session.current_extrema(open_time)?;
            info!(
                zoom_level = level.id(),
                open_time,
                price_min = %extrema.price.min,
                price_max = %extrema.price.max,
                volume_max = %extrema.volume.max,
                "Newest screen extrema"
            );
        }
    }

    drop(tx);
    while let Some(message) = rx.recv().await {
        session.handle(message)?;
        if let Some(bar) = session.live_snapshot() {
            info!(
                open_time = bar.open_time,
                high = %bar.high,
                low = %bar.low,
                close = %bar.close,
                "Live bar"
            );
        }
    }

    if let Ok(candle) = aggregator.await {
        info!(current_till = candle.current_till(), "Live feed finished");
    }

    Ok(())
}

/// Seeded random walk for the demo tape.
struct PriceWalk {
    rng: StdRng,
    price: Decimal,
}

impl PriceWalk {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            price: Decimal::from(30_000),
        }
    }

    fn next_trade(&mut self, timestamp: i64) -> TradeData {
        let step = Decimal::from(self.rng.random_range(-20i64..=20));
        self.price = (self.price + step).max(Decimal::ONE);
        let qty = Decimal::new(self.rng.random_range(1i64..=500), 3);
        TradeData::new(self.price, qty, timestamp)
    }

    /// One trade every few seconds to a minute across `[start, end)`.
    fn trades(&mut self, start: i64, end: i64) -> Vec<TradeData> {
        let mut trades = Vec::new();
        let mut t = start;
        while t < end {
            trades.push(self.next_trade(t));
            t += self.rng.random_range(1i64..=60);
        }
        trades
    }
}
