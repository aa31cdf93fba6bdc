//! Folding raw trades into bars.
//!
//! Bars are continuous: each bar opens at the previous bar's close, and its
//! high/low envelope that open. An interval without trades becomes a
//! placeholder carrying the previous close.

use rust_decimal::Decimal;

use crate::models::{ApproxInProgress, CandleData, TradeData};

/// Running OHLCV totals for one interval.
#[derive(Debug, Clone)]
struct Bucket {
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    notional: Decimal,
    price_total: Decimal,
    count: u32,
}

impl Bucket {
    fn new(open: Decimal) -> Self {
        Self {
            open,
            high: open,
            low: open,
            close: open,
            volume: Decimal::ZERO,
            notional: Decimal::ZERO,
            price_total: Decimal::ZERO,
            count: 0,
        }
    }

    fn add(&mut self, trade: &TradeData) {
        self.high = self.high.max(trade.price);
        self.low = self.low.min(trade.price);
        self.close = trade.price;
        self.volume += trade.qty;
        self.notional += trade.notional();
        self.price_total += trade.price;
        self.count += 1;
    }

    fn into_bar(self, open_time: i64) -> CandleData {
        let vwap = if self.volume.is_zero() {
            self.close
        } else {
            self.notional / self.volume
        };
        CandleData {
            open: self.open,
            close: self.close,
            high: self.high,
            low: self.low,
            open_time,
            volume: self.volume,
            average_price: self.price_total / Decimal::from(self.count),
            vwap,
            placeholder: false,
        }
    }
}

/// Buckets `trades` into consecutive `interval`-second bars covering
/// `[start, end)`; the last bar is shorter if the span is not a multiple of
/// `interval`.
///
/// `prev_close` is the last price before `start`. Placeholders before the
/// first trade of a series, where no previous price exists, carry zero.
/// Trades outside the span are ignored; `trades` need not be sorted.
#[must_use]
pub fn bars_from_trades(
    trades: &[TradeData],
    start: i64,
    end: i64,
    interval: u32,
    prev_close: Option<Decimal>,
) -> Vec<CandleData> {
    let interval = i64::from(interval.max(1));
    if end <= start {
        return Vec::new();
    }
    let slots = usize::try_from((end - start + interval - 1) / interval).unwrap_or(0);

    let mut by_slot: Vec<Vec<&TradeData>> = vec![Vec::new(); slots];
    for trade in trades
        .iter()
        .filter(|t| t.timestamp >= start && t.timestamp < end)
    {
        let slot = ((trade.timestamp - start) / interval) as usize;
        by_slot[slot].push(trade);
    }

    let mut last_close = prev_close;
    let mut bars = Vec::with_capacity(slots);
    for (i, mut slot) in by_slot.into_iter().enumerate() {
        let open_time = start + i as i64 * interval;
        slot.sort_by_key(|t| t.timestamp);

        let Some(first) = slot.first() else {
            bars.push(CandleData::placeholder(
                open_time,
                last_close.unwrap_or(Decimal::ZERO),
            ));
            continue;
        };

        let mut bucket = Bucket::new(last_close.unwrap_or(first.price));
        for trade in &slot {
            bucket.add(trade);
        }
        let bar = bucket.into_bar(open_time);
        last_close = Some(bar.close);
        bars.push(bar);
    }

    bars
}

/// Folds finer sub-bars of the bar opened at `open_time` into one coarse
/// reading covering trades before `current_till`.
///
/// Returns `None` if there are no sub-bars or none of them traded.
#[must_use]
pub fn approx_from_sub_bars(
    sub_bars: &[CandleData],
    open_time: i64,
    current_till: i64,
) -> Option<ApproxInProgress> {
    if sub_bars.iter().all(|bar| bar.placeholder) {
        return None;
    }

    let first = sub_bars.first()?;
    let last = sub_bars.last()?;
    let traded = sub_bars.iter().filter(|bar| !bar.placeholder);

    let mut approx = ApproxInProgress {
        open_time,
        open: first.open,
        high: first.open,
        low: first.open,
        last_price: last.close,
        volume: Decimal::ZERO,
        notional: Decimal::ZERO,
        current_till,
    };
    for bar in traded {
        approx.high = approx.high.max(bar.high);
        approx.low = approx.low.min(bar.low);
        approx.volume += bar.volume;
        approx.notional += bar.vwap * bar.volume;
    }

    Some(approx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(price: Decimal, qty: Decimal, ts: i64) -> TradeData {
        TradeData::new(price, qty, ts)
    }

    #[test]
    fn buckets_trades_with_placeholders() {
        let trades = vec![
            trade(dec!(10), dec!(1), 5),
            trade(dec!(12), dec!(3), 30),
            trade(dec!(9), dec!(1), 130),
        ];
        let bars = bars_from_trades(&trades, 0, 180, 60, None);
        assert_eq!(bars.len(), 3);

        let first = &bars[0];
        assert_eq!(first.open, dec!(10));
        assert_eq!(first.high, dec!(12));
        assert_eq!(first.low, dec!(10));
        assert_eq!(first.close, dec!(12));
        assert_eq!(first.volume, dec!(4));
        assert_eq!(first.average_price, dec!(11));
        assert_eq!(first.vwap, dec!(11.5));

        assert!(bars[1].placeholder);
        assert_eq!(bars[1].close, dec!(12));
        assert_eq!(bars[1].open_time, 60);

        // Opens at the previous close.
        assert_eq!(bars[2].open, dec!(12));
        assert_eq!(bars[2].high, dec!(12));
        assert_eq!(bars[2].low, dec!(9));
        assert!(bars.iter().all(CandleData::is_well_formed));
    }

    #[test]
    fn leading_gap_without_history_is_zero_placeholder() {
        let bars = bars_from_trades(&[trade(dec!(5), dec!(1), 70)], 0, 120, 60, None);
        assert!(bars[0].placeholder);
        assert_eq!(bars[0].close, dec!(0));
        assert_eq!(bars[1].open, dec!(5));
    }

    #[test]
    fn partial_last_interval() {
        let bars = bars_from_trades(&[trade(dec!(5), dec!(1), 95)], 0, 100, 30, Some(dec!(4)));
        assert_eq!(bars.len(), 4);
        assert_eq!(bars[3].open_time, 90);
        assert_eq!(bars[3].close, dec!(5));
        assert_eq!(bars[0].close, dec!(4));
    }

    #[test]
    fn approx_combines_sub_bars() {
        let trades = vec![trade(dec!(10), dec!(1), 1), trade(dec!(14), dec!(1), 25)];
        let subs = bars_from_trades(&trades, 0, 30, 10, Some(dec!(11)));
        let approx = approx_from_sub_bars(&subs, 0, 30).unwrap();
        assert_eq!(approx.open, dec!(11));
        assert_eq!(approx.high, dec!(14));
        assert_eq!(approx.low, dec!(10));
        assert_eq!(approx.last_price, dec!(14));
        assert_eq!(approx.volume, dec!(2));
        assert_eq!(approx.notional, dec!(24));
        assert_eq!(approx.current_till, 30);
    }

    #[test]
    fn approx_of_quiet_span_is_none() {
        let subs = bars_from_trades(&[], 0, 30, 10, Some(dec!(11)));
        assert_eq!(subs.len(), 3);
        assert_eq!(approx_from_sub_bars(&subs, 0, 30), None);
        assert_eq!(approx_from_sub_bars(&[], 0, 30), None);
    }
}
