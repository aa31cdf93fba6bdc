//! Deserialization and aggregation tests over recorded exchange payloads.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use barscope::aggregate::bars_from_trades;
use barscope::models::{CandleData, SeriesKey, Side, TradeData};
use barscope::pager::CandleDataPager;
use barscope::source::CandleDataSupplier;

const PAGE_JSON: &str = include_str!("fixtures/page.json");
const TRADES_JSON: &str = include_str!("fixtures/trades.json");

struct NoSupplier(SeriesKey);

impl CandleDataSupplier for NoSupplier {
    fn series(&self) -> &SeriesKey {
        &self.0
    }

    async fn fetch_next_page(&mut self) -> barscope::Result<Vec<CandleData>> {
        Ok(Vec::new())
    }
}

#[test]
fn test_page_deserializes() {
    let page: Vec<CandleData> =
        serde_json::from_str(PAGE_JSON).expect("Failed to deserialize page");

    assert_eq!(page.len(), 4);
    assert_eq!(page[0].open_time, 1_700_000_180);
    assert_eq!(page[0].vwap, dec!(42171.4));
    assert!(page[1].placeholder);
    assert!(!page[2].placeholder);
    assert!(page.iter().all(CandleData::is_well_formed));
}

#[test]
fn test_newest_first_page_is_preprocessed_oldest_first() {
    let page: Vec<CandleData> =
        serde_json::from_str(PAGE_JSON).expect("Failed to deserialize page");
    let mut pager = CandleDataPager::new(NoSupplier(SeriesKey::new("BTC/USD", 60)));

    let bars = pager.preprocess(page).expect("page has traded bars");
    let times: Vec<i64> = bars.iter().map(|b| b.open_time).collect();
    assert_eq!(times, vec![1_700_000_060, 1_700_000_120, 1_700_000_180]);
}

#[test]
fn test_trades_deserialize() {
    let trades: Vec<TradeData> =
        serde_json::from_str(TRADES_JSON).expect("Failed to deserialize trades");

    assert_eq!(trades.len(), 6);
    assert_eq!(trades[0].side, Some(Side::Buy));
    assert_eq!(trades[0].trade_id, Some(1001));
    assert_eq!(trades[4].side, None);
    assert_eq!(trades[3].notional(), dec!(42210.0));
}

#[test]
fn test_trades_aggregate_into_recorded_bars() {
    let trades: Vec<TradeData> =
        serde_json::from_str(TRADES_JSON).expect("Failed to deserialize trades");

    let bars = bars_from_trades(&trades, 1_700_000_060, 1_700_000_240, 60, None);
    assert_eq!(bars.len(), 3);

    assert_eq!(bars[0].open, dec!(42101.5));
    assert_eq!(bars[0].high, dec!(42160.0));
    assert_eq!(bars[0].low, dec!(42095.0));
    assert_eq!(bars[0].close, dec!(42160.0));
    assert_eq!(bars[0].volume, dec!(1.5));

    assert!(bars[1].placeholder);
    assert_eq!(bars[1].close, dec!(42160.0));

    assert_eq!(bars[2].open, dec!(42160.0));
    assert_eq!(bars[2].high, dec!(42210.0));
    assert_eq!(bars[2].low, dec!(42120.0));
    assert_eq!(bars[2].close, dec!(42180.5));
    assert_eq!(bars[2].volume, dec!(3.25));

    let total: Decimal = trades.iter().map(|t| t.qty).sum();
    assert_eq!(bars.iter().map(|b| b.volume).sum::<Decimal>(), total);
}
