//! Trade models.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of the aggressing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeData {
    pub price: Decimal,
    pub qty: Decimal,
    /// Execution time, Unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub side: Option<Side>,
    #[serde(default)]
    pub trade_id: Option<u64>,
}

impl TradeData {
    /// Creates a trade without side or id information.
    #[must_use]
    pub fn new(price: Decimal, qty: Decimal, timestamp: i64) -> Self {
        Self {
            price,
            qty,
            timestamp,
            side: None,
            trade_id: None,
        }
    }

    /// Returns `price * qty`.
    #[inline]
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.price * self.qty
    }
}
