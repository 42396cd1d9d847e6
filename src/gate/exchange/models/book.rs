//! Order book types.
//!
use serde::{Deserialize, Serialize};

/// One price level of an order book side: `[price, amount]`.
///
/// Serialized as a two-element JSON array, matching the unified structure
/// the trading core consumes.
pub type PriceLevel = [f64; 2];

/// Represents a snapshot of an exchange order book.
///
/// Produced only; the gateway never mutates a book after emission. Bids are
/// ordered best-first (descending price), asks best-first (ascending price),
/// exactly as the driver reports them.
///
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Market symbol in the gateway's common notation, e.g. `BTC/USDT`.
    pub symbol: String,

    /// Buy side, best offer first.
    pub bids: Vec<PriceLevel>,

    /// Sell side, best offer first.
    pub asks: Vec<PriceLevel>,

    /// Exchange timestamp of the snapshot in microseconds, if reported.
    pub timestamp_us: Option<i64>,
}
