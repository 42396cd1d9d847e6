//! Normalization of raw driver structures.
//!
//! The exchange driver returns untyped JSON in the unified structure of the
//! client library it wraps. This module formats those structures into the
//! gateway's data model: known keys are extracted, unknown keys are dropped,
//! and millisecond timestamps are converted to microseconds.
//!
use serde_json::Value;

use crate::gate::exchange::models::{
    AssetFunds, Balance, Order, OrderBook, OrderSide, OrderStatus, OrderType, PriceLevel,
};

/// Extracts the `timestamp` key (upstream milliseconds) as microseconds.
///
/// Returns `None` when the key is absent, null or zero, matching the
/// upstream convention of reporting a missing timestamp as either.
pub fn timestamp_us(raw: &Value) -> Option<i64> {
    match raw.get("timestamp").and_then(Value::as_i64) {
        Some(0) | None => None,
        Some(ms) => Some(ms * 1000),
    }
}

fn price_levels(raw: Option<&Value>) -> Vec<PriceLevel> {
    let Some(Value::Array(rows)) = raw else {
        return Vec::new();
    };
    rows.iter()
        .filter_map(|row| {
            let price = row.get(0).and_then(Value::as_f64)?;
            let amount = row.get(1).and_then(Value::as_f64)?;
            Some([price, amount])
        })
        .collect()
}

fn string_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn float_field(raw: &Value, key: &str) -> Option<f64> {
    raw.get(key).and_then(Value::as_f64)
}

/// Formats a raw order book structure.
pub fn order_book(raw: &Value) -> OrderBook {
    OrderBook {
        symbol: string_field(raw, "symbol").unwrap_or_default(),
        bids: price_levels(raw.get("bids")),
        asks: price_levels(raw.get("asks")),
        timestamp_us: timestamp_us(raw),
    }
}

/// Formats a raw balance structure, restricted to `assets`.
///
/// Assets absent upstream default to zeroed funds, so the core always
/// receives one entry per requested asset.
pub fn partial_balance(raw: &Value, assets: &[String]) -> Balance {
    let mut balance = Balance {
        timestamp_us: timestamp_us(raw),
        ..Balance::default()
    };
    for asset in assets {
        let funds = raw
            .get(asset)
            .map(|entry| AssetFunds {
                free: float_field(entry, "free").unwrap_or(0.0),
                used: float_field(entry, "used").unwrap_or(0.0),
                total: float_field(entry, "total").unwrap_or(0.0),
            })
            .unwrap_or_default();
        balance.assets.insert(asset.clone(), funds);
    }
    balance
}

fn order_type(raw: &Value) -> Option<OrderType> {
    match raw.get("type").and_then(Value::as_str) {
        Some("limit") => Some(OrderType::Limit),
        Some("market") => Some(OrderType::Market),
        _ => None,
    }
}

fn order_side(raw: &Value) -> Option<OrderSide> {
    match raw.get("side").and_then(Value::as_str) {
        Some("buy") => Some(OrderSide::Buy),
        Some("sell") => Some(OrderSide::Sell),
        _ => None,
    }
}

fn order_status(raw: &Value) -> Option<OrderStatus> {
    match raw.get("status").and_then(Value::as_str) {
        Some("open") => Some(OrderStatus::Open),
        Some("closed") => Some(OrderStatus::Closed),
        Some("canceled") | Some("cancelled") => Some(OrderStatus::Canceled),
        _ => None,
    }
}

/// Formats a raw order structure.
///
/// The upstream `clientOrderId` key is mapped onto `client_order_id`.
/// Market orders are normalized on the spot: the exchange's reported status
/// and fill are overwritten with `closed` and the full amount, because
/// market orders execute immediately and several exchanges keep reporting
/// them `open` with a zero fill.
pub fn order(raw: &Value) -> Order {
    let mut order = Order {
        id: string_field(raw, "id"),
        client_order_id: string_field(raw, "clientOrderId"),
        symbol: string_field(raw, "symbol"),
        order_type: order_type(raw),
        side: order_side(raw),
        price: float_field(raw, "price"),
        amount: float_field(raw, "amount"),
        filled: float_field(raw, "filled"),
        status: order_status(raw),
        timestamp_us: timestamp_us(raw),
        info: raw.get("info").cloned().unwrap_or(Value::Null),
    };

    if order.order_type == Some(OrderType::Market) {
        order.status = Some(OrderStatus::Closed);
        order.filled = order.amount;
    }

    order
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_book_format() {
        let raw = json!({
            "symbol": "BTC/USDT",
            "bids": [[100000.0, 0.5], [99999.5, 1.0]],
            "asks": [[100001.0, 0.25]],
            "timestamp": 1_700_000_000_123i64,
            "nonce": 42,
            "datetime": "2023-11-14T22:13:20.123Z"
        });
        let book = order_book(&raw);
        assert_eq!(book.symbol, "BTC/USDT");
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.asks, vec![[100001.0, 0.25]]);
        assert_eq!(book.timestamp_us, Some(1_700_000_000_123_000));
    }

    #[test]
    fn test_order_book_without_timestamp() {
        let raw = json!({"symbol": "ETH/USDT", "bids": [], "asks": [], "timestamp": null});
        assert_eq!(order_book(&raw).timestamp_us, None);
    }

    #[test]
    fn test_partial_balance_defaults_missing_assets() {
        let raw = json!({
            "BTC": {"free": 1.0, "used": 0.5, "total": 1.5},
            "timestamp": 1_700_000_000_000i64
        });
        let assets = vec!["BTC".to_string(), "USDT".to_string()];
        let balance = partial_balance(&raw, &assets);
        assert_eq!(balance.assets["BTC"].total, 1.5);
        assert_eq!(balance.assets["USDT"], AssetFunds::default());
        assert_eq!(balance.timestamp_us, Some(1_700_000_000_000_000));
    }

    #[test]
    fn test_order_format_maps_client_order_id() {
        let raw = json!({
            "id": "oid-1",
            "clientOrderId": "cid-1",
            "symbol": "BTC/USDT",
            "type": "limit",
            "side": "sell",
            "price": 100000.0,
            "amount": 0.0001,
            "filled": 0.0,
            "status": "open",
            "timestamp": 1_700_000_000_000i64,
            "fee": {"currency": "USDT", "cost": 0.1}
        });
        let order = order(&raw);
        assert_eq!(order.client_order_id.as_deref(), Some("cid-1"));
        assert_eq!(order.status, Some(OrderStatus::Open));
        assert_eq!(order.timestamp_us, Some(1_700_000_000_000_000));
    }

    #[test]
    fn test_market_order_normalization() {
        let raw = json!({
            "id": "oid-2",
            "clientOrderId": "cid-2",
            "symbol": "BTC/USDT",
            "type": "market",
            "side": "buy",
            "amount": 0.5,
            "filled": 0.0,
            "status": "open"
        });
        let order = order(&raw);
        assert_eq!(order.status, Some(OrderStatus::Closed));
        assert_eq!(order.filled, Some(0.5));
    }
}
