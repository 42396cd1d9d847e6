//! Order related types.
//!
//! This module defines the normalized order record the gateway exchanges
//! with the trading core, together with the parameter types carried by
//! `create_orders`, `cancel_orders` and `get_orders` commands.
//!
//! Every field of [`Order`] is optional: the synthetic `canceled` update the
//! gateway emits for an order the exchange has forgotten carries nothing but
//! the identifiers, the symbol and the terminal status.
//!
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Order type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Current status of an order, as emitted to the core.
///
/// `Closed` and `Canceled` are terminal: the first observation of either
/// removes the order from the gateway's open set and no further transitions
/// are emitted for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
}

impl OrderStatus {
    /// Whether this status ends the order's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Open)
    }
}

/// Represents an order as tracked by the gateway.
///
/// `id` is the exchange-assigned identifier, `client_order_id` the one the
/// trading core assigned before the order was sent. The gateway rewrites
/// `client_order_id` locally on every emission, because not every exchange
/// echoes it back.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Exchange-assigned order id.
    pub id: Option<String>,

    /// Core-assigned client order id, stable across retries.
    pub client_order_id: Option<String>,

    pub symbol: Option<String>,

    #[serde(rename = "type")]
    pub order_type: Option<OrderType>,

    pub side: Option<OrderSide>,

    /// Limit price; `None` for market orders and for synthetic updates.
    pub price: Option<f64>,

    pub amount: Option<f64>,

    /// Amount already executed.
    pub filled: Option<f64>,

    pub status: Option<OrderStatus>,

    /// Exchange timestamp of the order in microseconds, if reported.
    pub timestamp_us: Option<i64>,

    /// Raw driver payload, carried opaquely for the core's benefit.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub info: Value,
}

impl Order {
    /// A synthetic terminal record for an order the exchange no longer
    /// knows: identifiers and symbol only, `status = canceled`, every other
    /// field null.
    pub fn synthetic_canceled(
        id: Option<String>,
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            id,
            client_order_id: Some(client_order_id.into()),
            symbol: Some(symbol.into()),
            status: Some(OrderStatus::Canceled),
            ..Self::default()
        }
    }
}

/// Parameters identifying one order for fetch and cancel commands.
///
/// The core addresses orders by `client_order_id`; the scheduler resolves
/// the exchange id through the registry before the driver is involved.
///
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FetchOrderParams {
    /// Exchange-assigned order id, when already known.
    #[serde(default)]
    pub id: Option<String>,

    /// Core-assigned client order id.
    #[serde(default)]
    pub client_order_id: Option<String>,

    pub symbol: String,
}

/// Parameters for creating one order.
///
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateOrderParams {
    pub client_order_id: String,

    pub symbol: String,

    #[serde(rename = "type")]
    pub order_type: OrderType,

    pub side: OrderSide,

    pub amount: f64,

    /// Limit price; ignored for market orders.
    #[serde(default)]
    pub price: Option<f64>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!OrderStatus::Open.is_terminal());
        assert!(OrderStatus::Closed.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_synthetic_canceled_shape() {
        let order = Order::synthetic_canceled(Some("oid-7".into()), "cid-7", "BTC/USDT");
        assert_eq!(order.status, Some(OrderStatus::Canceled));
        assert_eq!(order.price, None);
        assert_eq!(order.amount, None);
        assert_eq!(order.filled, None);

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["status"], "canceled");
        assert!(json["price"].is_null());
    }

    #[test]
    fn test_create_params_wire_names() {
        let json = r#"{
            "client_order_id": "c1",
            "symbol": "BTC/USDT",
            "type": "limit",
            "side": "sell",
            "amount": 0.0001,
            "price": 100000.0
        }"#;
        let params: CreateOrderParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.order_type, OrderType::Limit);
        assert_eq!(params.side, OrderSide::Sell);
    }
}
