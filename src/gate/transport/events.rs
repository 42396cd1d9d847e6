//! Wire event model.
//!
//! Every record exchanged with the trading core is an [`Event`]: a flat
//! JSON object with a fixed set of keys. The gateway fills the keys it
//! knows at the emitting site and leaves the rest to the
//! [`EventFormatter`](crate::gate::transport::EventFormatter) template.
//!
//! Commands with an action the gateway does not recognize deserialize with
//! [`EventAction::Unknown`] instead of failing, so a misconfigured core
//! cannot take the gateway down.
//!
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The class of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A command from the core to the gateway.
    Command,
    /// A data record from the gateway to the core.
    Data,
    /// A failure report.
    Error,
}

/// Which node produced the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventNode {
    Core,
    Gate,
}

/// The operation an event describes.
///
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    GetBalance,
    CreateOrders,
    CancelOrders,
    CancelAllOrders,
    GetOrders,
    OrderBookUpdate,
    BalanceUpdate,
    OrdersUpdate,
    Ping,
    Metrics,
    /// Any action string the gateway does not recognize.
    #[serde(other)]
    Unknown,
}

/// Logical output channel; the transport adaptor routes by this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    OrderBook,
    Balance,
    Core,
    Logs,
}

/// The record exchanged with the trading core.
///
/// All fields are optional on the way in (the core sends sparse commands)
/// and filled from the formatter template on the way out, so every
/// serialized event carries the full key set.
///
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Event {
    pub event_id: Option<String>,
    pub event: Option<EventType>,
    pub exchange: Option<String>,
    pub node: Option<EventNode>,
    pub instance: Option<String>,
    pub algo: Option<String>,
    pub action: Option<EventAction>,
    pub message: Option<String>,
    pub timestamp_us: Option<i64>,
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// A data event for `action`, with the event id to be set by the caller
    /// or left to the formatter.
    pub fn data(action: EventAction, data: Value) -> Self {
        Self {
            action: Some(action),
            data,
            ..Self::default()
        }
    }

    /// An error event for `action` carrying a human-readable message.
    pub fn error(action: EventAction, message: impl Into<String>, data: Value) -> Self {
        Self {
            event: Some(EventType::Error),
            action: Some(action),
            message: Some(message.into()),
            data,
            ..Self::default()
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_deserialization() {
        let json = r#"{
            "event_id": "7e0f1b9e-9e46-4f5f-9c61-6e2b25a2b1a0",
            "event": "command",
            "action": "create_orders",
            "data": [{"client_order_id": "c1", "symbol": "BTC/USDT",
                      "type": "limit", "side": "sell",
                      "amount": 0.0001, "price": 100000.0}]
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.event, Some(EventType::Command));
        assert_eq!(event.action, Some(EventAction::CreateOrders));
        assert!(event.data.is_array());
    }

    #[test]
    fn test_unknown_action_is_first_class() {
        let event: Event =
            serde_json::from_str(r#"{"action": "reticulate_splines"}"#).unwrap();
        assert_eq!(event.action, Some(EventAction::Unknown));
    }

    #[test]
    fn test_action_wire_names() {
        assert_eq!(
            serde_json::to_value(EventAction::OrderBookUpdate).unwrap(),
            json!("order_book_update")
        );
        assert_eq!(
            serde_json::to_value(EventAction::CancelAllOrders).unwrap(),
            json!("cancel_all_orders")
        );
    }
}
