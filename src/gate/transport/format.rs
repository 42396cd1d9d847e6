//! Outbound event serialization.
//!
//! Every outbound event is merged with a base template carrying the
//! gateway's identity (`exchange`, `node`, `instance`, `algo`) and stamped
//! with the wall-clock time in microseconds at serialization, so the core
//! can order records across destinations.
//!
use chrono::Utc;

use crate::gate::config::GateConfig;
use crate::gate::transport::events::{Event, EventNode, EventType};

/// Fills the template fields of outbound events and serializes them.
///
#[derive(Clone, Debug)]
pub struct EventFormatter {
    exchange: String,
    node: EventNode,
    instance: String,
    algo: String,
}

impl EventFormatter {
    pub fn new(
        exchange: impl Into<String>,
        node: EventNode,
        instance: impl Into<String>,
        algo: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            node,
            instance: instance.into(),
            algo: algo.into(),
        }
    }

    /// Builds a formatter from the gateway's configuration identity.
    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            config.exchange_id(),
            EventNode::Gate,
            config.gate_section().info.instance.clone(),
            config.algo.clone(),
        )
    }

    /// Merges `event` with the base template and serializes it.
    ///
    /// Fields the emitting site set are kept; everything else comes from
    /// the template. `event` defaults to `data`, `timestamp_us` to the
    /// current wall clock.
    pub fn format(&self, event: &Event) -> serde_json::Result<String> {
        let mut filled = event.clone();
        filled.event = filled.event.or(Some(EventType::Data));
        filled.exchange = filled.exchange.or_else(|| Some(self.exchange.clone()));
        filled.node = filled.node.or(Some(self.node));
        filled.instance = filled.instance.or_else(|| Some(self.instance.clone()));
        filled.algo = filled.algo.or_else(|| Some(self.algo.clone()));
        filled.timestamp_us = filled.timestamp_us.or_else(|| Some(timestamp_in_us()));
        serde_json::to_string(&filled)
    }
}

/// Wall-clock time in microseconds since the epoch.
pub fn timestamp_in_us() -> i64 {
    Utc::now().timestamp_micros()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::gate::transport::events::EventAction;
    use serde_json::json;

    fn formatter() -> EventFormatter {
        EventFormatter::new("hyperix", EventNode::Gate, "test-1", "spread-1")
    }

    #[test]
    fn test_template_fields_filled() {
        let event = Event::data(EventAction::BalanceUpdate, json!({"assets": {}}))
            .with_event_id("evt-1");
        let json: serde_json::Value =
            serde_json::from_str(&formatter().format(&event).unwrap()).unwrap();

        assert_eq!(json["event_id"], "evt-1");
        assert_eq!(json["event"], "data");
        assert_eq!(json["exchange"], "hyperix");
        assert_eq!(json["node"], "gate");
        assert_eq!(json["instance"], "test-1");
        assert_eq!(json["algo"], "spread-1");
        assert_eq!(json["action"], "balance_update");
        assert!(json["message"].is_null());
        assert!(json["timestamp_us"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_emitting_site_fields_win() {
        let event = Event::error(EventAction::CreateOrders, "Timeout error", json!([]));
        let json: serde_json::Value =
            serde_json::from_str(&formatter().format(&event).unwrap()).unwrap();
        assert_eq!(json["event"], "error");
        assert_eq!(json["message"], "Timeout error");
        // No event id was assigned: the key is present and null.
        assert!(json["event_id"].is_null());
    }
}
