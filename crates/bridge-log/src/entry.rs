use serde::{Deserialize, Serialize};

/// A single event record describing something that happened in the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: EventType,
    pub source: EventSource,
    pub details: serde_json::Value,
}

impl EventRecord {
    /// Create a new `EventRecord` with an auto-generated UUID v4 and the
    /// current UTC timestamp. The caller supplies the event type, source, and
    /// free-form details JSON value.
    pub fn new(event_type: EventType, source: EventSource, details: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event_type,
            source,
            details,
        }
    }
}

/// The category of event being recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ProcessStarted,
    ProcessStopped,
    ListenerStarted,
    ConnectionOpened,
    ConnectionReplaced,
    ConnectionClosed,
    SendFailed,
}

/// Identifies the component and optional contextual metadata for the event
/// source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSource {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

impl EventSource {
    /// Convenience constructor that only requires the component name. All
    /// optional fields default to `None`.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            role: None,
            remote_addr: None,
            connection_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_source_fields_are_omitted_from_json() {
        let record = EventRecord::new(
            EventType::ProcessStarted,
            EventSource::new("stream-bridge"),
            serde_json::json!({}),
        );

        let json = serde_json::to_value(&record).expect("serialize");
        let source = &json["source"];
        assert_eq!(source["component"], "stream-bridge");
        assert!(source.get("role").is_none());
        assert!(source.get("remote_addr").is_none());
        assert!(source.get("connection_id").is_none());
    }

    #[test]
    fn event_type_uses_snake_case() {
        let json = serde_json::to_string(&EventType::ConnectionReplaced).expect("serialize");
        assert_eq!(json, "\"connection_replaced\"");
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut source = EventSource::new("listener");
        source.role = Some("device".to_string());

        let record = EventRecord::new(
            EventType::ConnectionOpened,
            source,
            serde_json::json!({"remote_addr": "127.0.0.1:51234"}),
        );

        let json = serde_json::to_string(&record).expect("serialize");
        let parsed: EventRecord = serde_json::from_str(&json).expect("parse");
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.event_type, EventType::ConnectionOpened);
        assert_eq!(parsed.source.role.as_deref(), Some("device"));
    }
}
