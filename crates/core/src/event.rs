use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;

/// Unique event identifier.
pub type EventId = Uuid;

/// Something that exposes named top-level attributes to the rule engine.
///
/// Attributes are returned as JSON values so that scalar columns and
/// document-valued columns share one representation.
pub trait Record {
    /// Look up a top-level attribute by name. `None` means "not present".
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>>;
}

/// A single ingested event, as stored in the event table and as seen by
/// alert policies.
///
/// `payload` and `metadata` are semi-structured documents; every other
/// attribute is a plain scalar column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(default = "Uuid::new_v4")]
    pub id: EventId,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub metadata: Value,
}

impl Event {
    /// Scalar columns, addressable by their bare name.
    pub const SCALAR_ATTRIBUTES: &'static [&'static str] = &[
        "id",
        "tenant_id",
        "timestamp",
        "event_type",
        "source",
        "severity",
        "title",
        "description",
        "status",
    ];

    /// Document-valued columns, addressable as `payload.a.b`.
    pub const DOCUMENT_ATTRIBUTES: &'static [&'static str] = &["payload", "metadata"];

    /// Create a minimal event of the given type with empty documents.
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: None,
            timestamp: Utc::now(),
            event_type: event_type.into(),
            source: None,
            severity: None,
            title: None,
            description: None,
            status: None,
            payload: Value::Object(Default::default()),
            metadata: Value::Object(Default::default()),
        }
    }

    /// Parse one JSON object (e.g. a line of a JSONL feed) into an event.
    pub fn from_json_str(line: &str) -> Result<Self, CoreError> {
        let event: Event = serde_json::from_str(line)?;
        if event.event_type.trim().is_empty() {
            return Err(CoreError::InvalidEvent("event_type must not be empty".into()));
        }
        Ok(event)
    }

    /// Render the event as a JSON object, used as template context.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn opt_string(value: &Option<String>) -> Option<Cow<'_, Value>> {
    value.as_ref().map(|s| Cow::Owned(Value::String(s.clone())))
}

impl Record for Event {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        match name {
            "id" => Some(Cow::Owned(Value::String(self.id.to_string()))),
            "tenant_id" => opt_string(&self.tenant_id),
            "timestamp" => Some(Cow::Owned(Value::String(self.timestamp.to_rfc3339()))),
            "event_type" => Some(Cow::Owned(Value::String(self.event_type.clone()))),
            "source" => opt_string(&self.source),
            "severity" => opt_string(&self.severity),
            "title" => opt_string(&self.title),
            "description" => opt_string(&self.description),
            "status" => opt_string(&self.status),
            "payload" => Some(Cow::Borrowed(&self.payload)),
            "metadata" => Some(Cow::Borrowed(&self.metadata)),
            _ => None,
        }
    }
}

impl Record for serde_json::Map<String, Value> {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        self.get(name).map(Cow::Borrowed)
    }
}

impl Record for Value {
    fn attribute(&self, name: &str) -> Option<Cow<'_, Value>> {
        self.as_object().and_then(|m| m.get(name)).map(Cow::Borrowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_exposes_scalar_and_document_attributes() {
        let mut event = Event::new("login");
        event.status = Some("Success".into());
        event.payload = json!({"user": {"name": "alice"}});

        assert_eq!(event.attribute("event_type").unwrap().as_ref(), &json!("login"));
        assert_eq!(event.attribute("status").unwrap().as_ref(), &json!("Success"));
        assert_eq!(
            event.attribute("payload").unwrap().as_ref(),
            &json!({"user": {"name": "alice"}})
        );
        assert!(event.attribute("severity").is_none());
        assert!(event.attribute("nope").is_none());
    }

    #[test]
    fn parse_event_from_json_line() {
        let event = Event::from_json_str(
            r#"{"event_type":"deploy","tenant_id":"acme","payload":{"env":"prod"}}"#,
        )
        .unwrap();
        assert_eq!(event.event_type, "deploy");
        assert_eq!(event.tenant_id.as_deref(), Some("acme"));
        assert_eq!(event.payload["env"], "prod");
    }

    #[test]
    fn reject_event_without_type() {
        assert!(Event::from_json_str(r#"{"event_type":"  "}"#).is_err());
        assert!(Event::from_json_str(r#"{"status":"x"}"#).is_err());
    }

    #[test]
    fn json_value_is_a_record() {
        let record = json!({"status": "ok"});
        assert_eq!(record.attribute("status").unwrap().as_ref(), &json!("ok"));
        assert!(json!([1, 2]).attribute("status").is_none());
    }
}
