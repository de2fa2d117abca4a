//! The transport-level wrapper around every message.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::request::{Request, Response};

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// A fresh correlation id for an outgoing request.
pub fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The payload type an envelope carries.
///
/// Unknown type strings survive decoding as [`EnvelopeKind::Other`] so a
/// receiver can log and drop them instead of failing the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EnvelopeKind {
    /// A [`Request`] to execute.
    Request,
    /// A [`Response`] to an earlier request.
    Response,
    /// Key-values to merge into the receiver's shared context.
    ContextUpdate,
    /// Any type this runtime does not recognize.
    Other(String),
}

impl EnvelopeKind {
    /// The wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::ContextUpdate => "context_update",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for EnvelopeKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "request" => Self::Request,
            "response" => Self::Response,
            "context_update" => Self::ContextUpdate,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for EnvelopeKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<EnvelopeKind> for String {
    fn from(kind: EnvelopeKind) -> Self {
        match kind {
            EnvelopeKind::Other(s) => s,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed payload with an optional correlation id and a creation timestamp.
///
/// Envelopes are created at send time and discarded once delivered. The
/// correlation id pairs a response with the request that caused it; on the
/// wire it is the `requestId` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// What `data` contains.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// The payload: a request, a response or a context map.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Pairs a response with its request.
    #[serde(
        rename = "requestId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

impl Envelope {
    /// Create an envelope stamped with the current time.
    pub fn new(kind: impl Into<EnvelopeKind>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            correlation_id: None,
            timestamp: now_millis(),
        }
    }

    /// Wrap a request under a fresh correlation id.
    pub fn request(request: &Request) -> Self {
        // Request only holds strings, numbers and JSON values.
        let data = serde_json::to_value(request).unwrap_or_default();
        Self::new(EnvelopeKind::Request, data).with_correlation_id(new_correlation_id())
    }

    /// Wrap a response, echoing the correlation id of the request it answers.
    pub fn response(response: &Response, correlation_id: Option<String>) -> Self {
        let data = serde_json::to_value(response).unwrap_or_default();
        Self {
            correlation_id,
            ..Self::new(EnvelopeKind::Response, data)
        }
    }

    /// A context update carrying the given key-values.
    pub fn context_update(values: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::new(EnvelopeKind::ContextUpdate, serde_json::Value::Object(values))
    }

    /// Set the correlation id.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Encode as a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from a JSON string.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_wire_names() {
        assert_eq!(EnvelopeKind::Request.as_str(), "request");
        assert_eq!(EnvelopeKind::Response.as_str(), "response");
        assert_eq!(EnvelopeKind::ContextUpdate.as_str(), "context_update");
        assert_eq!(EnvelopeKind::from("ping"), EnvelopeKind::Other("ping".into()));
    }

    #[test]
    fn unknown_kind_survives_decoding() {
        let env = Envelope::from_json(r#"{"type":"heartbeat","data":{},"timestamp":1}"#).unwrap();
        assert_eq!(env.kind, EnvelopeKind::Other("heartbeat".into()));
        assert_eq!(env.to_json().unwrap(), r#"{"type":"heartbeat","data":{},"timestamp":1}"#);
    }

    #[test]
    fn correlation_id_uses_request_id_field() {
        let env = Envelope::new(EnvelopeKind::Request, json!({})).with_correlation_id("abc");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["requestId"], "abc");
        assert_eq!(value["type"], "request");
        assert!(value.get("correlation_id").is_none());
    }

    #[test]
    fn missing_correlation_id_is_omitted() {
        let env = Envelope::new("context_update", json!({"a": 1}));
        let value = serde_json::to_value(&env).unwrap();
        assert!(value.get("requestId").is_none());
    }

    #[test]
    fn request_envelopes_get_distinct_correlation_ids() {
        let req = Request::new("lightroom", "list_catalogs");
        let a = Envelope::request(&req);
        let b = Envelope::request(&req);
        assert!(a.correlation_id.is_some());
        assert_ne!(a.correlation_id, b.correlation_id);
        assert_eq!(a.data["operation"], "list_catalogs");
    }

    #[test]
    fn timestamp_is_stamped_at_creation() {
        let before = now_millis();
        let env = Envelope::new(EnvelopeKind::Response, json!(null));
        assert!(env.timestamp >= before);
    }
}
