//! Requests, responses and structured errors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::envelope::now_millis;

/// Default `metadata.source` for requests built in-process.
const DEFAULT_SOURCE: &str = "switchyard";

/// One invocation of an operation on a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// The target domain, e.g. `"lightroom"`. Also accepted as `appType`.
    #[serde(default, alias = "appType")]
    pub target: String,
    /// The operation name within the target.
    #[serde(default)]
    pub operation: String,
    /// Operation-specific parameters.
    #[serde(default)]
    pub parameters: Value,
    /// Per-request context. Overrides the router's shared context key-by-key.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Provenance of the request.
    #[serde(default)]
    pub metadata: RequestMetadata,
}

/// Provenance of a [`Request`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Who produced the request.
    #[serde(default)]
    pub source: String,
    /// Creation time in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
    /// Request identifier, echoed in the response metadata.
    #[serde(default)]
    pub id: String,
}

impl Request {
    /// Create a request with a fresh id and no parameters or context.
    pub fn new(target: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            operation: operation.into(),
            parameters: Value::Null,
            context: Map::new(),
            metadata: RequestMetadata {
                source: DEFAULT_SOURCE.into(),
                timestamp: now_millis(),
                id: uuid::Uuid::new_v4().to_string(),
            },
        }
    }

    /// Set the parameters.
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Add one context entry.
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Set the metadata source.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.source = source.into();
        self
    }
}

/// A structured failure with a stable code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    /// Stable machine-readable code (see [`crate::codes`]).
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Optional extra data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiError {
    /// Create an error with the given code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Attach details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// The outcome of executing a [`Request`].
///
/// Exactly one of `result` and `error` is set, matching `success`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the operation succeeded.
    pub success: bool,
    /// The operation's result when `success` is true. A `null` result stays
    /// `Some(Value::Null)`; only an absent key decodes as `None`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    /// The failure when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
    /// Timing and identity.
    pub metadata: ResponseMetadata,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Timing and identity of a [`Response`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Wall-clock time spent executing, in milliseconds.
    pub execution_time_ms: u64,
    /// The id of the request this answers.
    pub id: String,
}

impl Response {
    /// A successful response.
    pub fn success(result: Value, metadata: ResponseMetadata) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            metadata,
        }
    }

    /// A failed response.
    pub fn failure(error: ApiError, metadata: ResponseMetadata) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error),
            metadata,
        }
    }

    /// The error code, if this is a failure.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}
