//! Typed outcomes of a failed call.

use std::time::Duration;
use switchyard_proto::{ApiError, HandlerError, codes};
use thiserror::Error;

/// Why a call through [`ResilientClient`](crate::ResilientClient) failed.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Response status code.
        status: u16,
        /// Response body, as text.
        body: String,
    },

    /// One attempt exceeded the configured limit and was aborted.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// A 2xx body that is not JSON.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    /// The attached token source could not supply a token.
    #[error("no bearer token available: {0}")]
    TokenUnavailable(ApiError),

    /// The client or call was misconfigured.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Every attempt failed with a retryable outcome.
    #[error("request failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made, including the first.
        attempts: u32,
        /// The outcome of the final attempt.
        last: Box<ClientError>,
    },
}

impl ClientError {
    /// The stable error code; for [`Exhausted`](Self::Exhausted), the code
    /// of the last attempt.
    pub fn code(&self) -> String {
        match self {
            Self::Http { status, .. } => codes::http(*status),
            Self::Timeout(_) => codes::REQUEST_TIMEOUT.into(),
            Self::Network(_) => codes::NETWORK_ERROR.into(),
            Self::InvalidResponse(_) => codes::INVALID_RESPONSE.into(),
            Self::TokenUnavailable(_) => codes::TOKEN_UNAVAILABLE.into(),
            Self::InvalidConfig(_) => codes::INVALID_CONFIG.into(),
            Self::Exhausted { last, .. } => last.code(),
        }
    }

    /// The HTTP status behind this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }

    /// The number of attempts made, when retries were exhausted.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        let mut api = ApiError::new(err.code(), err.to_string());
        if let Some(status) = err.status() {
            api = api.with_details(serde_json::json!({ "status": status }));
        }
        if let Some(attempts) = err.attempts() {
            let mut details = api.details.take().unwrap_or_else(|| serde_json::json!({}));
            details["attempts"] = attempts.into();
            api = api.with_details(details);
        }
        api
    }
}

impl From<ClientError> for HandlerError {
    fn from(err: ClientError) -> Self {
        HandlerError::Api(err.into())
    }
}
