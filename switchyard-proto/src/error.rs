//! Errors shared across transports and handlers.

use thiserror::Error;

use crate::codes;
use crate::request::ApiError;

/// Boxed error used at trait boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Transport channel errors.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel was closed explicitly.
    #[error("channel closed")]
    Closed,

    /// The channel gave up reconnecting and closed itself.
    #[error("channel closed after {attempts} consecutive connect failures")]
    ReconnectExhausted {
        /// Consecutive connect failures observed before giving up.
        attempts: u32,
    },

    /// Establishing the underlying connection failed.
    #[error("connect failed: {0}")]
    Connect(String),

    /// The underlying transport failed while sending or receiving.
    #[error("transport error: {0}")]
    Transport(String),

    /// An envelope could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl ChannelError {
    /// Whether the channel is permanently unusable.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::ReconnectExhausted { .. })
    }
}

/// Errors returned by operation handlers and inbound envelope handlers.
///
/// A handler that already knows the right [`ApiError`] code returns
/// [`HandlerError::Api`]; anything else is reported as `execution_error`.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A failure with a structured code that should reach the caller as-is.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Any other failure.
    #[error("{0}")]
    Failed(#[from] BoxError),
}

impl HandlerError {
    /// An unstructured failure with the given message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into().into())
    }

    /// Convert into the structured error a caller sees.
    pub fn into_api_error(self) -> ApiError {
        match self {
            Self::Api(err) => err,
            Self::Failed(err) => ApiError::new(codes::EXECUTION_ERROR, err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_errors_keep_their_code() {
        let err = HandlerError::from(ApiError::new("http_429", "slow down"));
        assert_eq!(err.into_api_error().code, "http_429");
    }

    #[test]
    fn unstructured_errors_become_execution_error() {
        let err = HandlerError::failed("disk on fire");
        let api = err.into_api_error();
        assert_eq!(api.code, codes::EXECUTION_ERROR);
        assert_eq!(api.message, "disk on fire");
    }

    #[test]
    fn terminal_channel_errors() {
        assert!(ChannelError::Closed.is_terminal());
        assert!(ChannelError::ReconnectExhausted { attempts: 3 }.is_terminal());
        assert!(!ChannelError::Connect("refused".into()).is_terminal());
        assert_eq!(
            ChannelError::ReconnectExhausted { attempts: 3 }.to_string(),
            "channel closed after 3 consecutive connect failures"
        );
    }
}
