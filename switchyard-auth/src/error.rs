use switchyard_proto::{ApiError, codes};
use switchyard_store::StoreError;
use thiserror::Error;

/// Credential lifecycle failures.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum AuthError {
    /// No access token is stored.
    #[error("no access token; authorization required")]
    NoAccessToken,

    /// A refresh is needed but no refresh token is stored.
    #[error("no refresh token; authorization required")]
    NoRefreshToken,

    /// A code arrived without a pending verifier or state, e.g. after a
    /// restart between `authorize` and the callback.
    #[error("authorization flow interrupted: {0}")]
    FlowInterrupted(String),

    /// The callback `state` does not match the one issued by `authorize`.
    #[error("authorization state mismatch")]
    StateMismatch,

    /// The token endpoint rejected the authorization code.
    #[error("token exchange failed: {0}")]
    ExchangeFailed(String),

    /// The token endpoint rejected the refresh token.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// Configuration is missing or malformed.
    #[error("invalid auth configuration: {0}")]
    InvalidConfig(String),

    /// The secure store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// The stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoAccessToken => codes::NO_ACCESS_TOKEN,
            Self::NoRefreshToken => codes::NO_REFRESH_TOKEN,
            Self::FlowInterrupted(_) => codes::AUTH_FLOW_INTERRUPTED,
            Self::StateMismatch => codes::AUTH_STATE_MISMATCH,
            Self::ExchangeFailed(_) => codes::TOKEN_EXCHANGE_FAILED,
            Self::RefreshFailed(_) => codes::TOKEN_REFRESH_FAILED,
            Self::InvalidConfig(_) => codes::INVALID_CONFIG,
            Self::Store(_) => codes::STORE_UNAVAILABLE,
        }
    }

    /// An equivalent error with the same code and message.
    pub(crate) fn replay(&self) -> Self {
        match self {
            Self::NoAccessToken => Self::NoAccessToken,
            Self::NoRefreshToken => Self::NoRefreshToken,
            Self::FlowInterrupted(m) => Self::FlowInterrupted(m.clone()),
            Self::StateMismatch => Self::StateMismatch,
            Self::ExchangeFailed(m) => Self::ExchangeFailed(m.clone()),
            Self::RefreshFailed(m) => Self::RefreshFailed(m.clone()),
            Self::InvalidConfig(m) => Self::InvalidConfig(m.clone()),
            Self::Store(err) => Self::Store(StoreError::Unavailable(err.to_string())),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::new(err.code(), err.to_string())
    }
}
