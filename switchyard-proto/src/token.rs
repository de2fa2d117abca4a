//! Bearer token supply for outbound calls.

use async_trait::async_trait;

use crate::request::ApiError;

/// Supplies a current access token.
///
/// Implemented by the credential manager; consumed by the resilient client,
/// which attaches the token as a bearer credential. Implementations refresh
/// near-expiry tokens themselves.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A valid access token, or the structured reason none is available.
    async fn access_token(&self) -> Result<String, ApiError>;
}

/// A fixed token, for tests and pre-provisioned credentials.
#[async_trait]
impl TokenSource for String {
    async fn access_token(&self) -> Result<String, ApiError> {
        Ok(self.clone())
    }
}
