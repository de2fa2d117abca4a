//! Stable error codes carried in [`ApiError::code`](crate::ApiError::code).
//!
//! HTTP status failures use the dynamic form `http_<status>`; see [`http`].

/// The request did not name a target.
pub const MISSING_APP_TYPE: &str = "missing_app_type";
/// The request did not name an operation.
pub const MISSING_OPERATION: &str = "missing_operation";
/// No handler is registered for the (target, operation) pair.
pub const OPERATION_NOT_SUPPORTED: &str = "operation_not_supported";
/// A handler failed without a structured code of its own.
pub const EXECUTION_ERROR: &str = "execution_error";

/// Connection-level failure (DNS, refused, reset).
pub const NETWORK_ERROR: &str = "network_error";
/// The call exceeded its configured time limit.
pub const REQUEST_TIMEOUT: &str = "request_timeout";
/// The server answered with a body that could not be decoded.
pub const INVALID_RESPONSE: &str = "invalid_response";
/// A bearer token could not be obtained for an outbound call.
pub const TOKEN_UNAVAILABLE: &str = "token_unavailable";
/// Configuration was missing or malformed.
pub const INVALID_CONFIG: &str = "invalid_config";

/// No access token is stored; the user must authorize again.
pub const NO_ACCESS_TOKEN: &str = "no_access_token";
/// A refresh was needed but no refresh token is stored.
pub const NO_REFRESH_TOKEN: &str = "no_refresh_token";
/// A code exchange was attempted without a pending PKCE verifier.
pub const AUTH_FLOW_INTERRUPTED: &str = "auth_flow_interrupted";
/// The anti-forgery `state` returned by the provider did not match.
pub const AUTH_STATE_MISMATCH: &str = "auth_state_mismatch";
/// The token endpoint rejected the authorization code grant.
pub const TOKEN_EXCHANGE_FAILED: &str = "token_exchange_failed";
/// The token endpoint rejected the refresh grant.
pub const TOKEN_REFRESH_FAILED: &str = "token_refresh_failed";
/// The secure store backing the credential manager failed.
pub const STORE_UNAVAILABLE: &str = "store_unavailable";

/// Code for a non-2xx HTTP status, e.g. `http_503`.
pub fn http(status: u16) -> String {
    format!("http_{status}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_code_format() {
        assert_eq!(http(503), "http_503");
        assert_eq!(http(404), "http_404");
    }
}
