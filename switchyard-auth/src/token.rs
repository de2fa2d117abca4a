use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use switchyard_proto::now_millis;
use zeroize::Zeroizing;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub(crate) const DEFAULT_EXPIRES_IN_SECS: u64 = 86_400;

/// An access token, optional refresh token and absolute expiry.
///
/// Token strings are zeroed on drop and never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    access: Zeroizing<String>,
    refresh: Option<Zeroizing<String>>,
    expires_at: u64,
}

impl Token {
    /// Create a token expiring at `expires_at` (milliseconds since the epoch).
    pub fn new(access: impl Into<String>, refresh: Option<String>, expires_at: u64) -> Self {
        Self {
            access: Zeroizing::new(access.into()),
            refresh: refresh.map(Zeroizing::new),
            expires_at,
        }
    }

    /// Create a token that expires `lifetime` from now.
    pub fn expiring_in(access: impl Into<String>, refresh: Option<String>, lifetime: Duration) -> Self {
        let lifetime_ms = u64::try_from(lifetime.as_millis()).unwrap_or(u64::MAX);
        Self::new(access, refresh, now_millis().saturating_add(lifetime_ms))
    }

    /// The access token.
    pub fn access(&self) -> &str {
        &self.access
    }

    /// The refresh token, if the server issued one.
    pub fn refresh(&self) -> Option<&str> {
        self.refresh.as_deref().map(String::as_str)
    }

    /// Expiry in milliseconds since the Unix epoch.
    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// Whether the token has expired.
    pub fn is_expired(&self) -> bool {
        now_millis() >= self.expires_at
    }

    /// Whether the token expires within `margin` of now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        let margin_ms = u64::try_from(margin.as_millis()).unwrap_or(u64::MAX);
        now_millis().saturating_add(margin_ms) >= self.expires_at
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access", &"[REDACTED]")
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful token endpoint reply.
#[derive(Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Convert into a [`Token`], falling back to `previous_refresh` when the
    /// server did not rotate the refresh token.
    pub(crate) fn into_token(self, previous_refresh: Option<&str>) -> Token {
        let lifetime = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS).max(1);
        let refresh = self
            .refresh_token
            .or_else(|| previous_refresh.map(str::to_owned));
        Token::expiring_in(self.access_token, refresh, Duration::from_secs(lifetime))
    }
}
