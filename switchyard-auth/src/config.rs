use std::time::Duration;

use crate::error::AuthError;

/// Redirect URI used when none is configured.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/callback";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OAuth client registration and endpoints.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Registered client id.
    pub client_id: String,
    /// Client secret, for confidential clients.
    pub client_secret: Option<String>,
    /// Where the provider redirects after consent.
    pub redirect_uri: String,
    /// Authorization endpoint.
    pub auth_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Requested scopes, joined with spaces in the authorization URL.
    pub scopes: Vec<String>,
    /// Time limit for token endpoint calls.
    pub request_timeout: Duration,
}

impl OAuthConfig {
    /// A public client with the default redirect URI and no scopes.
    pub fn new(
        client_id: impl Into<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: DEFAULT_REDIRECT_URI.into(),
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            scopes: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read the configuration from `SWITCHYARD_*` environment variables.
    ///
    /// `SWITCHYARD_CLIENT_ID`, `SWITCHYARD_AUTH_URL` and
    /// `SWITCHYARD_TOKEN_URL` are required. `SWITCHYARD_SCOPES` may be
    /// separated by spaces or commas; `SWITCHYARD_REQUEST_TIMEOUT` is in
    /// seconds.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AuthError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let require = |key: &str| {
            get(key).ok_or_else(|| AuthError::InvalidConfig(format!("{key} is not set")))
        };

        let mut config = Self::new(
            require("SWITCHYARD_CLIENT_ID")?,
            require("SWITCHYARD_AUTH_URL")?,
            require("SWITCHYARD_TOKEN_URL")?,
        );
        config.client_secret = get("SWITCHYARD_CLIENT_SECRET");
        if let Some(uri) = get("SWITCHYARD_REDIRECT_URI") {
            config.redirect_uri = uri;
        }
        if let Some(scopes) = get("SWITCHYARD_SCOPES") {
            config.scopes = scopes
                .split([' ', ','])
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect();
        }
        if let Some(raw) = get("SWITCHYARD_REQUEST_TIMEOUT") {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                AuthError::InvalidConfig(format!("SWITCHYARD_REQUEST_TIMEOUT is not a number: {raw:?}"))
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Set the client secret.
    #[must_use]
    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Override the redirect URI.
    #[must_use]
    pub fn redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    /// Add a scope.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.push(scope.into());
        self
    }

    /// Override the token endpoint time limit.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "[REDACTED]"))
            .field("redirect_uri", &self.redirect_uri)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
