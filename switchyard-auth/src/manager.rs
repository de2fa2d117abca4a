//! The credential lifecycle: authorize, exchange, refresh, logout.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Url;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use switchyard_proto::{ApiError, TokenSource};
use switchyard_store::SecureStore;
use zeroize::Zeroizing;

use crate::callback::CallbackListener;
use crate::config::OAuthConfig;
use crate::error::AuthError;
use crate::pkce;
use crate::token::{Token, TokenResponse};

/// Prefix of every key the manager writes.
pub const STORE_PREFIX: &str = "switchyard.auth.";

const KEY_ACCESS: &str = "switchyard.auth.access_token";
const KEY_REFRESH: &str = "switchyard.auth.refresh_token";
const KEY_EXPIRES_AT: &str = "switchyard.auth.expires_at";
const KEY_VERIFIER: &str = "switchyard.auth.code_verifier";
const KEY_STATE: &str = "switchyard.auth.state";

const ALL_KEYS: [&str; 5] = [KEY_ACCESS, KEY_REFRESH, KEY_EXPIRES_AT, KEY_VERIFIER, KEY_STATE];

/// The most recent refresh attempt, when it failed.
struct FailedRefresh {
    error: AuthError,
}

/// Tokens this close to expiry are refreshed before use.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// Obtains, persists and refreshes OAuth tokens for one client.
///
/// ```text
/// unauthenticated --authorize--> authorizing --exchange--> authenticated
///        ^                                                    |   ^
///        |                                          near expiry   | refreshed
///        +------------------- logout ----------------------- refreshing
/// ```
///
/// Everything is persisted through the [`SecureStore`] under keys prefixed
/// with [`STORE_PREFIX`], so a token obtained in one run is reused by the
/// next.
///
/// Refreshes are single-flight. Each stored token has an epoch that changes
/// whenever the stored token does; a caller that finds its token near expiry
/// waits for the refresh gate, and if the epoch moved while it waited it
/// re-reads the store instead of refreshing again. A failed refresh is
/// shared the same way: callers that were already waiting when it failed get
/// its error instead of posting the refresh grant again.
pub struct CredentialManager {
    config: OAuthConfig,
    store: Arc<dyn SecureStore>,
    http: reqwest::Client,
    verifier: Mutex<Option<Zeroizing<String>>>,
    refresh_gate: tokio::sync::Mutex<Option<FailedRefresh>>,
    epoch: AtomicU64,
    refreshes: AtomicU64,
    refresh_margin: Duration,
}

impl CredentialManager {
    /// Create a manager persisting into `store`.
    pub fn new(config: OAuthConfig, store: Arc<dyn SecureStore>) -> Self {
        Self {
            config,
            store,
            http: reqwest::Client::new(),
            verifier: Mutex::new(None),
            refresh_gate: tokio::sync::Mutex::new(None),
            epoch: AtomicU64::new(0),
            refreshes: AtomicU64::new(0),
            refresh_margin: REFRESH_MARGIN,
        }
    }

    /// Override how close to expiry a token is refreshed.
    #[must_use]
    pub fn refresh_margin(mut self, margin: Duration) -> Self {
        self.refresh_margin = margin;
        self
    }

    /// The client configuration.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// Start an authorization: persist a new PKCE verifier and state and
    /// return the URL to send the user to.
    pub async fn authorize(&self) -> Result<Url, AuthError> {
        let verifier = pkce::generate_verifier();
        let challenge = pkce::challenge(&verifier);
        let state = pkce::generate_state();

        self.store.set_item(KEY_VERIFIER, &verifier).await?;
        self.store.set_item(KEY_STATE, &state).await?;
        *self.verifier.lock() = Some(Zeroizing::new(verifier));

        let scope = self.config.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.config.auth_url,
            [
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| AuthError::InvalidConfig(format!("auth_url: {e}")))?;

        tracing::debug!(auth_url = %self.config.auth_url, "authorization started");
        Ok(url)
    }

    /// Interactive login over a loopback redirect: bind the redirect URI,
    /// pass the authorization URL to `open` (typically to launch a browser),
    /// wait up to `timeout` for the redirect and exchange the code.
    pub async fn login(&self, open: impl FnOnce(&Url), timeout: Duration) -> Result<Token, AuthError> {
        let listener = CallbackListener::bind(&self.config.redirect_uri).await?;
        let url = self.authorize().await?;
        open(&url);
        let params = listener.wait(timeout).await?;
        let state = params.state.ok_or(AuthError::StateMismatch)?;
        self.complete_authorization(&params.code, &state).await
    }

    /// Check the callback `state` against the one issued by
    /// [`authorize`](Self::authorize), then exchange `code`.
    pub async fn complete_authorization(&self, code: &str, state: &str) -> Result<Token, AuthError> {
        let expected = self
            .store
            .get_item(KEY_STATE)
            .await?
            .ok_or_else(|| AuthError::FlowInterrupted("no pending authorization state".into()))?;
        if expected != state {
            tracing::warn!("authorization callback state mismatch");
            return Err(AuthError::StateMismatch);
        }
        self.exchange_code_for_token(code).await
    }

    /// Exchange an authorization code for a token using the pending verifier.
    ///
    /// The verifier is single-use and is discarded on success.
    pub async fn exchange_code_for_token(&self, code: &str) -> Result<Token, AuthError> {
        let verifier = self.pending_verifier().await?;

        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self
            .post_token_form(&form)
            .await
            .map_err(AuthError::ExchangeFailed)?;
        let token = response.into_token(None);

        let _gate = self.refresh_gate.lock().await;
        self.persist(&token).await?;
        self.store.remove_item(KEY_VERIFIER).await?;
        self.store.remove_item(KEY_STATE).await?;
        *self.verifier.lock() = None;

        tracing::info!(expires_at = token.expires_at(), "authorization code exchanged");
        Ok(token)
    }

    /// A valid access token, refreshing first when it is within the refresh
    /// margin of expiry.
    pub async fn get_access_token(&self) -> Result<String, AuthError> {
        let seen = self.epoch.load(Ordering::SeqCst);
        let seen_refreshes = self.refreshes.load(Ordering::SeqCst);
        let token = self.load().await?.ok_or(AuthError::NoAccessToken)?;
        if !token.expires_within(self.refresh_margin) {
            return Ok(token.access().to_owned());
        }

        let mut gate = self.refresh_gate.lock().await;
        if self.epoch.load(Ordering::SeqCst) != seen {
            let current = self.load().await?.ok_or(AuthError::NoAccessToken)?;
            if !current.expires_within(self.refresh_margin) {
                tracing::debug!("token refreshed by a concurrent caller");
                return Ok(current.access().to_owned());
            }
        } else if self.refreshes.load(Ordering::SeqCst) != seen_refreshes {
            if let Some(failed) = gate.as_ref() {
                tracing::debug!("concurrent refresh failed, sharing its error");
                return Err(failed.error.replay());
            }
        }
        let refreshed = self.refresh_gated(&mut gate).await?;
        Ok(refreshed.access().to_owned())
    }

    /// Refresh now, regardless of expiry.
    pub async fn refresh_token(&self) -> Result<Token, AuthError> {
        let mut gate = self.refresh_gate.lock().await;
        self.refresh_gated(&mut gate).await
    }

    /// Run one refresh and record its outcome for callers queued on the gate.
    async fn refresh_gated(&self, last: &mut Option<FailedRefresh>) -> Result<Token, AuthError> {
        let outcome = self.refresh_locked().await;
        *last = match &outcome {
            Ok(_) => None,
            Err(err) => Some(FailedRefresh { error: err.replay() }),
        };
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        outcome
    }

    /// Forget every credential and any pending authorization. Idempotent.
    ///
    /// Every key is removed even if an earlier removal fails; the first
    /// failure is returned.
    pub async fn logout(&self) -> Result<(), AuthError> {
        let _gate = self.refresh_gate.lock().await;
        *self.verifier.lock() = None;
        let mut first_err = None;
        for key in ALL_KEYS {
            if let Err(err) = self.store.remove_item(key).await {
                tracing::warn!(key, error = %err, "failed to remove credential");
                first_err.get_or_insert(err);
            }
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        tracing::info!("logged out");
        match first_err {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Whether an unexpired access token is stored.
    pub async fn is_authenticated(&self) -> Result<bool, AuthError> {
        Ok(self.load().await?.is_some_and(|t| !t.is_expired()))
    }

    /// The stored token, if any.
    pub async fn current_token(&self) -> Result<Option<Token>, AuthError> {
        self.load().await
    }

    /// Store a token obtained elsewhere.
    pub async fn save_token(&self, token: &Token) -> Result<(), AuthError> {
        let _gate = self.refresh_gate.lock().await;
        self.persist(token).await
    }

    async fn pending_verifier(&self) -> Result<Zeroizing<String>, AuthError> {
        let cached = self.verifier.lock().clone();
        if let Some(verifier) = cached {
            return Ok(verifier);
        }
        self.store
            .get_item(KEY_VERIFIER)
            .await?
            .map(Zeroizing::new)
            .ok_or_else(|| AuthError::FlowInterrupted("no pending code verifier".into()))
    }

    /// Caller holds the refresh gate.
    async fn refresh_locked(&self) -> Result<Token, AuthError> {
        let refresh = self
            .store
            .get_item(KEY_REFRESH)
            .await?
            .map(Zeroizing::new)
            .ok_or(AuthError::NoRefreshToken)?;

        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh.as_str()),
        ];
        if let Some(secret) = &self.config.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        tracing::debug!(token_url = %self.config.token_url, "refreshing access token");
        let response = self
            .post_token_form(&form)
            .await
            .map_err(AuthError::RefreshFailed)?;
        let token = response.into_token(Some(refresh.as_str()));
        self.persist(&token).await?;
        tracing::info!(expires_at = token.expires_at(), "access token refreshed");
        Ok(token)
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let response = self
            .http
            .post(&self.config.token_url)
            .timeout(self.config.request_timeout)
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "token endpoint rejected grant");
            return Err(format!("HTTP {status}: {body}"));
        }
        serde_json::from_str(&body).map_err(|e| format!("invalid token response: {e}"))
    }

    async fn load(&self) -> Result<Option<Token>, AuthError> {
        let Some(access) = self.store.get_item(KEY_ACCESS).await? else {
            return Ok(None);
        };
        let refresh = self.store.get_item(KEY_REFRESH).await?;
        // A missing or unreadable expiry is treated as already expired.
        let expires_at = self
            .store
            .get_item(KEY_EXPIRES_AT)
            .await?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Ok(Some(Token::new(access, refresh, expires_at)))
    }

    /// Caller holds the refresh gate.
    async fn persist(&self, token: &Token) -> Result<(), AuthError> {
        self.store.set_item(KEY_ACCESS, token.access()).await?;
        match token.refresh() {
            Some(refresh) => self.store.set_item(KEY_REFRESH, refresh).await?,
            None => self.store.remove_item(KEY_REFRESH).await?,
        }
        self.store
            .set_item(KEY_EXPIRES_AT, &token.expires_at().to_string())
            .await?;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TokenSource for CredentialManager {
    async fn access_token(&self) -> Result<String, ApiError> {
        self.get_access_token().await.map_err(ApiError::from)
    }
}
