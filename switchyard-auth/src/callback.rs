//! Loopback listener for the authorization redirect.
//!
//! Desktop and CLI logins point the provider's redirect at a local address;
//! [`CallbackListener`] serves that address until the redirect arrives and
//! hands back the `code` and `state` query parameters.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use parking_lot::Mutex;
use reqwest::Url;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use crate::error::AuthError;

/// How long [`wait_for_callback`] waits by default.
pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(5 * 60);

const SUCCESS_PAGE: &str = "<html><body><h1>Authentication successful</h1>\
<p>You can close this window now.</p></body></html>";
const FAILURE_PAGE: &str = "<html><body><h1>Authentication failed</h1>\
<p>No authorization code was received.</p></body></html>";

/// Query parameters delivered to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    /// The authorization code.
    pub code: String,
    /// The anti-forgery state echoed by the provider.
    pub state: Option<String>,
}

type Outcome = Result<CallbackParams, String>;
type Slot = Arc<Mutex<Option<oneshot::Sender<Outcome>>>>;

/// A bound loopback server waiting for one redirect.
///
/// The server shuts down gracefully once [`wait`](Self::wait) returns or the
/// listener is dropped.
pub struct CallbackListener {
    local_addr: SocketAddr,
    result: oneshot::Receiver<Outcome>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl CallbackListener {
    /// Bind the host and port of `redirect_uri` and serve its path.
    ///
    /// Port `0` binds an ephemeral port; see [`local_addr`](Self::local_addr).
    pub async fn bind(redirect_uri: &str) -> Result<Self, AuthError> {
        let url = Url::parse(redirect_uri)
            .map_err(|e| AuthError::InvalidConfig(format!("redirect_uri: {e}")))?;
        let host = url
            .host_str()
            .ok_or_else(|| AuthError::InvalidConfig("redirect_uri has no host".into()))?
            .to_owned();
        let port = url.port_or_known_default().unwrap_or(80);
        let path = match url.path() {
            "" => "/".to_owned(),
            p => p.to_owned(),
        };

        let listener = TcpListener::bind((host.as_str(), port))
            .await
            .map_err(|e| AuthError::InvalidConfig(format!("cannot listen on {host}:{port}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AuthError::InvalidConfig(e.to_string()))?;

        let (result_tx, result) = oneshot::channel();
        let slot: Slot = Arc::new(Mutex::new(Some(result_tx)));
        let app = Router::new().route(&path, get(on_redirect)).with_state(slot);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(err) = serve.await {
                tracing::warn!(error = %err, "callback server failed");
            }
        });

        tracing::debug!(addr = %local_addr, path = %path, "waiting for authorization callback");
        Ok(Self {
            local_addr,
            result,
            shutdown: Some(shutdown_tx),
        })
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the redirect, then stop the server.
    pub async fn wait(mut self, timeout: Duration) -> Result<CallbackParams, AuthError> {
        let outcome = tokio::time::timeout(timeout, &mut self.result).await;
        self.stop();
        match outcome {
            Ok(Ok(Ok(params))) => Ok(params),
            Ok(Ok(Err(reason))) => Err(AuthError::FlowInterrupted(reason)),
            Ok(Err(_)) => Err(AuthError::FlowInterrupted("callback server stopped".into())),
            Err(_) => Err(AuthError::FlowInterrupted(format!(
                "no authorization callback within {}s",
                timeout.as_secs()
            ))),
        }
    }

    fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bind `redirect_uri` and wait up to `timeout` for the redirect.
pub async fn wait_for_callback(
    redirect_uri: &str,
    timeout: Duration,
) -> Result<CallbackParams, AuthError> {
    CallbackListener::bind(redirect_uri).await?.wait(timeout).await
}

async fn on_redirect(
    State(slot): State<Slot>,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let outcome = match (query.get("code"), query.get("error")) {
        (Some(code), _) => Ok(CallbackParams {
            code: code.clone(),
            state: query.get("state").cloned(),
        }),
        (None, Some(error)) => {
            let description = query.get("error_description").map_or("", String::as_str);
            Err(format!("provider returned {error}: {description}"))
        }
        // Stray requests (favicon, health checks) do not end the wait.
        (None, None) => return (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE)),
    };

    let succeeded = outcome.is_ok();
    if let Some(tx) = slot.lock().take() {
        let _ = tx.send(outcome);
    }
    if succeeded {
        (StatusCode::OK, Html(SUCCESS_PAGE))
    } else {
        (StatusCode::BAD_REQUEST, Html(FAILURE_PAGE))
    }
}
