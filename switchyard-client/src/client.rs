//! The retrying HTTP client.

use parking_lot::RwLock;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::sync::Arc;
use switchyard_proto::TokenSource;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// Per-call additions to a request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl RequestOptions {
    /// No extra query parameters or headers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Add a header, overriding a default header of the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// An HTTP client that retries transient failures.
///
/// Each attempt is bounded by [`ClientConfig::timeout`]. A status in the
/// retry policy's set, a timeout or a network failure is retried after
/// `backoff.delay(attempt)` until `max_attempts` is reached, at which point
/// [`ClientError::Exhausted`] is returned. Any other non-2xx status fails
/// immediately with [`ClientError::Http`].
///
/// ```no_run
/// # async fn demo() -> Result<(), switchyard_client::ClientError> {
/// use switchyard_client::{ClientConfig, ResilientClient};
///
/// let client = ResilientClient::new(ClientConfig::new("https://api.example.com"));
/// client.set_bearer_token("tok-123");
/// let projects = client.get("/projects").await?;
/// # let _ = projects;
/// # Ok(())
/// # }
/// ```
pub struct ResilientClient {
    config: ClientConfig,
    http: reqwest::Client,
    bearer: RwLock<Option<String>>,
    token_source: Option<Arc<dyn TokenSource>>,
}

impl ResilientClient {
    /// Create a client with the given configuration.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            bearer: RwLock::new(None),
            token_source: None,
        }
    }

    /// Ask `source` for a bearer token before every attempt. Takes precedence
    /// over [`set_bearer_token`](Self::set_bearer_token).
    #[must_use]
    pub fn with_token_source(mut self, source: Arc<dyn TokenSource>) -> Self {
        self.token_source = Some(source);
        self
    }

    /// Use `token` as the bearer credential for all later calls.
    pub fn set_bearer_token(&self, token: impl Into<String>) {
        *self.bearer.write() = Some(token.into());
    }

    /// Stop sending a bearer credential.
    pub fn clear_bearer_token(&self) {
        *self.bearer.write() = None;
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// `GET path`.
    pub async fn get(&self, path: &str) -> Result<Value, ClientError> {
        self.request(Method::GET, path, None).await
    }

    /// `POST path` with a JSON body.
    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// `PUT path` with a JSON body.
    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// `PATCH path` with a JSON body.
    pub async fn patch(&self, path: &str, body: Value) -> Result<Value, ClientError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// `DELETE path`.
    pub async fn delete(&self, path: &str) -> Result<Value, ClientError> {
        self.request(Method::DELETE, path, None).await
    }

    /// Send a request with an optional JSON body and decode the JSON reply.
    /// An empty body decodes as [`Value::Null`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, ClientError> {
        self.request_with(method, path, body, RequestOptions::default())
            .await
    }

    /// [`request`](Self::request) with extra query parameters and headers.
    pub async fn request_with(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        options: RequestOptions,
    ) -> Result<Value, ClientError> {
        let url = self.config.url_for(path);
        let policy = &self.config.retry;
        let max_attempts = policy.attempts();
        let mut attempt = 1;

        loop {
            tracing::debug!(%method, url = %url, attempt, "sending request");
            let err = match self.attempt(&method, &url, body.as_ref(), &options).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !self.is_retryable(&err) {
                tracing::debug!(%method, url = %url, error = %err, "request failed");
                return Err(err);
            }
            if attempt >= max_attempts {
                tracing::warn!(%method, url = %url, attempts = attempt, error = %err, "retries exhausted");
                return Err(ClientError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = policy.backoff.delay(attempt);
            tracing::warn!(
                %method,
                url = %url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    fn is_retryable(&self, err: &ClientError) -> bool {
        match err {
            ClientError::Http { status, .. } => self.config.retry.is_retryable_status(*status),
            ClientError::Timeout(_) | ClientError::Network(_) => true,
            _ => false,
        }
    }

    async fn bearer_token(&self) -> Result<Option<String>, ClientError> {
        match &self.token_source {
            Some(source) => source
                .access_token()
                .await
                .map(Some)
                .map_err(ClientError::TokenUnavailable),
            None => Ok(self.bearer.read().clone()),
        }
    }

    /// Default headers overlaid with the per-call ones.
    fn headers(&self, options: &RequestOptions) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        for (name, value) in self.config.default_headers.iter().chain(&options.headers) {
            let header = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidConfig(format!("header name {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::InvalidConfig(format!("header {name:?}: {e}")))?;
            headers.insert(header, value);
        }
        Ok(headers)
    }

    async fn attempt(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        options: &RequestOptions,
    ) -> Result<Value, ClientError> {
        let token = self.bearer_token().await?;

        let mut builder = self.http.request(method.clone(), url);
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        builder = builder.headers(self.headers(options)?);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let exchange = async move {
            let response = builder.send().await.map_err(map_reqwest_error)?;
            let status = response.status();
            let text = response.text().await.map_err(map_reqwest_error)?;
            Ok::<_, ClientError>((status, text))
        };
        let (status, text) = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| ClientError::Timeout(self.config.timeout))??;

        if !status.is_success() {
            return Err(ClientError::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_builder() {
        ClientError::InvalidConfig(err.to_string())
    } else {
        ClientError::Network(err.to_string())
    }
}
