//! Client and retry configuration.

use std::collections::BTreeSet;
use std::time::Duration;
use switchyard_proto::Backoff;

use crate::error::ClientError;

/// Default number of attempts, including the first.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default per-attempt time limit.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Statuses retried by default.
const DEFAULT_RETRYABLE: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Environment variable holding the request timeout in seconds.
pub const ENV_REQUEST_TIMEOUT: &str = "SWITCHYARD_REQUEST_TIMEOUT";

/// How many times to try a call and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Delay schedule between attempts.
    pub backoff: Backoff,
    /// HTTP statuses that are worth retrying.
    pub retryable_statuses: BTreeSet<u16>,
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn no_retry() -> Self {
        Self::default().max_attempts(1)
    }

    /// Override the attempt limit.
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Override the delay schedule.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Replace the set of retryable statuses.
    #[must_use]
    pub fn retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_statuses = statuses.into_iter().collect();
        self
    }

    /// Whether `status` is in the retryable set.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// The effective attempt limit.
    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
            retryable_statuses: DEFAULT_RETRYABLE.into_iter().collect(),
        }
    }
}

/// Settings of a [`ResilientClient`](crate::ResilientClient).
///
/// ```
/// use std::time::Duration;
/// use switchyard_client::{ClientConfig, RetryPolicy};
///
/// let config = ClientConfig::new("https://api.example.com")
///     .timeout(Duration::from_secs(10))
///     .header("x-api-key", "k-123")
///     .retry(RetryPolicy::default().max_attempts(5));
/// assert_eq!(config.retry.max_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for relative request paths.
    pub base_url: String,
    /// Limit for one attempt, from sending the request to reading the body.
    pub timeout: Duration,
    /// Headers sent with every call; per-call headers win on conflict.
    pub default_headers: Vec<(String, String)>,
    /// Retry behaviour.
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Defaults: 30 second timeout, [`RetryPolicy::default`], no extra headers.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            default_headers: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    /// Like [`new`](Self::new), reading the timeout from
    /// `SWITCHYARD_REQUEST_TIMEOUT` (whole seconds) when set.
    pub fn from_env(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::from_lookup(base_url, |key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        base_url: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let mut config = Self::new(base_url);
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ClientError::InvalidConfig(format!("{ENV_REQUEST_TIMEOUT} is not a number: {raw:?}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Add a default header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Override the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve `path` against the base URL. Absolute URLs pass through.
    pub(crate) fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.is_empty() {
            return self.base_url.clone();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
