#![deny(missing_docs)]
//! Resilient HTTP calls for switchyard.
//!
//! [`ResilientClient`] classifies each attempt as success, retryable HTTP
//! failure, non-retryable HTTP failure, timeout or network failure, and
//! retries the transient ones under a [`RetryPolicy`] using the shared
//! [`Backoff`](switchyard_proto::Backoff) schedule.
//!
//! Failures are always a typed [`ClientError`] with a stable
//! [`code`](ClientError::code), convertible into
//! [`ApiError`](switchyard_proto::ApiError) for router responses.

mod client;
mod config;
mod error;

pub use client::{RequestOptions, ResilientClient};
pub use config::{ClientConfig, ENV_REQUEST_TIMEOUT, RetryPolicy};
pub use error::ClientError;
pub use reqwest::Method;
