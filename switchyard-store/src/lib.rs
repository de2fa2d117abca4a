#![deny(missing_docs)]
//! Secure key-value storage for switchyard credentials.
//!
//! This crate defines the [`SecureStore`] trait the credential manager
//! persists tokens and PKCE verifiers through, and two backends:
//!
//! - [`MemoryStore`]: a `HashMap` behind a `RwLock`. Nothing survives a
//!   restart.
//! - [`FileStore`]: one JSON object per file, written atomically with
//!   owner-only permissions on Unix.
//!
//! Host-specific backends (an OS keychain, browser storage) implement the
//! same trait. Values are opaque strings; keys are namespaced by the caller.

use async_trait::async_trait;
use thiserror::Error;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors from a secure store backend.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or read.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The stored data is not in the expected format.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// Catch-all.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

/// Asynchronous string key-value storage for secrets.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key is absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, replacing any previous one.
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a value. Deleting an absent key is not an error.
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    /// Delete every value in this store.
    async fn clear(&self) -> Result<(), StoreError>;
}
