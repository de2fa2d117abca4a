#![deny(missing_docs)]
//! OAuth 2.0 credential lifecycle for switchyard.
//!
//! [`CredentialManager`] drives the authorization-code flow with PKCE,
//! persists tokens in a [`SecureStore`](switchyard_store::SecureStore) and
//! refreshes them shortly before they expire. It implements
//! [`TokenSource`](switchyard_proto::TokenSource), so a
//! `ResilientClient` can attach its tokens directly.
//!
//! ```no_run
//! # async fn demo() -> Result<(), switchyard_auth::AuthError> {
//! use std::sync::Arc;
//! use switchyard_auth::{CredentialManager, OAuthConfig, callback};
//! use switchyard_store::FileStore;
//!
//! let config = OAuthConfig::from_env()?;
//! let store = Arc::new(FileStore::new("/home/me/.switchyard/credentials.json"));
//! let manager = CredentialManager::new(config, store);
//!
//! if !manager.is_authenticated().await? {
//!     manager
//!         .login(|url| println!("open {url}"), callback::DEFAULT_CALLBACK_TIMEOUT)
//!         .await?;
//! }
//! let bearer = manager.get_access_token().await?;
//! # let _ = bearer;
//! # Ok(())
//! # }
//! ```

pub mod callback;
mod config;
mod error;
mod manager;
pub mod pkce;
mod token;

pub use config::{DEFAULT_REDIRECT_URI, OAuthConfig};
pub use error::AuthError;
pub use manager::{CredentialManager, REFRESH_MARGIN, STORE_PREFIX};
pub use token::Token;
