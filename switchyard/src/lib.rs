#![deny(missing_docs)]
//! # switchyard: umbrella crate
//!
//! One import surface for the switchyard crates. The protocol types are
//! always available; channels, routing, the HTTP client and credential
//! management sit behind feature flags, plus a `prelude` for the common
//! wiring.
//!
//! | Feature | Crate |
//! |---------|-------|
//! | (always) | [`switchyard_proto`] |
//! | `transport` | `switchyard_transport` |
//! | `router` | `switchyard_router` |
//! | `client` | `switchyard_client` |
//! | `store` | `switchyard_store` |
//! | `auth` | `switchyard_auth` |

#[cfg(feature = "auth")]
pub use switchyard_auth;
#[cfg(feature = "client")]
pub use switchyard_client;
pub use switchyard_proto;
#[cfg(feature = "router")]
pub use switchyard_router;
#[cfg(feature = "store")]
pub use switchyard_store;
#[cfg(feature = "transport")]
pub use switchyard_transport;

/// Happy-path imports for wiring a switchyard runtime.
pub mod prelude {
    pub use switchyard_proto::{
        ApiError, Channel, ChannelError, ChannelState, Envelope, EnvelopeKind, HandlerError,
        InboundHandler, Request, Response, TokenSource, codes,
    };

    #[cfg(feature = "transport")]
    pub use switchyard_transport::{
        LoopbackChannel, PollingChannel, PollingConfig, SocketChannel, SocketConfig, WsConnector,
    };

    #[cfg(feature = "router")]
    pub use switchyard_router::{Adapter, Handler, Requester, Router, bind, handler_fn};

    #[cfg(feature = "client")]
    pub use switchyard_client::{ClientConfig, ClientError, ResilientClient, RetryPolicy};

    #[cfg(feature = "store")]
    pub use switchyard_store::{FileStore, MemoryStore, SecureStore};

    #[cfg(feature = "auth")]
    pub use switchyard_auth::{AuthError, CredentialManager, OAuthConfig, Token};
}
