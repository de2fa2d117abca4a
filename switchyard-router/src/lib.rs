#![deny(missing_docs)]
//! Request dispatch for switchyard.
//!
//! A [`Router`] maps `(target, operation)` pairs to [`Handler`]s, keeps a
//! shared context that every request sees, and turns each [`Request`] into a
//! [`Response`]. It never returns an error from `execute`: failures are
//! reported in the response with a stable code from
//! [`switchyard_proto::codes`].
//!
//! ```
//! use serde_json::json;
//! use switchyard_proto::Request;
//! use switchyard_router::{Router, handler_fn};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let router = Router::new();
//! router
//!     .register_handler("files", "stat", handler_fn(|params, _ctx| async move {
//!         Ok(json!({ "path": params["path"], "size": 0 }))
//!     }))
//!     .unwrap();
//!
//! let response = router
//!     .execute(Request::new("files", "stat").with_parameters(json!({ "path": "/tmp" })))
//!     .await;
//! assert!(response.success);
//! # }
//! ```
//!
//! [`bind`] serves a router over any [`Channel`](switchyard_proto::Channel);
//! [`Requester`] is the matching client side.
//!
//! [`Request`]: switchyard_proto::Request
//! [`Response`]: switchyard_proto::Response

mod bind;
mod context;
mod error;
mod handler;
mod requester;
mod router;

pub use bind::bind;
pub use error::RegistryError;
pub use handler::{Adapter, Context, Handler, handler_fn};
pub use requester::Requester;
pub use router::Router;
