//! # switchyard-proto: shared vocabulary for the switchyard runtime
//!
//! Every other switchyard crate speaks in the types defined here:
//!
//! | Concern | Types | What it does |
//! |---------|-------|-------------|
//! | Wire | [`Envelope`], [`EnvelopeKind`] | Typed payload + correlation id + timestamp |
//! | Calls | [`Request`], [`Response`], [`ApiError`] | One operation invocation and its outcome |
//! | Transport | [`Channel`], [`InboundHandler`], [`ChannelState`] | Deliver envelopes between caller and runtime |
//! | Credentials | [`TokenSource`] | Supply bearer tokens to outbound calls |
//! | Timing | [`Backoff`] | Exponential backoff with jitter, as a pure function |
//!
//! ## Error codes
//!
//! Failures that cross a crate boundary carry a stable string code (see
//! [`codes`]). Callers branch on `Response::success` and then on
//! `ApiError::code`, never on error message text.
//!
//! ## Encoding
//!
//! The envelope model is encoding-agnostic. The serde derives produce the
//! JSON shape the bundled transports use, but a [`Channel`] implementation is
//! free to frame envelopes however it likes.

#![deny(missing_docs)]

pub mod backoff;
pub mod channel;
pub mod codes;
pub mod envelope;
pub mod error;
pub mod request;
pub mod token;

pub use backoff::Backoff;
pub use channel::{Channel, ChannelState, CloseReason, InboundHandler, handler_fn};
pub use envelope::{Envelope, EnvelopeKind, new_correlation_id, now_millis};
pub use error::{BoxError, ChannelError, HandlerError};
pub use request::{ApiError, Request, RequestMetadata, Response, ResponseMetadata};
pub use token::TokenSource;
