#![deny(missing_docs)]
//! Envelope transports for switchyard.
//!
//! Every transport implements [`Channel`](switchyard_proto::Channel) and is
//! composed from the same two pieces:
//!
//! - [`OutboundQueue`]: FIFO buffer for envelopes sent while no connection is
//!   available, flushed in order once one is.
//! - [`HandlerSet`]: ordered inbound dispatch where a failing handler is
//!   logged and skipped.
//!
//! | Transport | Connection | On failure |
//! |-----------|-----------|------------|
//! | [`SocketChannel`] | persistent, via a [`Connector`] | reconnect with exponential backoff + jitter, close after `max_reconnect_attempts` |
//! | [`PollingChannel`] | none, periodic fetch-since-cursor | log and poll again on the same fixed interval |
//! | [`LoopbackChannel`] | in-process pair | n/a |
//!
//! The polling transport does not back off: a failed poll is
//! retried on the next tick.

mod handlers;
mod loopback;
mod polling;
mod queue;
mod socket;
mod ws;

pub use handlers::HandlerSet;
pub use loopback::LoopbackChannel;
pub use polling::{PolledMessage, PollingChannel, PollingConfig};
pub use queue::OutboundQueue;
pub use socket::{Connector, Link, SocketChannel, SocketConfig};
pub use ws::WsConnector;
