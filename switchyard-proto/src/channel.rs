//! The transport capability: send, receive, close.
//!
//! Socket, polling and loopback transports all implement [`Channel`]. The
//! router and any caller code depend only on this trait.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

use crate::envelope::Envelope;
use crate::error::{ChannelError, HandlerError};

/// Lifecycle of a channel.
///
/// ```text
/// Disconnected -> Connecting -> Connected -> Disconnected (drop)
///      ^                                          |
///      |                                          v
///      +------ Connecting <---- Reconnecting { attempt }
///
/// any state -> Closed (explicit close, or reconnects exhausted)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No connection and none in progress.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Envelopes are delivered immediately.
    Connected,
    /// Waiting out the backoff before reconnect attempt `attempt`.
    Reconnecting {
        /// 1-based reconnect attempt number.
        attempt: u32,
    },
    /// Terminal. Sends fail.
    Closed,
}

impl ChannelState {
    /// Whether this is the terminal state.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Why a channel reached [`ChannelState::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// `close()` was called.
    Requested,
    /// Reconnecting failed too many times in a row.
    ReconnectExhausted {
        /// Consecutive connect failures observed.
        attempts: u32,
    },
}

impl CloseReason {
    /// The error a `send` after closing reports.
    pub fn to_error(self) -> ChannelError {
        match self {
            Self::Requested => ChannelError::Closed,
            Self::ReconnectExhausted { attempts } => ChannelError::ReconnectExhausted { attempts },
        }
    }
}

/// Receives inbound envelopes from a channel.
///
/// Errors are logged by the channel and never stop delivery to the
/// remaining handlers.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    /// Handle one inbound envelope.
    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> InboundHandler for FnHandler<F>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError> {
        (self.0)(envelope).await
    }
}

/// Build an [`InboundHandler`] from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn InboundHandler>
where
    F: Fn(Envelope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A bidirectional envelope transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Deliver an envelope, or queue it until the channel is connected.
    ///
    /// Fails only when the channel is closed (or the envelope cannot be
    /// encoded); a disconnected channel queues instead.
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError>;

    /// Register a handler for every inbound envelope. Handlers run in
    /// registration order.
    fn receive(&self, handler: Arc<dyn InboundHandler>);

    /// Close the channel, cancelling reconnects and releasing handlers.
    /// Idempotent.
    async fn close(&self);

    /// The current lifecycle state.
    fn state(&self) -> ChannelState;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn _assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn traits_are_object_safe_send_sync() {
        _assert_send_sync::<Box<dyn Channel>>();
        _assert_send_sync::<Arc<dyn Channel>>();
        _assert_send_sync::<Arc<dyn InboundHandler>>();
    }

    #[tokio::test]
    async fn handler_fn_invokes_closure() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let handler = handler_fn(move |_env| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        handler
            .handle(Envelope::new("request", json!({})))
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_reason_maps_to_terminal_error() {
        assert!(matches!(CloseReason::Requested.to_error(), ChannelError::Closed));
        assert!(matches!(
            CloseReason::ReconnectExhausted { attempts: 4 }.to_error(),
            ChannelError::ReconnectExhausted { attempts: 4 }
        ));
    }
}
