use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use switchyard_proto::{Channel, ChannelError, ChannelState, Envelope, InboundHandler};
use tokio::sync::watch;

use crate::handlers::HandlerSet;

/// In-process [`Channel`] connected to a single peer.
///
/// [`pair`](LoopbackChannel::pair) returns two ends; an envelope sent on one
/// is dispatched to the other end's handlers before `send` returns. No
/// encoding takes place. Closing either end closes both, and a send after
/// the peer has been dropped fails with [`ChannelError::Closed`].
pub struct LoopbackChannel {
    end: Arc<End>,
}

struct End {
    handlers: HandlerSet,
    peer: Mutex<Weak<End>>,
    state: watch::Sender<ChannelState>,
}

impl End {
    fn new() -> Arc<Self> {
        let (state, _) = watch::channel(ChannelState::Connected);
        Arc::new(Self {
            handlers: HandlerSet::new(),
            peer: Mutex::new(Weak::new()),
            state,
        })
    }

    fn is_closed(&self) -> bool {
        self.state.borrow().is_closed()
    }

    fn shut(&self) {
        *self.peer.lock() = Weak::new();
        self.handlers.clear();
        self.state.send_replace(ChannelState::Closed);
    }
}

impl LoopbackChannel {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let a = End::new();
        let b = End::new();
        *a.peer.lock() = Arc::downgrade(&b);
        *b.peer.lock() = Arc::downgrade(&a);
        (Self { end: a }, Self { end: b })
    }

    /// Subscribe to state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.end.state.subscribe()
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.end.shut();
    }
}

#[async_trait]
impl Channel for LoopbackChannel {
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        if self.end.is_closed() {
            return Err(ChannelError::Closed);
        }
        let peer = self.end.peer.lock().upgrade();
        let Some(peer) = peer else {
            return Err(ChannelError::Closed);
        };
        if peer.is_closed() {
            return Err(ChannelError::Closed);
        }
        peer.handlers.dispatch(&envelope).await;
        Ok(())
    }

    fn receive(&self, handler: Arc<dyn InboundHandler>) {
        self.end.handlers.add(handler);
    }

    async fn close(&self) {
        if self.end.is_closed() {
            return;
        }
        let peer = self.end.peer.lock().upgrade();
        self.end.shut();
        if let Some(peer) = peer {
            peer.shut();
        }
        tracing::debug!("loopback channel closed");
    }

    fn state(&self) -> ChannelState {
        *self.end.state.borrow()
    }
}
