//! Persistent-connection channel with queuing and reconnect backoff.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use switchyard_proto::{
    Backoff, Channel, ChannelError, ChannelState, CloseReason, Envelope, InboundHandler,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::handlers::HandlerSet;
use crate::queue::OutboundQueue;
use crate::ws::WsConnector;

/// Default number of consecutive reconnect attempts before closing.
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// One established connection, as a pair of frame queues.
///
/// Dropping `outbound` asks the connector to close the connection; the
/// connector closes `inbound` once the connection is gone.
pub struct Link {
    /// Frames to write to the peer.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames read from the peer. Ends when the connection drops.
    pub inbound: mpsc::UnboundedReceiver<String>,
}

/// Establishes connections for a [`SocketChannel`].
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open one connection.
    async fn connect(&self) -> Result<Link, ChannelError>;
}

/// Reconnect behaviour of a [`SocketChannel`].
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Consecutive failed reconnects tolerated before the channel closes.
    pub max_reconnect_attempts: u32,
    /// Delay schedule between reconnect attempts.
    pub backoff: Backoff,
}

impl SocketConfig {
    /// Override the reconnect attempt limit.
    #[must_use]
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Override the backoff schedule.
    #[must_use]
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

/// A [`Channel`] over a persistent connection.
///
/// Sends while disconnected are queued and the first one starts a
/// connection driver. The driver flushes the queue in FIFO order on every
/// successful connect and, when the connection drops or cannot be opened,
/// waits `backoff.delay(attempt)` before trying again. After
/// `max_reconnect_attempts` consecutive failures the channel closes with
/// [`CloseReason::ReconnectExhausted`] and further sends fail.
///
/// Dropping the channel stops the driver.
pub struct SocketChannel {
    shared: Arc<Shared>,
}

struct Shared {
    connector: Box<dyn Connector>,
    config: SocketConfig,
    handlers: HandlerSet,
    inner: Mutex<Inner>,
    state: watch::Sender<ChannelState>,
}

#[derive(Default)]
struct Inner {
    queue: OutboundQueue,
    link: Option<mpsc::UnboundedSender<String>>,
    failures: u32,
    driver: Option<JoinHandle<()>>,
    closed: Option<CloseReason>,
}

impl SocketChannel {
    /// Create a channel over the given connector. Nothing connects until the
    /// first [`send`](Channel::send) or [`connect`](SocketChannel::connect).
    pub fn new(connector: impl Connector, config: SocketConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector: Box::new(connector),
                config,
                handlers: HandlerSet::new(),
                inner: Mutex::new(Inner::default()),
                state,
            }),
        }
    }

    /// A WebSocket channel to `url` exchanging JSON text frames.
    pub fn websocket(url: impl Into<String>, config: SocketConfig) -> Self {
        Self::new(WsConnector::new(url), config)
    }

    /// Start connecting now instead of on the first send.
    pub async fn connect(&self) -> Result<(), ChannelError> {
        let mut inner = self.shared.inner.lock();
        if let Some(reason) = inner.closed {
            return Err(reason.to_error());
        }
        self.ensure_driver(&mut inner);
        Ok(())
    }

    /// Subscribe to state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.shared.state.subscribe()
    }

    /// Why the channel closed, once it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.shared.inner.lock().closed
    }

    /// Number of envelopes waiting for a connection.
    pub fn queued(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    fn ensure_driver(&self, inner: &mut Inner) {
        if inner.driver.is_none() {
            let shared = Arc::clone(&self.shared);
            inner.driver = Some(tokio::spawn(drive(shared)));
        }
    }
}

impl Drop for SocketChannel {
    fn drop(&mut self) {
        if let Some(driver) = self.shared.inner.lock().driver.take() {
            driver.abort();
        }
    }
}

#[async_trait]
impl Channel for SocketChannel {
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        let frame = envelope.to_json()?;
        let mut inner = self.shared.inner.lock();
        if let Some(reason) = inner.closed {
            return Err(reason.to_error());
        }
        if inner.queue.is_empty() {
            if let Some(link) = &inner.link {
                if link.send(frame).is_ok() {
                    return Ok(());
                }
                // The connection went away; the driver notices on its read side.
                inner.link = None;
            }
        }
        inner.queue.push(envelope);
        tracing::debug!(queued = inner.queue.len(), "envelope queued until connected");
        self.ensure_driver(&mut inner);
        Ok(())
    }

    fn receive(&self, handler: Arc<dyn InboundHandler>) {
        self.shared.handlers.add(handler);
    }

    async fn close(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.closed.is_none() {
            self.shared.shut_down(&mut inner, CloseReason::Requested);
            tracing::debug!("socket channel closed");
        }
    }

    fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }
}

impl Shared {
    /// Move to `state` unless the channel has closed. Returns whether the
    /// driver should keep going.
    fn transition(&self, state: ChannelState) -> bool {
        let inner = self.inner.lock();
        if inner.closed.is_some() {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    fn on_connected(&self, link: Link) -> Option<mpsc::UnboundedReceiver<String>> {
        let mut inner = self.inner.lock();
        if inner.closed.is_some() {
            return None;
        }
        inner.failures = 0;

        let pending = inner.queue.drain();
        let total = pending.len();
        let mut pending = pending.into_iter();
        let mut flushed = 0;
        while let Some(envelope) = pending.next() {
            let frame = match envelope.to_json() {
                Ok(frame) => frame,
                Err(err) => {
                    tracing::warn!(error = %err, "dropping unencodable queued envelope");
                    continue;
                }
            };
            if link.outbound.send(frame).is_err() {
                inner.queue.requeue_all(std::iter::once(envelope).chain(pending));
                break;
            }
            flushed += 1;
        }

        inner.link = Some(link.outbound);
        self.state.send_replace(ChannelState::Connected);
        tracing::info!(flushed, queued = total - flushed, "socket channel connected");
        Some(link.inbound)
    }

    async fn pump(&self, mut inbound: mpsc::UnboundedReceiver<String>) {
        while let Some(frame) = inbound.recv().await {
            match Envelope::from_json(&frame) {
                Ok(envelope) => self.handlers.dispatch(&envelope).await,
                Err(err) => tracing::warn!(error = %err, "dropping undecodable frame"),
            }
        }
    }

    fn on_dropped(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.closed.is_some() {
            return false;
        }
        inner.link = None;
        self.state.send_replace(ChannelState::Disconnected);
        tracing::warn!("socket connection dropped");
        true
    }

    /// Count one failure and decide whether to try again.
    fn next_attempt(&self) -> Option<u32> {
        let mut inner = self.inner.lock();
        if inner.closed.is_some() {
            return None;
        }
        inner.failures += 1;
        let attempt = inner.failures;
        if attempt > self.config.max_reconnect_attempts {
            tracing::error!(
                failures = attempt,
                dropped = inner.queue.len(),
                "reconnect attempts exhausted, closing channel"
            );
            self.shut_down(&mut inner, CloseReason::ReconnectExhausted { attempts: attempt });
            return None;
        }
        self.state.send_replace(ChannelState::Reconnecting { attempt });
        Some(attempt)
    }

    fn shut_down(&self, inner: &mut Inner, reason: CloseReason) {
        inner.closed = Some(reason);
        inner.link = None;
        inner.queue.clear();
        if let Some(driver) = inner.driver.take() {
            driver.abort();
        }
        self.handlers.clear();
        self.state.send_replace(ChannelState::Closed);
    }
}

async fn drive(shared: Arc<Shared>) {
    loop {
        if !shared.transition(ChannelState::Connecting) {
            return;
        }
        match shared.connector.connect().await {
            Ok(link) => {
                let Some(inbound) = shared.on_connected(link) else {
                    return;
                };
                shared.pump(inbound).await;
                if !shared.on_dropped() {
                    return;
                }
            }
            Err(err) => tracing::warn!(error = %err, "socket connect failed"),
        }

        let Some(attempt) = shared.next_attempt() else {
            return;
        };
        let delay = shared.config.backoff.delay(attempt);
        tracing::warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "scheduling reconnect"
        );
        tokio::time::sleep(delay).await;
    }
}
