//! Connectionless channel that polls an HTTP endpoint on a fixed interval.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use switchyard_proto::{Channel, ChannelError, ChannelState, Envelope, InboundHandler};
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::handlers::HandlerSet;
use crate::queue::OutboundQueue;

/// One message returned by the poll endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolledMessage {
    /// Server-assigned identifier; becomes the next cursor.
    pub id: String,
    /// The delivered envelope.
    pub envelope: Envelope,
}

#[derive(Debug, Default, Deserialize)]
struct PollBatch {
    #[serde(default)]
    messages: Vec<PolledMessage>,
}

/// Endpoint and timing of a [`PollingChannel`].
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Base URL; the channel uses `{base_url}/messages`.
    pub base_url: String,
    /// Fixed delay between polls, also used after a failed poll.
    pub interval: Duration,
    /// Per-request time limit.
    pub request_timeout: Duration,
}

impl PollingConfig {
    /// Poll `base_url` once a second with a ten second request limit.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Override the poll interval.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the request time limit.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/messages", self.base_url.trim_end_matches('/'))
    }
}

/// A [`Channel`] without a persistent connection.
///
/// A background task issues `GET {base}/messages?since={cursor}` every
/// `interval`; the cursor advances to the id of the last message seen.
/// Outbound envelopes are queued and `POST`ed to `{base}/messages` by the
/// same task in FIFO order; a failed post stays at the head of the queue for
/// the next tick.
///
/// A failed poll is logged and the next poll happens after the same fixed
/// interval. Unlike [`SocketChannel`](crate::SocketChannel) there is no
/// backoff and no attempt limit.
///
/// The task starts on the first send or on [`start`](PollingChannel::start).
pub struct PollingChannel {
    shared: Arc<Shared>,
}

struct Shared {
    config: PollingConfig,
    http: reqwest::Client,
    handlers: HandlerSet,
    inner: Mutex<Inner>,
    wake: Notify,
    state: watch::Sender<ChannelState>,
}

#[derive(Default)]
struct Inner {
    queue: OutboundQueue,
    cursor: Option<String>,
    task: Option<JoinHandle<()>>,
    closed: bool,
}

impl PollingChannel {
    /// Create a channel for the given endpoint.
    pub fn new(config: PollingConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                http: reqwest::Client::new(),
                handlers: HandlerSet::new(),
                inner: Mutex::new(Inner::default()),
                wake: Notify::new(),
                state,
            }),
        }
    }

    /// Start polling now.
    pub async fn start(&self) -> Result<(), ChannelError> {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return Err(ChannelError::Closed);
        }
        self.ensure_task(&mut inner);
        Ok(())
    }

    /// The id of the last message received, if any.
    pub fn cursor(&self) -> Option<String> {
        self.shared.inner.lock().cursor.clone()
    }

    /// Number of envelopes waiting to be posted.
    pub fn queued(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    fn ensure_task(&self, inner: &mut Inner) {
        if inner.task.is_none() {
            let shared = Arc::clone(&self.shared);
            inner.task = Some(tokio::spawn(run(shared)));
            self.shared.state.send_replace(ChannelState::Connected);
        }
    }
}

impl Drop for PollingChannel {
    fn drop(&mut self) {
        if let Some(task) = self.shared.inner.lock().task.take() {
            task.abort();
        }
    }
}

#[async_trait]
impl Channel for PollingChannel {
    async fn send(&self, envelope: Envelope) -> Result<(), ChannelError> {
        {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return Err(ChannelError::Closed);
            }
            inner.queue.push(envelope);
            self.ensure_task(&mut inner);
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    fn receive(&self, handler: Arc<dyn InboundHandler>) {
        self.shared.handlers.add(handler);
    }

    async fn close(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.queue.clear();
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        self.shared.handlers.clear();
        self.shared.state.send_replace(ChannelState::Closed);
        tracing::debug!("polling channel closed");
    }

    fn state(&self) -> ChannelState {
        *self.shared.state.borrow()
    }
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Post queued envelopes oldest first; stop at the first failure.
    async fn flush(&self) {
        loop {
            let Some(envelope) = self.inner.lock().queue.pop() else {
                return;
            };
            match self.post(&envelope).await {
                Ok(()) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "polling send failed, will retry next tick");
                    let mut inner = self.inner.lock();
                    if !inner.closed {
                        inner.queue.requeue(envelope);
                    }
                    return;
                }
            }
        }
    }

    async fn post(&self, envelope: &Envelope) -> Result<(), ChannelError> {
        let response = self
            .http
            .post(self.config.messages_url())
            .timeout(self.config.request_timeout)
            .json(envelope)
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Transport(format!("send rejected with HTTP {status}")));
        }
        Ok(())
    }

    async fn poll_once(&self) {
        let cursor = self.inner.lock().cursor.clone();
        match self.fetch(cursor.as_deref()).await {
            Ok(messages) => {
                if !messages.is_empty() {
                    tracing::debug!(count = messages.len(), "poll received messages");
                }
                for message in messages {
                    if self.is_closed() {
                        return;
                    }
                    self.handlers.dispatch(&message.envelope).await;
                    self.inner.lock().cursor = Some(message.id);
                }
            }
            Err(err) => tracing::warn!(
                error = %err,
                interval_ms = self.config.interval.as_millis() as u64,
                "poll failed, retrying on next interval"
            ),
        }
    }

    async fn fetch(&self, cursor: Option<&str>) -> Result<Vec<PolledMessage>, ChannelError> {
        let mut request = self
            .http
            .get(self.config.messages_url())
            .timeout(self.config.request_timeout);
        if let Some(cursor) = cursor {
            request = request.query(&[("since", cursor)]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::Transport(format!("poll rejected with HTTP {status}")));
        }
        let body = response
            .text()
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let batch: PollBatch = serde_json::from_str(&body)?;
        Ok(batch.messages)
    }
}

async fn run(shared: Arc<Shared>) {
    let mut ticker = tokio::time::interval(shared.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                shared.flush().await;
                shared.poll_once().await;
            }
            _ = shared.wake.notified() => {
                shared.flush().await;
            }
        }
        if shared.is_closed() {
            return;
        }
    }
}
