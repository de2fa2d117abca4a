use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use switchyard_proto::{
    Channel, ChannelError, Envelope, EnvelopeKind, HandlerError, InboundHandler, Request, Response,
};
use tokio::sync::oneshot;

type Pending = Mutex<HashMap<String, oneshot::Sender<Response>>>;

/// The calling side of a bound router.
///
/// Sends `request` envelopes over a channel and resolves each call when the
/// `response` envelope with the same correlation id comes back. Calls still
/// waiting when the channel closes and releases its handlers fail with
/// [`ChannelError::Closed`].
pub struct Requester {
    channel: Arc<dyn Channel>,
    pending: Pending,
}

impl Requester {
    /// Start listening for responses on `channel`.
    pub fn attach(channel: Arc<dyn Channel>) -> Arc<Self> {
        let requester = Arc::new(Self {
            channel: Arc::clone(&channel),
            pending: Mutex::new(HashMap::new()),
        });
        channel.receive(Arc::new(Replies(Arc::downgrade(&requester))));
        requester
    }

    /// Send `request` and wait for its response.
    ///
    /// Fails with [`ChannelError::Closed`] if the channel closes first, if the
    /// call is abandoned by [`cancel_pending`](Self::cancel_pending), or if
    /// its response cannot be decoded. Dropping the returned future forgets
    /// the call.
    pub async fn call(&self, request: &Request) -> Result<Response, ChannelError> {
        let envelope = Envelope::request(request);
        let Some(id) = envelope.correlation_id.clone() else {
            return Err(ChannelError::Transport("request envelope has no correlation id".into()));
        };

        let (tx, rx) = oneshot::channel();
        // Registered before sending: an inline transport may answer during send.
        self.pending.lock().insert(id.clone(), tx);
        let _registered = Registered {
            pending: &self.pending,
            id,
        };
        self.channel.send(envelope).await?;
        rx.await.map_err(|_| ChannelError::Closed)
    }

    /// Calls still waiting for a response.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Abandon every waiting call.
    pub fn cancel_pending(&self) {
        self.pending.lock().clear();
    }

    fn resolve(&self, envelope: &Envelope) {
        let Some(id) = envelope.correlation_id.as_deref() else {
            tracing::debug!("response without correlation id dropped");
            return;
        };
        let Some(tx) = self.pending.lock().remove(id) else {
            tracing::debug!(correlation_id = %id, "response for unknown call dropped");
            return;
        };
        match serde_json::from_value::<Response>(envelope.data.clone()) {
            Ok(response) => {
                let _ = tx.send(response);
            }
            Err(err) => {
                tracing::warn!(correlation_id = %id, error = %err, "undecodable response");
            }
        }
    }
}

/// Removes a call's entry when the call finishes or is dropped.
struct Registered<'a> {
    pending: &'a Pending,
    id: String,
}

impl Drop for Registered<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

struct Replies(Weak<Requester>);

// The channel drops its handlers on close.
impl Drop for Replies {
    fn drop(&mut self) {
        if let Some(requester) = self.0.upgrade() {
            tracing::debug!(pending = requester.pending(), "channel released its handlers");
            requester.cancel_pending();
        }
    }
}

#[async_trait]
impl InboundHandler for Replies {
    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError> {
        if envelope.kind == EnvelopeKind::Response {
            if let Some(requester) = self.0.upgrade() {
                requester.resolve(&envelope);
            }
        }
        Ok(())
    }
}
