use futures_util::FutureExt;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use switchyard_proto::{Envelope, InboundHandler};

/// Ordered set of inbound handlers.
///
/// [`dispatch`](HandlerSet::dispatch) awaits each handler in registration
/// order. An error or panic in one handler is logged and delivery continues
/// with the next, so the latency of one dispatch is the sum of the handler
/// latencies.
#[derive(Default)]
pub struct HandlerSet {
    handlers: RwLock<Vec<Arc<dyn InboundHandler>>>,
}

impl HandlerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler.
    pub fn add(&self, handler: Arc<dyn InboundHandler>) {
        self.handlers.write().push(handler);
    }

    /// Release every handler.
    pub fn clear(&self) {
        // Handlers are dropped after the lock is released.
        let released = std::mem::take(&mut *self.handlers.write());
        drop(released);
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no handlers are registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }

    /// Deliver one envelope to every handler, in order.
    pub async fn dispatch(&self, envelope: &Envelope) {
        let handlers = self.handlers.read().clone();
        for (index, handler) in handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(handler.handle(envelope.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(
                    handler = index,
                    kind = %envelope.kind,
                    error = %err,
                    "inbound handler failed"
                ),
                Err(_) => tracing::warn!(
                    handler = index,
                    kind = %envelope.kind,
                    "inbound handler panicked"
                ),
            }
        }
    }
}
