use async_trait::async_trait;
use std::sync::{Arc, Weak};
use switchyard_proto::{Channel, Envelope, HandlerError, InboundHandler};

use crate::router::Router;

/// Serve `router` over `channel`.
///
/// Every inbound envelope goes through [`Router::handle_incoming`]; replies
/// are sent back over the same channel. The channel only holds a weak
/// reference to itself through the handler, so dropping the last `Arc` of the
/// channel still releases it.
pub fn bind(router: Arc<Router>, channel: &Arc<dyn Channel>) {
    channel.receive(Arc::new(Binding {
        router,
        channel: Arc::downgrade(channel),
    }));
}

struct Binding {
    router: Arc<Router>,
    channel: Weak<dyn Channel>,
}

#[async_trait]
impl InboundHandler for Binding {
    async fn handle(&self, envelope: Envelope) -> Result<(), HandlerError> {
        let Some(reply) = self.router.handle_incoming(&envelope).await else {
            return Ok(());
        };
        let Some(channel) = self.channel.upgrade() else {
            tracing::debug!("channel dropped before reply could be sent");
            return Ok(());
        };
        channel
            .send(reply)
            .await
            .map_err(|e| HandlerError::Failed(Box::new(e)))
    }
}
