use async_trait::async_trait;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use switchyard_proto::HandlerError;

/// Per-call context: the shared context overlaid with the request's own.
pub type Context = Map<String, Value>;

/// Executes one operation.
///
/// Return [`HandlerError::Api`] to report a specific error code; any other
/// error reaches the caller as `execution_error`.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Run the operation.
    async fn call(&self, parameters: Value, context: Context) -> Result<Value, HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Value, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn call(&self, parameters: Value, context: Context) -> Result<Value, HandlerError> {
        (self.0)(parameters, context).await
    }
}

/// Build a [`Handler`] from an async closure.
///
/// ```
/// use serde_json::json;
/// use switchyard_router::handler_fn;
///
/// let echo = handler_fn(|params, _ctx| async move { Ok(json!({ "echo": params })) });
/// # let _ = echo;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Value, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A backend serving several operations of one target.
///
/// The router only needs the operation names; how the adapter performs the
/// work (HTTP calls, a local application, a scripting bridge) is its own
/// business.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The operations this adapter serves.
    fn operations(&self) -> Vec<String>;

    /// Run `operation`.
    async fn execute(
        &self,
        operation: &str,
        parameters: Value,
        context: Context,
    ) -> Result<Value, HandlerError>;
}

/// One adapter operation exposed as a [`Handler`].
pub(crate) struct AdapterOperation {
    pub(crate) adapter: Arc<dyn Adapter>,
    pub(crate) operation: String,
}

#[async_trait]
impl Handler for AdapterOperation {
    async fn call(&self, parameters: Value, context: Context) -> Result<Value, HandlerError> {
        self.adapter
            .execute(&self.operation, parameters, context)
            .await
    }
}
