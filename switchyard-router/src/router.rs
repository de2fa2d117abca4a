use futures_util::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use switchyard_proto::{
    ApiError, Envelope, EnvelopeKind, Request, Response, ResponseMetadata, codes,
};

use crate::context::ContextStore;
use crate::error::RegistryError;
use crate::handler::{Adapter, AdapterOperation, Context, Handler};

type Key = (String, String);

/// Dispatches requests to handlers registered by `(target, operation)`.
///
/// All methods take `&self`, so a router shared as `Arc<Router>` can keep
/// gaining handlers after it has been bound to a channel.
#[derive(Default)]
pub struct Router {
    handlers: RwLock<HashMap<Key, Arc<dyn Handler>>>,
    context: ContextStore,
}

impl Router {
    /// Create an empty router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one operation.
    pub fn register_handler(
        &self,
        target: impl Into<String>,
        operation: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<(), RegistryError> {
        let key = key(target.into(), operation.into())?;
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered {
                target: key.0,
                operation: key.1,
            });
        }
        tracing::debug!(app = %key.0, operation = %key.1, "handler registered");
        handlers.insert(key, handler);
        Ok(())
    }

    /// Register or overwrite the handler for one operation.
    ///
    /// Returns the handler it replaced, if any.
    pub fn replace_handler(
        &self,
        target: impl Into<String>,
        operation: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<Option<Arc<dyn Handler>>, RegistryError> {
        let key = key(target.into(), operation.into())?;
        Ok(self.handlers.write().insert(key, handler))
    }

    /// Register every operation an adapter serves under `target`.
    ///
    /// Nothing is registered if any of the operations is already taken.
    pub fn register_adapter(
        &self,
        target: impl Into<String>,
        adapter: Arc<dyn Adapter>,
    ) -> Result<(), RegistryError> {
        let target = target.into();
        let entries = adapter_entries(&target, &adapter)?;
        let mut handlers = self.handlers.write();
        if let Some((taken, _)) = entries.iter().find(|(k, _)| handlers.contains_key(k)) {
            return Err(RegistryError::AlreadyRegistered {
                target: taken.0.clone(),
                operation: taken.1.clone(),
            });
        }
        tracing::debug!(app = %target, operations = entries.len(), "adapter registered");
        handlers.extend(entries);
        Ok(())
    }

    /// Swap in a new adapter for `target`.
    ///
    /// Every operation previously registered under `target` is removed first,
    /// whether it came from an adapter or a single handler.
    pub fn replace_adapter(
        &self,
        target: impl Into<String>,
        adapter: Arc<dyn Adapter>,
    ) -> Result<(), RegistryError> {
        let target = target.into();
        let entries = adapter_entries(&target, &adapter)?;
        let mut handlers = self.handlers.write();
        handlers.retain(|(t, _), _| t != &target);
        handlers.extend(entries);
        Ok(())
    }

    /// Remove one operation. Returns whether it was registered.
    pub fn unregister(&self, target: &str, operation: &str) -> bool {
        self.handlers
            .write()
            .remove(&(target.to_owned(), operation.to_owned()))
            .is_some()
    }

    /// Registered `(target, operation)` pairs, sorted.
    pub fn operations(&self) -> Vec<(String, String)> {
        let mut keys: Vec<_> = self.handlers.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether a handler is registered for the pair.
    pub fn supports(&self, target: &str, operation: &str) -> bool {
        self.handlers
            .read()
            .contains_key(&(target.to_owned(), operation.to_owned()))
    }

    /// Set one shared context entry.
    pub fn set_context(&self, key: impl Into<String>, value: Value) {
        self.context.set(key.into(), value);
    }

    /// Read one shared context entry.
    pub fn get_context(&self, key: &str) -> Option<Value> {
        self.context.get(key)
    }

    /// Merge entries into the shared context, overwriting existing keys.
    pub fn merge_context(&self, values: Map<String, Value>) {
        self.context.merge(values);
    }

    /// Remove one shared context entry.
    pub fn remove_context(&self, key: &str) -> Option<Value> {
        self.context.remove(key)
    }

    /// Drop every shared context entry.
    pub fn clear_context(&self) {
        self.context.clear();
    }

    /// A copy of the shared context as it is now.
    pub fn context_snapshot(&self) -> Map<String, Value> {
        self.context.snapshot().as_ref().clone()
    }

    /// Run a request and describe the outcome.
    ///
    /// Never fails: validation errors, unknown operations, handler errors and
    /// handler panics all come back as a failed [`Response`].
    pub async fn execute(&self, request: Request) -> Response {
        let started = Instant::now();
        let id = request.metadata.id.clone();
        let outcome = self.run(request).await;
        let metadata = ResponseMetadata {
            execution_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            id,
        };
        match outcome {
            Ok(result) => Response::success(result, metadata),
            Err(error) => Response::failure(error, metadata),
        }
    }

    async fn run(&self, request: Request) -> Result<Value, ApiError> {
        if request.target.is_empty() {
            return Err(ApiError::new(
                codes::MISSING_APP_TYPE,
                "request has no target",
            ));
        }
        if request.operation.is_empty() {
            return Err(ApiError::new(
                codes::MISSING_OPERATION,
                "request has no operation",
            ));
        }

        let handler = self
            .handlers
            .read()
            .get(&(request.target.clone(), request.operation.clone()))
            .cloned()
            .ok_or_else(|| {
                ApiError::new(
                    codes::OPERATION_NOT_SUPPORTED,
                    format!(
                        "{} does not support {}",
                        request.target, request.operation
                    ),
                )
            })?;

        let context = self.call_context(request.context);
        tracing::debug!(
            app = %request.target,
            operation = %request.operation,
            id = %request.metadata.id,
            "executing"
        );

        match AssertUnwindSafe(handler.call(request.parameters, context))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                let err = err.into_api_error();
                tracing::warn!(
                    app = %request.target,
                    operation = %request.operation,
                    code = %err.code,
                    error = %err.message,
                    "handler failed"
                );
                Err(err)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::warn!(
                    app = %request.target,
                    operation = %request.operation,
                    panic = %message,
                    "handler panicked"
                );
                Err(ApiError::new(
                    codes::EXECUTION_ERROR,
                    format!("handler panicked: {message}"),
                ))
            }
        }
    }

    fn call_context(&self, overrides: Map<String, Value>) -> Context {
        let mut context = self.context.snapshot().as_ref().clone();
        context.extend(overrides);
        context
    }

    /// React to one inbound envelope.
    ///
    /// A `request` is executed and answered with a `response` envelope that
    /// echoes the correlation id. A `context_update` is merged into the
    /// shared context. Anything else is dropped.
    pub async fn handle_incoming(&self, envelope: &Envelope) -> Option<Envelope> {
        match &envelope.kind {
            EnvelopeKind::Request => {
                let response = match serde_json::from_value::<Request>(envelope.data.clone()) {
                    Ok(request) => self.execute(request).await,
                    Err(err) => {
                        tracing::warn!(error = %err, "undecodable request envelope");
                        Response::failure(
                            ApiError::new(
                                codes::EXECUTION_ERROR,
                                format!("malformed request: {err}"),
                            ),
                            ResponseMetadata::default(),
                        )
                    }
                };
                Some(Envelope::response(
                    &response,
                    envelope.correlation_id.clone(),
                ))
            }
            EnvelopeKind::ContextUpdate => {
                match &envelope.data {
                    Value::Object(values) => self.merge_context(values.clone()),
                    other => tracing::warn!(
                        data = %other,
                        "context update is not an object, ignoring"
                    ),
                }
                None
            }
            other => {
                tracing::debug!(kind = %other, "router ignoring envelope");
                None
            }
        }
    }
}

fn key(target: String, operation: String) -> Result<Key, RegistryError> {
    if target.is_empty() || operation.is_empty() {
        return Err(RegistryError::EmptyName);
    }
    Ok((target, operation))
}

fn adapter_entries(
    target: &str,
    adapter: &Arc<dyn Adapter>,
) -> Result<Vec<(Key, Arc<dyn Handler>)>, RegistryError> {
    adapter
        .operations()
        .into_iter()
        .map(|operation| {
            let key = key(target.to_owned(), operation.clone())?;
            let handler: Arc<dyn Handler> = Arc::new(AdapterOperation {
                adapter: Arc::clone(adapter),
                operation,
            });
            Ok((key, handler))
        })
        .collect()
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}
