//! Request handlers for dynamically registered services.
//!
//! A handler receives the decoded request as `serde_json::Value` and produces
//! either a JSON response or a `tonic::Status`. Whether JSON field names are
//! original or lowerCamelCase, and how wide integers and enums are spelled,
//! follows the options the service's schema was loaded with.
use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tonic::Status;

type HandlerFn = dyn Fn(Value) -> BoxFuture<'static, Result<Value, Status>> + Send + Sync;

/// A unary request handler: JSON request in, JSON response (or status) out.
///
/// Handlers are cheap to clone and may be invoked concurrently.
#[derive(Clone)]
pub struct MethodHandler {
    f: Arc<HandlerFn>,
}

impl MethodHandler {
    /// Wraps an async handler.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Status>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |request| Box::pin(f(request))),
        }
    }

    /// Wraps a synchronous handler.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Status> + Send + Sync + 'static,
    {
        Self::new(move |request| std::future::ready(f(request)))
    }

    pub(crate) fn invoke(&self, request: Value) -> BoxFuture<'static, Result<Value, Status>> {
        (self.f)(request)
    }
}

impl fmt::Debug for MethodHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MethodHandler")
    }
}

/// The set of method handlers offered for one service registration.
///
/// Registration validates the set against the service descriptor: every unary
/// method needs a handler, while handlers for streaming or unknown methods
/// are dropped with a warning.
#[derive(Debug, Clone, Default)]
pub struct HandlerSet {
    handlers: HashMap<String, MethodHandler>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler for `method`, replacing any previous one.
    pub fn insert(&mut self, method: impl Into<String>, handler: MethodHandler) {
        self.handlers.insert(method.into(), handler);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, method: impl Into<String>, handler: MethodHandler) -> Self {
        self.insert(method, handler);
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn into_inner(self) -> HashMap<String, MethodHandler> {
        self.handlers
    }
}
