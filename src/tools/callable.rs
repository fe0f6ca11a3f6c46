//! Callable tool bodies
//!
//! A [`ToolFn`] wraps either an async body (awaited in place) or a blocking
//! body (moved off the async scheduler by the general context). Tools may also
//! opt into [`DeclaresExecutionContext`] to influence routing.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

use crate::error::BoxError;

use super::definition::{ExecutionContext, ToolMetadata};

/// Result returned by a tool body
pub type ToolResult = std::result::Result<Value, BoxError>;

pub type AsyncBody = Arc<dyn Fn(Value) -> BoxFuture<'static, ToolResult> + Send + Sync>;
pub type BlockingBody = Arc<dyn Fn(Value) -> ToolResult + Send + Sync>;

/// A tool body panicked instead of returning
#[derive(Debug, Error)]
#[error("tool panicked: {message}")]
pub struct ToolPanicked {
    pub message: String,
}

impl ToolPanicked {
    /// Build from a panic payload as returned by `catch_unwind` or `JoinError::into_panic`
    pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message }
    }
}

fn panicked(payload: Box<dyn Any + Send>) -> BoxError {
    Box::new(ToolPanicked::from_payload(payload))
}

/// The executable part of a tool
#[derive(Clone)]
pub enum ToolBody {
    /// Non-blocking body, polled on whichever runtime executes it
    Async(AsyncBody),
    /// Body that blocks the calling thread
    Blocking(BlockingBody),
}

impl ToolBody {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }
}

/// Optional capability a tool implementation can satisfy to state where it wants to run
pub trait DeclaresExecutionContext: Send + Sync {
    /// Full metadata carried by the implementation itself
    fn declared_metadata(&self) -> Option<ToolMetadata> {
        None
    }

    /// Bare context hint
    fn context_hint(&self) -> Option<ExecutionContext> {
        None
    }
}

/// A callable tool handed to the router at dispatch time
#[derive(Clone)]
pub struct ToolFn {
    body: ToolBody,
    origin: Option<String>,
    declaration: Option<Arc<dyn DeclaresExecutionContext>>,
}

impl ToolFn {
    /// Wrap an async function
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ToolResult> + Send + 'static,
    {
        let body: AsyncBody = Arc::new(move |args| Box::pin(f(args)));
        Self::new(ToolBody::Async(body))
    }

    /// Wrap a blocking function
    pub fn from_blocking<F>(f: F) -> Self
    where
        F: Fn(Value) -> ToolResult + Send + Sync + 'static,
    {
        Self::new(ToolBody::Blocking(Arc::new(f)))
    }

    fn new(body: ToolBody) -> Self {
        Self {
            body,
            origin: None,
            declaration: None,
        }
    }

    /// Set the module path the tool was defined in, typically `module_path!()`
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Attach an implementation that declares its own execution context
    pub fn with_declaration(mut self, declaration: Arc<dyn DeclaresExecutionContext>) -> Self {
        self.declaration = Some(declaration);
        self
    }

    pub fn body(&self) -> &ToolBody {
        &self.body
    }

    pub fn is_blocking(&self) -> bool {
        self.body.is_blocking()
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn declaration(&self) -> Option<&dyn DeclaresExecutionContext> {
        self.declaration.as_deref()
    }

    /// Run the body on the current thread, blocking it if the body blocks
    ///
    /// A panicking body yields a [`ToolPanicked`] error instead of unwinding.
    pub async fn call_in_place(&self, args: Value) -> ToolResult {
        match &self.body {
            ToolBody::Async(f) => AssertUnwindSafe(f(args))
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| Err(panicked(payload))),
            ToolBody::Blocking(f) => {
                std::panic::catch_unwind(AssertUnwindSafe(|| f(args)))
                    .unwrap_or_else(|payload| Err(panicked(payload)))
            }
        }
    }
}

impl fmt::Debug for ToolFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolFn")
            .field("blocking", &self.is_blocking())
            .field("origin", &self.origin)
            .field("declares", &self.declaration.is_some())
            .finish()
    }
}
