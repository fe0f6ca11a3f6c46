//! Execution contexts and per-context metrics
//!
//! This module provides:
//! - **ExecutionBackend**: the single interface the router executes tools through.
//! - **GeneralBackend**: awaits async bodies in place, moves blocking bodies onto a
//!   bounded worker pool.
//! - **LowLatencyBackend**: a dedicated single-threaded cooperative event loop.
//! - **InlineBackend**: runs everything on the caller's task, for tests.
//! - **RuntimeMetrics**: latency/error accounting per context.

mod general;
mod inline;
mod low_latency;
mod metrics;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ExecutionContext, ToolFn, ToolResult};

pub use general::{DEFAULT_MAX_BLOCKING_WORKERS, GeneralBackend};
pub use inline::InlineBackend;
pub use low_latency::{LowLatencyBackend, ScopeError};
pub use metrics::{DEFAULT_LATENCY_WINDOW, MetricsSnapshot, RuntimeMetrics};

/// A place a tool body can run
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Which context this backend implements
    fn context(&self) -> ExecutionContext;

    /// Open the backend's execution scope; returns whether it is usable
    ///
    /// This is the capability probe: a `false` result makes the router route
    /// this context's work elsewhere. Calling it on an open backend is a no-op
    /// that returns `true`.
    async fn open(&self) -> bool;

    /// Close the execution scope, cancelling work it still owns. Idempotent.
    async fn close(&self);

    /// Run one tool call to completion
    async fn execute(&self, tool: &ToolFn, args: Value) -> ToolResult;
}
