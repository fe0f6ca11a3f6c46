//! Synchronous backend that runs tools on the caller's task.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{ExecutionContext, ToolFn, ToolResult};

use super::ExecutionBackend;

/// Stand-in for either context that executes everything in place.
///
/// Blocking bodies are called directly, so this is only suitable for tests and
/// tools known to be cheap.
#[derive(Debug)]
pub struct InlineBackend {
    context: ExecutionContext,
    available: bool,
    open: AtomicBool,
    executions: AtomicU64,
}

impl InlineBackend {
    pub fn new(context: ExecutionContext) -> Self {
        Self {
            context,
            available: true,
            open: AtomicBool::new(false),
            executions: AtomicU64::new(0),
        }
    }

    /// A backend whose capability probe fails
    pub fn unavailable(context: ExecutionContext) -> Self {
        Self {
            available: false,
            ..Self::new(context)
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Number of tool calls this backend has run
    pub fn execution_count(&self) -> u64 {
        self.executions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBackend for InlineBackend {
    fn context(&self) -> ExecutionContext {
        self.context
    }

    async fn open(&self) -> bool {
        self.open.store(self.available, Ordering::SeqCst);
        self.available
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    async fn execute(&self, tool: &ToolFn, args: Value) -> ToolResult {
        self.executions.fetch_add(1, Ordering::SeqCst);
        tool.call_in_place(args).await
    }
}
