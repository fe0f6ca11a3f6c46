//! General execution context backed by the ambient tokio runtime.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::BoxError;
use crate::tools::{ExecutionContext, ToolBody, ToolFn, ToolPanicked, ToolResult};

use super::ExecutionBackend;

/// Default number of blocking bodies allowed to run at once.
pub const DEFAULT_MAX_BLOCKING_WORKERS: usize = 16;

/// Runs async bodies in place and blocking bodies on a bounded worker pool.
#[derive(Debug, Clone)]
pub struct GeneralBackend {
    blocking_permits: Arc<Semaphore>,
    max_blocking_workers: usize,
}

impl GeneralBackend {
    pub fn new(max_blocking_workers: usize) -> Self {
        let max_blocking_workers = max_blocking_workers.max(1);
        Self {
            blocking_permits: Arc::new(Semaphore::new(max_blocking_workers)),
            max_blocking_workers,
        }
    }

    pub fn max_blocking_workers(&self) -> usize {
        self.max_blocking_workers
    }

    /// Blocking slots not currently in use.
    pub fn idle_blocking_workers(&self) -> usize {
        self.blocking_permits.available_permits()
    }
}

impl Default for GeneralBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BLOCKING_WORKERS)
    }
}

#[async_trait]
impl ExecutionBackend for GeneralBackend {
    fn context(&self) -> ExecutionContext {
        ExecutionContext::General
    }

    async fn open(&self) -> bool {
        true
    }

    async fn close(&self) {}

    async fn execute(&self, tool: &ToolFn, args: Value) -> ToolResult {
        match tool.body() {
            ToolBody::Async(_) => tool.call_in_place(args).await,
            ToolBody::Blocking(f) => {
                // Wait for a slot before handing the body to the blocking pool
                let permit = self
                    .blocking_permits
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| Box::new(e) as BoxError)?;

                let f = f.clone();
                tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    f(args)
                })
                .await
                .map_err(|e| match e.try_into_panic() {
                    Ok(payload) => Box::new(ToolPanicked::from_payload(payload)) as BoxError,
                    Err(e) => Box::new(e) as BoxError,
                })?
            }
        }
    }
}
