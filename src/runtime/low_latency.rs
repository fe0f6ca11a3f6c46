//! Low-latency execution context: one dedicated thread driving a cooperative
//! single-threaded event loop.
//!
//! Jobs are handed to the loop over a channel and run as local tasks. Blocking
//! bodies run inline on the loop thread rather than on a worker pool. Closing
//! the scope drops the local task set, so anything still in flight is cancelled
//! and its caller receives [`ScopeError::Cancelled`].

use std::sync::{Mutex, PoisonError};
use std::thread::JoinHandle;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::LocalSet;

use crate::tools::{ExecutionContext, ToolFn, ToolResult};

use super::ExecutionBackend;

const THREAD_NAME: &str = "toolgate-low-latency";

/// Failures of the scope itself, as opposed to failures of the tool body.
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("low-latency scope is not open")]
    NotOpen,

    #[error("low-latency scope was cancelled before the tool completed")]
    Cancelled,
}

struct Job {
    tool: ToolFn,
    args: Value,
    reply: oneshot::Sender<ToolResult>,
}

struct Scope {
    jobs: mpsc::UnboundedSender<Job>,
    thread: JoinHandle<()>,
}

/// Backend that owns a single cooperative scheduler.
pub struct LowLatencyBackend {
    scope: Mutex<Option<Scope>>,
}

impl LowLatencyBackend {
    pub fn new() -> Self {
        Self {
            scope: Mutex::new(None),
        }
    }

    pub fn is_open(&self) -> bool {
        self.scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Job>> {
        self.scope
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|scope| scope.jobs.clone())
    }
}

impl Default for LowLatencyBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Body of the scope thread.
fn run_event_loop(mut jobs: mpsc::UnboundedReceiver<Job>, ready: oneshot::Sender<bool>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build low-latency runtime");
            let _ = ready.send(false);
            return;
        }
    };

    let local = LocalSet::new();
    let _ = ready.send(true);

    local.block_on(&runtime, async move {
        while let Some(job) = jobs.recv().await {
            tokio::task::spawn_local(async move {
                let result = job.tool.call_in_place(job.args).await;
                let _ = job.reply.send(result);
            });
        }
    });

    tracing::debug!("Low-latency event loop exited");
}

#[async_trait]
impl ExecutionBackend for LowLatencyBackend {
    fn context(&self) -> ExecutionContext {
        ExecutionContext::LowLatency
    }

    async fn open(&self) -> bool {
        if self.is_open() {
            return true;
        }

        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let thread = match std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run_event_loop(jobs_rx, ready_tx))
        {
            Ok(thread) => thread,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to spawn low-latency thread");
                return false;
            }
        };

        if !ready_rx.await.unwrap_or(false) {
            return false;
        }

        let mut scope = self.scope.lock().unwrap_or_else(PoisonError::into_inner);
        if scope.is_some() {
            // Lost a race with a concurrent open; the extra loop exits once jobs_tx drops
            return true;
        }
        *scope = Some(Scope { jobs: jobs_tx, thread });
        true
    }

    async fn close(&self) {
        let scope = self.scope.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Scope { jobs, thread }) = scope else {
            return;
        };

        drop(jobs);
        if !matches!(tokio::task::spawn_blocking(move || thread.join()).await, Ok(Ok(()))) {
            tracing::warn!("Low-latency thread did not shut down cleanly");
        }
    }

    async fn execute(&self, tool: &ToolFn, args: Value) -> ToolResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            tool: tool.clone(),
            args,
            reply: reply_tx,
        };

        // The sender clone must not outlive this statement or close() could never drain the loop
        self.sender()
            .ok_or(ScopeError::NotOpen)?
            .send(job)
            .map_err(|_| ScopeError::Cancelled)?;

        reply_rx.await.map_err(|_| ScopeError::Cancelled)?
    }
}
