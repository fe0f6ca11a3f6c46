//! Router - decides which execution context runs each tool call and measures it
//!
//! The router owns a detection cache (tool name to context), one
//! [`RuntimeMetrics`] per concrete context, and the two execution backends.
//!
//! # Lifecycle
//!
//! `Stopped -> Running -> Stopped`. [`Router::start`] probes the low-latency
//! backend; if the probe fails, tools resolved to that context run on the
//! general context instead. Dispatch is refused while stopped.
//!
//! # Locking
//!
//! The cache, registry, and each metrics instance have their own lock. None of
//! them is held while a tool body runs.
//!
//! # Example
//!
//! ```ignore
//! use toolgate::router::Router;
//! use toolgate::tools::{ExecutionContext, ToolFn, ToolMetadata};
//!
//! let router = Router::standalone();
//! router.register_metadata(ToolMetadata::new("p2p_status", ExecutionContext::LowLatency)?);
//! router.start().await;
//!
//! let tool = ToolFn::from_async(|_| async { Ok(serde_json::json!("ok")) });
//! let result = router.dispatch("p2p_status", &tool, serde_json::Value::Null).await?;
//! ```

mod resolve;
mod stats;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::RouterConfig;
use crate::error::{Result, ToolgateError};
use crate::runtime::{ExecutionBackend, GeneralBackend, LowLatencyBackend, MetricsSnapshot, RuntimeMetrics};
use crate::tools::{ExecutionContext, MetadataRegistry, RegistryStatistics, ToolFn, ToolMetadata};

pub use resolve::{Resolution, ResolutionRule};
pub use stats::{AggregateStats, ContextShare, LatencyImprovement, MIN_SAMPLES_FOR_COMPARISON};

/// Lifecycle status of a router
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterStatus {
    Stopped,
    Running,
}

#[derive(Debug)]
struct Lifecycle {
    status: RouterStatus,
    low_latency_available: bool,
    started_at: Option<DateTime<Utc>>,
}

/// Builder for [`Router`] with injectable registry and backends
pub struct RouterBuilder {
    config: RouterConfig,
    registry: Option<Arc<MetadataRegistry>>,
    general: Option<Arc<dyn ExecutionBackend>>,
    low_latency: Option<Arc<dyn ExecutionBackend>>,
}

impl RouterBuilder {
    fn new() -> Self {
        Self {
            config: RouterConfig::default(),
            registry: None,
            general: None,
            low_latency: None,
        }
    }

    /// Set router configuration
    pub fn config(mut self, config: RouterConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an externally owned registry
    pub fn registry(mut self, registry: Arc<MetadataRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replace the general context backend
    pub fn general_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.general = Some(backend);
        self
    }

    /// Replace the low-latency context backend
    pub fn low_latency_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.low_latency = Some(backend);
        self
    }

    /// Validate configuration and backends, then build the router
    pub fn build(self) -> Result<Router> {
        self.config.validate()?;

        let general = self
            .general
            .unwrap_or_else(|| Arc::new(GeneralBackend::new(self.config.max_blocking_workers)));
        let low_latency = self.low_latency.unwrap_or_else(|| Arc::new(LowLatencyBackend::new()));

        for (expected, backend) in [
            (ExecutionContext::General, &general),
            (ExecutionContext::LowLatency, &low_latency),
        ] {
            if backend.context() != expected {
                return Err(ToolgateError::InvalidContext(format!(
                    "backend for {} context reports {}",
                    expected,
                    backend.context()
                )));
            }
        }

        let registry = self.registry.unwrap_or_else(MetadataRegistry::shared);
        Ok(Router::from_parts(self.config, registry, general, low_latency))
    }
}

/// Dispatches tool calls to the general or low-latency execution context
pub struct Router {
    config: RouterConfig,
    registry: Arc<MetadataRegistry>,
    general: Arc<dyn ExecutionBackend>,
    low_latency: Arc<dyn ExecutionBackend>,
    cache: RwLock<HashMap<String, ExecutionContext>>,
    /// Bumped under the cache write lock whenever a registration changes an answer
    generation: AtomicU64,
    general_metrics: Mutex<RuntimeMetrics>,
    low_latency_metrics: Mutex<RuntimeMetrics>,
    lifecycle: Mutex<Lifecycle>,
    /// Serializes start/stop so backends are opened and closed once
    transition: tokio::sync::Mutex<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder::new()
    }

    /// Convenience constructor for single-process use: a fresh registry,
    /// default configuration, and the real backends.
    pub fn standalone() -> Self {
        let config = RouterConfig::default();
        let general = Arc::new(GeneralBackend::new(config.max_blocking_workers));
        Self::from_parts(config, MetadataRegistry::shared(), general, Arc::new(LowLatencyBackend::new()))
    }

    fn from_parts(
        config: RouterConfig,
        registry: Arc<MetadataRegistry>,
        general: Arc<dyn ExecutionBackend>,
        low_latency: Arc<dyn ExecutionBackend>,
    ) -> Self {
        let window = config.metrics_window;
        Self {
            config,
            registry,
            general,
            low_latency,
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            general_metrics: Mutex::new(RuntimeMetrics::with_window(window)),
            low_latency_metrics: Mutex::new(RuntimeMetrics::with_window(window)),
            lifecycle: Mutex::new(Lifecycle {
                status: RouterStatus::Stopped,
                low_latency_available: false,
                started_at: None,
            }),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<MetadataRegistry> {
        &self.registry
    }

    pub fn status(&self) -> RouterStatus {
        lock(&self.lifecycle).status
    }

    pub fn is_running(&self) -> bool {
        self.status() == RouterStatus::Running
    }

    /// Result of the last capability probe; false while stopped
    pub fn low_latency_available(&self) -> bool {
        lock(&self.lifecycle).low_latency_available
    }

    /// Open the execution backends and begin accepting dispatches. Idempotent.
    pub async fn start(&self) {
        let _transition = self.transition.lock().await;

        if self.is_running() {
            tracing::warn!("Router already running, ignoring start");
            return;
        }

        if !self.general.open().await {
            tracing::error!("General execution context failed to open");
        }

        let low_latency_available = self.config.enable_low_latency && self.low_latency.open().await;
        if low_latency_available {
            tracing::info!("Low-latency execution context available");
        } else {
            tracing::info!("Low-latency execution context unavailable, its tools will run on the general context");
        }

        if self.config.enable_memory_tracking {
            tracing::debug!("Memory tracking requested but not yet instrumented");
        }

        let mut lifecycle = lock(&self.lifecycle);
        lifecycle.status = RouterStatus::Running;
        lifecycle.low_latency_available = low_latency_available;
        lifecycle.started_at = Some(Utc::now());
    }

    /// Stop accepting dispatches and close the backends. Idempotent.
    pub async fn stop(&self) {
        let _transition = self.transition.lock().await;

        let low_latency_was_open = {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.status == RouterStatus::Stopped {
                tracing::warn!("Router not running, ignoring stop");
                return;
            }
            lifecycle.status = RouterStatus::Stopped;
            lifecycle.started_at = None;
            std::mem::replace(&mut lifecycle.low_latency_available, false)
        };

        if low_latency_was_open {
            self.low_latency.close().await;
        }
        self.general.close().await;
        tracing::info!("Router stopped");
    }

    fn cached(&self, tool_name: &str) -> Option<ExecutionContext> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tool_name)
            .copied()
    }

    /// Resolve a tool's context and report which rule decided it
    pub fn resolve_explained(&self, tool_name: &str, tool: &ToolFn) -> Resolution {
        if let Some(context) = self.cached(tool_name) {
            return Resolution {
                context,
                rule: ResolutionRule::Cache,
            };
        }

        loop {
            let generation = self.generation.load(Ordering::Acquire);
            let resolution = resolve::resolve_uncached(tool_name, tool, &self.registry, &self.config);

            let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
            if self.generation.load(Ordering::Acquire) != generation {
                // A registration landed while resolving; the answer may be stale
                drop(cache);
                tracing::debug!(tool = tool_name, "Registration raced resolution, resolving again");
                continue;
            }

            tracing::debug!(
                tool = tool_name,
                context = %resolution.context,
                rule = %resolution.rule,
                "Resolved execution context"
            );

            // Concurrent resolvers compute the same answer; keep whichever landed first
            let context = *cache.entry(tool_name.to_string()).or_insert(resolution.context);
            return Resolution { context, ..resolution };
        }
    }

    /// Resolve which context should run a tool
    pub fn resolve(&self, tool_name: &str, tool: &ToolFn) -> ExecutionContext {
        self.resolve_explained(tool_name, tool).context
    }

    /// Run a tool call on its resolved context and record the outcome
    pub async fn dispatch(&self, tool_name: &str, tool: &ToolFn, args: Value) -> Result<Value> {
        let low_latency_available = {
            let lifecycle = lock(&self.lifecycle);
            if lifecycle.status != RouterStatus::Running {
                return Err(ToolgateError::NotStarted);
            }
            lifecycle.low_latency_available
        };

        let started = Instant::now();
        let context = self.resolve(tool_name, tool);

        let outcome = match context {
            ExecutionContext::LowLatency if low_latency_available => self.low_latency.execute(tool, args).await,
            ExecutionContext::LowLatency => {
                tracing::debug!(tool = tool_name, "Low-latency context unavailable, falling back to general");
                self.general.execute(tool, args).await
            }
            _ => self.general.execute(tool, args).await,
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.record(context, latency_ms, outcome.is_err());

        outcome.map_err(|source| {
            tracing::error!(tool = tool_name, context = %context, latency_ms, error = %source, "Tool execution failed");
            ToolgateError::ExecutionFailed {
                tool: tool_name.to_string(),
                context,
                source,
            }
        })
    }

    fn metrics_for(&self, context: ExecutionContext) -> &Mutex<RuntimeMetrics> {
        match context {
            ExecutionContext::LowLatency => &self.low_latency_metrics,
            _ => &self.general_metrics,
        }
    }

    fn record(&self, context: ExecutionContext, latency_ms: f64, is_error: bool) {
        if !self.config.enable_metrics {
            return;
        }
        lock(self.metrics_for(context)).record_request(latency_ms, is_error);
    }

    /// Register metadata and forget any cached resolution for that tool
    pub fn register_metadata(&self, meta: ToolMetadata) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.remove(meta.name());
        self.registry.register(meta);
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Pin a tool to a context, bypassing resolution
    pub fn register_execution_context(&self, tool_name: &str, context: ExecutionContext) -> Result<()> {
        let context = context.require_concrete()?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        cache.insert(tool_name.to_string(), context);
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// Known context for a tool without running resolution
    ///
    /// Checks the cache, then concrete registry metadata.
    pub fn get_execution_context(&self, tool_name: &str) -> Option<ExecutionContext> {
        self.cached(tool_name).or_else(|| {
            self.registry
                .get(tool_name)
                .map(|meta| meta.execution_context())
                .filter(ExecutionContext::is_concrete)
        })
    }

    /// Cached tool names mapped to the given context, sorted
    pub fn list_tools_by_context(&self, context: ExecutionContext) -> Vec<String> {
        let mut names: Vec<String> = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, ctx)| **ctx == context)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn cached_tool_count(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Pre-populate the cache from every concrete registry entry
    pub fn bulk_register_from_registry(&self) -> usize {
        let entries: Vec<_> = self
            .registry
            .list_all()
            .into_iter()
            .filter(|meta| meta.execution_context().is_concrete())
            .collect();

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        for meta in &entries {
            cache.insert(meta.name().to_string(), meta.execution_context());
        }
        self.generation.fetch_add(1, Ordering::AcqRel);
        drop(cache);

        tracing::info!(count = entries.len(), "Pre-populated execution context cache from registry");
        entries.len()
    }

    pub fn metrics_snapshot(&self) -> BTreeMap<ExecutionContext, MetricsSnapshot> {
        ExecutionContext::CONCRETE
            .into_iter()
            .map(|ctx| (ctx, lock(self.metrics_for(ctx)).snapshot()))
            .collect()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn aggregate_stats(&self) -> AggregateStats {
        let general = lock(&self.general_metrics).snapshot();
        let low_latency = lock(&self.low_latency_metrics).snapshot();
        let uptime_seconds = lock(&self.lifecycle)
            .started_at
            .map(|t| (Utc::now() - t).num_milliseconds() as f64 / 1000.0);

        stats::aggregate(&general, &low_latency, uptime_seconds)
    }

    pub fn registry_statistics(&self) -> RegistryStatistics {
        self.registry.statistics()
    }

    /// Replace every context's metrics with a fresh accumulator
    pub fn reset_metrics(&self) {
        for ctx in ExecutionContext::CONCRETE {
            *lock(self.metrics_for(ctx)) = RuntimeMetrics::with_window(self.config.metrics_window);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::InlineBackend;
    use crate::tools::{DeclaresExecutionContext, ToolPanicked};
    use serde_json::json;
    use std::sync::Barrier;
    use std::sync::atomic::AtomicBool;

    struct Harness {
        router: Router,
        general: Arc<InlineBackend>,
        low_latency: Arc<InlineBackend>,
    }

    fn harness_with(config: RouterConfig, low_latency: InlineBackend) -> Harness {
        let general = Arc::new(InlineBackend::new(ExecutionContext::General));
        let low_latency = Arc::new(low_latency);
        let router = Router::builder()
            .config(config)
            .general_backend(general.clone())
            .low_latency_backend(low_latency.clone())
            .build()
            .unwrap();
        Harness {
            router,
            general,
            low_latency,
        }
    }

    fn harness() -> Harness {
        harness_with(RouterConfig::default(), InlineBackend::new(ExecutionContext::LowLatency))
    }

    fn ok_tool() -> ToolFn {
        ToolFn::from_async(|args| async move { Ok(json!({ "args": args })) })
    }

    #[test]
    fn test_builder_rejects_mismatched_backend() {
        let result = Router::builder()
            .general_backend(Arc::new(InlineBackend::new(ExecutionContext::LowLatency)))
            .build();
        assert!(matches!(result, Err(ToolgateError::InvalidContext(_))));
    }

    #[test]
    fn test_builder_rejects_auto_default() {
        let config = RouterConfig::default().with_default_context(ExecutionContext::Auto);
        assert!(Router::builder().config(config).build().is_err());
    }

    #[test]
    fn test_new_router_is_stopped() {
        let h = harness();
        assert_eq!(h.router.status(), RouterStatus::Stopped);
        assert!(!h.router.low_latency_available());
        assert!(h.router.aggregate_stats().uptime_seconds.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_requires_start() {
        let h = harness();
        let err = h.router.dispatch("convert_pdf", &ok_tool(), Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolgateError::NotStarted));

        h.router.start().await;
        assert!(h.router.dispatch("convert_pdf", &ok_tool(), Value::Null).await.is_ok());

        h.router.stop().await;
        let err = h.router.dispatch("convert_pdf", &ok_tool(), Value::Null).await.unwrap_err();
        assert!(matches!(err, ToolgateError::NotStarted));
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let h = harness();
        h.router.start().await;
        h.router.start().await;
        assert!(h.router.is_running());
        assert!(h.router.low_latency_available());
        assert!(h.low_latency.is_open());

        h.router.stop().await;
        h.router.stop().await;
        assert!(!h.router.is_running());
        assert!(!h.low_latency.is_open());
        assert!(!h.general.is_open());
    }

    #[tokio::test]
    async fn test_resolution_is_cached() {
        let h = harness();
        h.router
            .register_metadata(ToolMetadata::new("load_dataset", ExecutionContext::LowLatency).unwrap());

        let tool = ok_tool();
        let first = h.router.resolve_explained("load_dataset", &tool);
        assert_eq!(first.context, ExecutionContext::LowLatency);
        assert_eq!(first.rule, ResolutionRule::Registry);
        let lookups = h.router.registry().lookup_count();

        for _ in 0..5 {
            let again = h.router.resolve_explained("load_dataset", &tool);
            assert_eq!(again.context, ExecutionContext::LowLatency);
            assert_eq!(again.rule, ResolutionRule::Cache);
        }
        assert_eq!(h.router.registry().lookup_count(), lookups);
    }

    #[tokio::test]
    async fn test_default_resolution_is_cached_too() {
        let h = harness();
        let tool = ok_tool();
        assert_eq!(h.router.resolve("convert_pdf", &tool), ExecutionContext::General);
        assert_eq!(h.router.cached_tool_count(), 1);
        assert_eq!(h.router.resolve_explained("convert_pdf", &tool).rule, ResolutionRule::Cache);
    }

    #[tokio::test]
    async fn test_register_metadata_invalidates_cache() {
        let h = harness();
        let tool = ok_tool();
        assert_eq!(h.router.resolve("embed_text", &tool), ExecutionContext::General);

        h.router
            .register_metadata(ToolMetadata::new("embed_text", ExecutionContext::LowLatency).unwrap());
        assert_eq!(h.router.resolve("embed_text", &tool), ExecutionContext::LowLatency);
    }

    /// Parks the first resolution after its registry lookup until released
    struct ParkOnce {
        parked: AtomicBool,
        reached: Arc<Barrier>,
        release: Arc<Barrier>,
    }

    impl DeclaresExecutionContext for ParkOnce {
        fn context_hint(&self) -> Option<ExecutionContext> {
            if !self.parked.swap(true, Ordering::SeqCst) {
                self.reached.wait();
                self.release.wait();
            }
            None
        }
    }

    #[test]
    fn test_registration_during_resolution_is_not_lost() {
        let h = harness();
        let router = Arc::new(h.router);
        let reached = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));

        let tool = ok_tool().with_declaration(Arc::new(ParkOnce {
            parked: AtomicBool::new(false),
            reached: reached.clone(),
            release: release.clone(),
        }));

        let resolver = {
            let router = router.clone();
            std::thread::spawn(move || router.resolve("p2p_x", &tool))
        };

        // The resolver has already missed the registry and would fall to the name pattern
        reached.wait();
        router.register_metadata(ToolMetadata::new("p2p_x", ExecutionContext::General).unwrap());
        release.wait();

        assert_eq!(resolver.join().unwrap(), ExecutionContext::General);
        assert_eq!(router.resolve("p2p_x", &ok_tool()), ExecutionContext::General);
        assert_eq!(router.get_execution_context("p2p_x"), Some(ExecutionContext::General));
    }

    #[test]
    fn test_register_execution_context() {
        let h = harness();
        h.router
            .register_execution_context("scrape", ExecutionContext::LowLatency)
            .unwrap();
        assert_eq!(h.router.get_execution_context("scrape"), Some(ExecutionContext::LowLatency));
        assert_eq!(h.router.resolve("scrape", &ok_tool()), ExecutionContext::LowLatency);

        // Explicit registration overwrites
        h.router
            .register_execution_context("scrape", ExecutionContext::General)
            .unwrap();
        assert_eq!(h.router.get_execution_context("scrape"), Some(ExecutionContext::General));

        let err = h
            .router
            .register_execution_context("scrape", ExecutionContext::Auto)
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_get_execution_context_reads_registry() {
        let h = harness();
        h.router
            .register_metadata(ToolMetadata::new("pinned", ExecutionContext::General).unwrap());
        h.router
            .register_metadata(ToolMetadata::new("floating", ExecutionContext::Auto).unwrap());

        assert_eq!(h.router.get_execution_context("pinned"), Some(ExecutionContext::General));
        assert_eq!(h.router.get_execution_context("floating"), None);
        assert_eq!(h.router.get_execution_context("unknown"), None);
        assert_eq!(h.router.cached_tool_count(), 0);
    }

    #[test]
    fn test_bulk_register_from_registry() {
        let h = harness();
        let registry = h.router.registry();
        registry.register(ToolMetadata::new("a", ExecutionContext::General).unwrap());
        registry.register(ToolMetadata::new("b", ExecutionContext::LowLatency).unwrap());
        registry.register(ToolMetadata::new("c", ExecutionContext::LowLatency).unwrap());
        registry.register(ToolMetadata::new("d", ExecutionContext::Auto).unwrap());

        assert_eq!(h.router.bulk_register_from_registry(), 3);
        assert_eq!(h.router.list_tools_by_context(ExecutionContext::LowLatency), vec!["b", "c"]);
        assert_eq!(h.router.list_tools_by_context(ExecutionContext::General), vec!["a"]);
        assert_eq!(h.router.get_execution_context("d"), None);
    }

    #[tokio::test]
    async fn test_dispatch_routes_to_resolved_backend() {
        let h = harness();
        h.router.start().await;

        h.router.dispatch("p2p_status", &ok_tool(), json!(1)).await.unwrap();
        h.router.dispatch("convert_pdf", &ok_tool(), json!(2)).await.unwrap();
        h.router.dispatch("convert_pdf", &ok_tool(), json!(3)).await.unwrap();

        assert_eq!(h.low_latency.execution_count(), 1);
        assert_eq!(h.general.execution_count(), 2);

        let snapshot = h.router.metrics_snapshot();
        assert_eq!(snapshot[&ExecutionContext::LowLatency].request_count, 1);
        assert_eq!(snapshot[&ExecutionContext::General].request_count, 2);
    }

    #[tokio::test]
    async fn test_fallback_when_low_latency_unavailable() {
        let h = harness_with(
            RouterConfig::default(),
            InlineBackend::unavailable(ExecutionContext::LowLatency),
        );
        h.router.start().await;
        assert!(!h.router.low_latency_available());

        let out = h.router.dispatch("p2p_status", &ok_tool(), json!("x")).await.unwrap();
        assert_eq!(out["args"], "x");
        assert_eq!(h.low_latency.execution_count(), 0);
        assert_eq!(h.general.execution_count(), 1);

        // Metrics are attributed to the resolved context
        let snapshot = h.router.metrics_snapshot();
        assert_eq!(snapshot[&ExecutionContext::LowLatency].request_count, 1);
        assert_eq!(snapshot[&ExecutionContext::General].request_count, 0);
    }

    #[tokio::test]
    async fn test_low_latency_disabled_by_config() {
        let h = harness_with(
            RouterConfig::default().with_low_latency(false),
            InlineBackend::new(ExecutionContext::LowLatency),
        );
        h.router.start().await;
        assert!(!h.router.low_latency_available());
        assert!(!h.low_latency.is_open());

        h.router.dispatch("p2p_status", &ok_tool(), Value::Null).await.unwrap();
        assert_eq!(h.general.execution_count(), 1);
    }

    #[tokio::test]
    async fn test_tool_failure_is_wrapped_and_counted() {
        let h = harness();
        h.router.start().await;

        let failing = ToolFn::from_async(|_| async { Err(std::io::Error::other("socket closed").into()) });
        let err = h.router.dispatch("p2p_send", &failing, Value::Null).await.unwrap_err();

        match &err {
            ToolgateError::ExecutionFailed { tool, context, source } => {
                assert_eq!(tool, "p2p_send");
                assert_eq!(*context, ExecutionContext::LowLatency);
                assert!(source.downcast_ref::<std::io::Error>().is_some());
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // No fallback on tool failure
        assert_eq!(h.general.execution_count(), 0);

        let snapshot = h.router.metrics_snapshot();
        assert_eq!(snapshot[&ExecutionContext::LowLatency].request_count, 1);
        assert_eq!(snapshot[&ExecutionContext::LowLatency].error_count, 1);
        assert_eq!(snapshot[&ExecutionContext::General].error_count, 0);
    }

    #[tokio::test]
    async fn test_panicking_tool_is_counted_on_both_contexts() {
        let h = harness();
        h.router.start().await;
        let panicking = ToolFn::from_async(|_| async { panic!("boom") });

        for (name, context) in [
            ("convert_pdf", ExecutionContext::General),
            ("p2p_status", ExecutionContext::LowLatency),
        ] {
            let err = h.router.dispatch(name, &panicking, Value::Null).await.unwrap_err();
            match &err {
                ToolgateError::ExecutionFailed { context: failed_on, source, .. } => {
                    assert_eq!(*failed_on, context);
                    assert_eq!(source.downcast_ref::<ToolPanicked>().unwrap().message, "boom");
                }
                other => panic!("unexpected error: {:?}", other),
            }

            let snapshot = &h.router.metrics_snapshot()[&context];
            assert_eq!(snapshot.request_count, 1);
            assert_eq!(snapshot.error_count, 1);
        }
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let h = harness_with(
            RouterConfig::default().with_metrics(false),
            InlineBackend::new(ExecutionContext::LowLatency),
        );
        h.router.start().await;
        h.router.dispatch("convert_pdf", &ok_tool(), Value::Null).await.unwrap();
        assert_eq!(h.router.aggregate_stats().total_requests, 0);
    }

    #[tokio::test]
    async fn test_aggregate_stats_and_reset() {
        let h = harness();
        h.router.start().await;

        for _ in 0..10 {
            h.router.dispatch("convert_pdf", &ok_tool(), Value::Null).await.unwrap();
        }
        for _ in 0..9 {
            h.router.dispatch("p2p_status", &ok_tool(), Value::Null).await.unwrap();
        }

        let stats = h.router.aggregate_stats();
        assert_eq!(stats.total_requests, 19);
        assert_eq!(stats.total_errors, 0);
        assert!(stats.latency_improvement.is_insufficient());
        assert!(stats.uptime_seconds.is_some());

        h.router.dispatch("p2p_status", &ok_tool(), Value::Null).await.unwrap();
        let stats = h.router.aggregate_stats();
        assert!(stats.latency_improvement.percent().unwrap().is_finite());

        h.router.reset_metrics();
        let stats = h.router.aggregate_stats();
        assert_eq!(stats.total_requests, 0);
        assert!(stats.latency_improvement.is_insufficient());
        // Reset leaves the cache alone
        assert_eq!(h.router.cached_tool_count(), 2);
    }

    #[test]
    fn test_registry_statistics() {
        let h = harness();
        h.router
            .register_metadata(ToolMetadata::new("a", ExecutionContext::General).unwrap());
        let stats = h.router.registry_statistics();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.by_context[&ExecutionContext::General], 1);
    }

    #[test]
    fn test_external_registry_is_shared() {
        let registry = MetadataRegistry::shared();
        let router = Router::builder().registry(registry.clone()).build().unwrap();
        registry.register(ToolMetadata::new("shared_tool", ExecutionContext::LowLatency).unwrap());
        assert_eq!(router.get_execution_context("shared_tool"), Some(ExecutionContext::LowLatency));
    }
}
