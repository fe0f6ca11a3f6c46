//! Metadata registry and catalog loading
//!
//! Stores tool metadata keyed by name with derived indices by execution context
//! and category. Catalogs can be loaded from YAML files.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolgateError};

use super::definition::{ExecutionContext, RawToolMetadata, ToolMetadata};

/// YAML file structure
#[derive(Debug, Deserialize)]
struct YamlCatalog {
    #[serde(default)]
    tools: Vec<RawToolMetadata>,
}

/// Aggregate view of the registry contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStatistics {
    pub total: usize,
    pub by_context: BTreeMap<ExecutionContext, usize>,
    pub by_category: BTreeMap<String, usize>,
    /// Entries flagged `requires_low_latency_context`
    pub low_latency_count: usize,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<String, Arc<ToolMetadata>>,
    by_context: HashMap<ExecutionContext, BTreeSet<String>>,
    by_category: HashMap<String, BTreeSet<String>>,
}

impl RegistryInner {
    fn index(&mut self, meta: &ToolMetadata) {
        self.by_context
            .entry(meta.execution_context())
            .or_default()
            .insert(meta.name().to_string());
        self.by_category
            .entry(meta.category().to_string())
            .or_default()
            .insert(meta.name().to_string());
    }

    fn unindex(&mut self, meta: &ToolMetadata) {
        if let Some(names) = self.by_context.get_mut(&meta.execution_context()) {
            names.remove(meta.name());
            if names.is_empty() {
                self.by_context.remove(&meta.execution_context());
            }
        }
        if let Some(names) = self.by_category.get_mut(meta.category()) {
            names.remove(meta.name());
            if names.is_empty() {
                self.by_category.remove(meta.category());
            }
        }
    }

    fn collect(&self, names: Option<&BTreeSet<String>>) -> Vec<Arc<ToolMetadata>> {
        names
            .map(|names| names.iter().filter_map(|n| self.entries.get(n).cloned()).collect())
            .unwrap_or_default()
    }
}

/// In-memory store of tool metadata keyed by tool name
///
/// All mutation goes through one write lock so entries and indices never diverge.
#[derive(Debug, Default)]
pub struct MetadataRegistry {
    inner: RwLock<RegistryInner>,
    lookups: AtomicU64,
}

impl MetadataRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry behind an `Arc` for sharing with a router
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Load a registry from a YAML catalog file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ToolgateError::Catalog(format!("Failed to read catalog file {}: {}", path.as_ref().display(), e))
        })?;
        Self::from_yaml(&content)
    }

    /// Load a registry from a YAML catalog string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let registry = Self::new();
        registry.load_yaml(content)?;
        Ok(registry)
    }

    /// Register every entry of a YAML catalog, returning how many were loaded
    ///
    /// All entries are validated before any is registered.
    pub fn load_yaml(&self, content: &str) -> Result<usize> {
        let catalog: YamlCatalog = serde_yaml::from_str(content)
            .map_err(|e| ToolgateError::Catalog(format!("Failed to parse YAML catalog: {}", e)))?;

        let tools = catalog
            .tools
            .into_iter()
            .map(ToolMetadata::try_from)
            .collect::<Result<Vec<_>>>()?;

        let count = tools.len();
        for meta in tools {
            self.register(meta);
        }
        Ok(count)
    }

    fn read(&self) -> RwLockReadGuard<'_, RegistryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RegistryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or overwrite metadata by name
    pub fn register(&self, meta: ToolMetadata) {
        let mut inner = self.write();

        if let Some(previous) = inner.entries.remove(meta.name()) {
            if previous.execution_context() != meta.execution_context() {
                tracing::warn!(
                    tool = meta.name(),
                    previous = %previous.execution_context(),
                    new = %meta.execution_context(),
                    "Re-registering tool with a different execution context"
                );
            }
            inner.unindex(&previous);
        }

        inner.index(&meta);
        inner.entries.insert(meta.name().to_string(), Arc::new(meta));
    }

    /// Get metadata for a tool
    pub fn get(&self, name: &str) -> Option<Arc<ToolMetadata>> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.read().entries.get(name).cloned()
    }

    /// Number of `get` calls served so far
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Check if a tool is registered
    pub fn contains(&self, name: &str) -> bool {
        self.read().entries.contains_key(name)
    }

    /// Remove a tool, returning its metadata
    pub fn remove(&self, name: &str) -> Option<Arc<ToolMetadata>> {
        let mut inner = self.write();
        let removed = inner.entries.remove(name)?;
        inner.unindex(&removed);
        Some(removed)
    }

    /// Tools declaring the given execution context, sorted by name
    pub fn list_by_context(&self, context: ExecutionContext) -> Vec<Arc<ToolMetadata>> {
        let inner = self.read();
        inner.collect(inner.by_context.get(&context))
    }

    /// Tools in the given category, sorted by name
    pub fn list_by_category(&self, category: &str) -> Vec<Arc<ToolMetadata>> {
        let inner = self.read();
        inner.collect(inner.by_category.get(category))
    }

    /// All tools, sorted by name
    pub fn list_all(&self) -> Vec<Arc<ToolMetadata>> {
        let mut all: Vec<_> = self.read().entries.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    /// Get number of tools
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Aggregate counts by context and category
    pub fn statistics(&self) -> RegistryStatistics {
        let inner = self.read();

        RegistryStatistics {
            total: inner.entries.len(),
            by_context: inner
                .by_context
                .iter()
                .map(|(ctx, names)| (*ctx, names.len()))
                .collect(),
            by_category: inner
                .by_category
                .iter()
                .map(|(cat, names)| (cat.clone(), names.len()))
                .collect(),
            low_latency_count: inner
                .entries
                .values()
                .filter(|m| m.requires_low_latency_context())
                .count(),
        }
    }

    /// Remove every entry and index
    pub fn clear(&self) {
        let mut inner = self.write();
        inner.entries.clear();
        inner.by_context.clear();
        inner.by_category.clear();
    }
}
