//! Execution context resolution
//!
//! Decides which context a tool should run on from, in order: registered
//! metadata, metadata the tool declares itself, a bare context hint, the
//! tool's origin module, the tool name, and finally the configured default.
//! The router's cache sits in front of all of this.

use std::fmt;

use serde::Serialize;

use crate::config::RouterConfig;
use crate::tools::{ExecutionContext, MetadataRegistry, ToolFn};

/// Which rule produced a resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionRule {
    Cache,
    Registry,
    DeclaredMetadata,
    ContextHint,
    Origin,
    NamePattern,
    Default,
}

impl fmt::Display for ResolutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cache => "cache",
            Self::Registry => "registry",
            Self::DeclaredMetadata => "declared-metadata",
            Self::ContextHint => "context-hint",
            Self::Origin => "origin",
            Self::NamePattern => "name-pattern",
            Self::Default => "default",
        };
        f.write_str(s)
    }
}

/// A resolved context and the rule that chose it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub context: ExecutionContext,
    pub rule: ResolutionRule,
}

impl Resolution {
    fn new(context: ExecutionContext, rule: ResolutionRule) -> Self {
        Self { context, rule }
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    needles
        .iter()
        .filter(|n| !n.is_empty())
        .any(|n| haystack.contains(&n.to_lowercase()))
}

/// Run every rule after the cache. Always yields a concrete context.
pub(crate) fn resolve_uncached(
    tool_name: &str,
    tool: &ToolFn,
    registry: &MetadataRegistry,
    config: &RouterConfig,
) -> Resolution {
    if let Some(meta) = registry.get(tool_name)
        && meta.execution_context().is_concrete()
    {
        return Resolution::new(meta.execution_context(), ResolutionRule::Registry);
    }

    if let Some(declaration) = tool.declaration() {
        if let Some(meta) = declaration.declared_metadata()
            && meta.execution_context().is_concrete()
        {
            return Resolution::new(meta.execution_context(), ResolutionRule::DeclaredMetadata);
        }

        if let Some(hint) = declaration.context_hint()
            && hint.is_concrete()
        {
            return Resolution::new(hint, ResolutionRule::ContextHint);
        }
    }

    if let Some(origin) = tool.origin()
        && contains_any(origin, &config.low_latency_origin_markers)
    {
        return Resolution::new(ExecutionContext::LowLatency, ResolutionRule::Origin);
    }

    if contains_any(tool_name, &config.low_latency_name_patterns) {
        return Resolution::new(ExecutionContext::LowLatency, ResolutionRule::NamePattern);
    }

    Resolution::new(config.default_execution_context, ResolutionRule::Default)
}
