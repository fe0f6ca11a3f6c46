//! Tool metadata and execution context classification
//!
//! Describes each tool's execution requirements so the router can pick a context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, ToolgateError};

/// Highest allowed tool priority
pub const MAX_PRIORITY: i64 = 10;

/// Execution context determines where a tool body runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionContext {
    /// General worker-pool-backed runtime
    General,
    /// Single-threaded cooperative runtime, no thread hand-off
    LowLatency,
    /// Let the router decide
    #[default]
    Auto,
}

impl ExecutionContext {
    /// The two contexts a tool can actually run on
    pub const CONCRETE: [ExecutionContext; 2] = [Self::General, Self::LowLatency];

    /// True for `General` and `LowLatency`
    pub fn is_concrete(&self) -> bool {
        !matches!(self, Self::Auto)
    }

    /// Return self if concrete, otherwise an `InvalidContext` error
    pub fn require_concrete(self) -> Result<Self> {
        if self.is_concrete() {
            Ok(self)
        } else {
            Err(ToolgateError::InvalidContext(format!(
                "'{}' is not a concrete execution context (expected general or low-latency)",
                self
            )))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::LowLatency => "low-latency",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionContext {
    type Err = ToolgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "general" => Ok(Self::General),
            "low-latency" | "low_latency" | "lowlatency" => Ok(Self::LowLatency),
            "auto" => Ok(Self::Auto),
            other => Err(ToolgateError::InvalidContext(format!("unknown execution context '{}'", other))),
        }
    }
}

/// Retry policy a higher layer may apply; descriptive only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryPolicy {
    #[default]
    None,
    Fixed,
    Exponential,
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
        };
        f.write_str(s)
    }
}

impl FromStr for RetryPolicy {
    type Err = ToolgateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(ToolgateError::InvalidMetadata(format!("unknown retry policy '{}'", other))),
        }
    }
}

/// Unvalidated field set, the shape of a catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawToolMetadata {
    name: String,
    #[serde(default)]
    execution_context: String,
    #[serde(default)]
    requires_low_latency_context: bool,
    #[serde(default = "default_category")]
    category: String,
    #[serde(default = "default_priority")]
    priority: i64,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: f64,
    #[serde(default)]
    retry_policy: String,
    #[serde(default)]
    memory_intensive: bool,
    #[serde(default)]
    cpu_intensive: bool,
    #[serde(default)]
    io_intensive: bool,
    #[serde(default)]
    schema: Option<Value>,
    #[serde(default)]
    description: Option<String>,
}

fn default_category() -> String {
    "general".to_string()
}

fn default_priority() -> i64 {
    5
}

fn default_timeout_seconds() -> f64 {
    30.0
}

impl RawToolMetadata {
    fn new(name: String) -> Self {
        Self {
            name,
            execution_context: String::new(),
            requires_low_latency_context: false,
            category: default_category(),
            priority: default_priority(),
            timeout_seconds: default_timeout_seconds(),
            retry_policy: String::new(),
            memory_intensive: false,
            cpu_intensive: false,
            io_intensive: false,
            schema: None,
            description: None,
        }
    }
}

/// Immutable record of one tool's execution requirements
///
/// Only obtainable through [`ToolMetadataBuilder::build`] or validated
/// deserialization, so every instance satisfies the range invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawToolMetadata")]
pub struct ToolMetadata {
    name: String,
    execution_context: ExecutionContext,
    requires_low_latency_context: bool,
    category: String,
    priority: u8,
    timeout_seconds: f64,
    retry_policy: RetryPolicy,
    memory_intensive: bool,
    cpu_intensive: bool,
    io_intensive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

impl TryFrom<RawToolMetadata> for ToolMetadata {
    type Error = ToolgateError;

    fn try_from(raw: RawToolMetadata) -> Result<Self> {
        if raw.name.trim().is_empty() {
            return Err(ToolgateError::InvalidMetadata("tool name must not be empty".to_string()));
        }

        let execution_context = if raw.execution_context.is_empty() {
            ExecutionContext::Auto
        } else {
            raw.execution_context.parse::<ExecutionContext>().map_err(|e: ToolgateError| {
                ToolgateError::InvalidMetadata(format!("tool '{}': {}", raw.name, e))
            })?
        };

        if !(0..=MAX_PRIORITY).contains(&raw.priority) {
            return Err(ToolgateError::InvalidMetadata(format!(
                "tool '{}': priority {} out of range 0..={}",
                raw.name, raw.priority, MAX_PRIORITY
            )));
        }

        if !raw.timeout_seconds.is_finite() || raw.timeout_seconds < 0.0 {
            return Err(ToolgateError::InvalidMetadata(format!(
                "tool '{}': timeout_seconds must be a finite value >= 0, got {}",
                raw.name, raw.timeout_seconds
            )));
        }

        let retry_policy = if raw.retry_policy.is_empty() {
            RetryPolicy::None
        } else {
            raw.retry_policy.parse::<RetryPolicy>().map_err(|e: ToolgateError| {
                ToolgateError::InvalidMetadata(format!("tool '{}': {}", raw.name, e))
            })?
        };

        Ok(Self {
            name: raw.name,
            execution_context,
            requires_low_latency_context: raw.requires_low_latency_context,
            category: raw.category,
            priority: raw.priority as u8,
            timeout_seconds: raw.timeout_seconds,
            retry_policy,
            memory_intensive: raw.memory_intensive,
            cpu_intensive: raw.cpu_intensive,
            io_intensive: raw.io_intensive,
            schema: raw.schema,
            description: raw.description,
        })
    }
}

impl ToolMetadata {
    /// Start building metadata for the named tool
    pub fn builder(name: impl Into<String>) -> ToolMetadataBuilder {
        ToolMetadataBuilder {
            raw: RawToolMetadata::new(name.into()),
        }
    }

    /// Shorthand for a tool pinned to one context with default fields
    pub fn new(name: impl Into<String>, context: ExecutionContext) -> Result<Self> {
        Self::builder(name).execution_context(context).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execution_context(&self) -> ExecutionContext {
        self.execution_context
    }

    pub fn requires_low_latency_context(&self) -> bool {
        self.requires_low_latency_context
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    /// Descriptive timeout for consumers; not enforced by the router
    pub fn timeout_seconds(&self) -> f64 {
        self.timeout_seconds
    }

    /// Descriptive retry policy for consumers; not applied by the router
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }

    pub fn memory_intensive(&self) -> bool {
        self.memory_intensive
    }

    pub fn cpu_intensive(&self) -> bool {
        self.cpu_intensive
    }

    pub fn io_intensive(&self) -> bool {
        self.io_intensive
    }

    pub fn schema(&self) -> Option<&Value> {
        self.schema.as_ref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Builder for [`ToolMetadata`]; validation happens in [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct ToolMetadataBuilder {
    raw: RawToolMetadata,
}

impl ToolMetadataBuilder {
    /// Set execution context
    pub fn execution_context(mut self, context: ExecutionContext) -> Self {
        self.raw.execution_context = context.as_str().to_string();
        self
    }

    /// Mark the tool as needing the low-latency context
    pub fn requires_low_latency_context(mut self) -> Self {
        self.raw.requires_low_latency_context = true;
        self
    }

    /// Set category
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.raw.category = category.into();
        self
    }

    /// Set priority (0..=10)
    pub fn priority(mut self, priority: i64) -> Self {
        self.raw.priority = priority;
        self
    }

    /// Set timeout in seconds
    pub fn timeout_seconds(mut self, timeout: f64) -> Self {
        self.raw.timeout_seconds = timeout;
        self
    }

    /// Set retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.raw.retry_policy = policy.to_string();
        self
    }

    /// Set retry policy by name, as read from configuration
    pub fn retry_policy_name(mut self, policy: impl Into<String>) -> Self {
        self.raw.retry_policy = policy.into();
        self
    }

    pub fn memory_intensive(mut self) -> Self {
        self.raw.memory_intensive = true;
        self
    }

    pub fn cpu_intensive(mut self) -> Self {
        self.raw.cpu_intensive = true;
        self
    }

    pub fn io_intensive(mut self) -> Self {
        self.raw.io_intensive = true;
        self
    }

    /// Set input schema
    pub fn schema(mut self, schema: Value) -> Self {
        self.raw.schema = Some(schema);
        self
    }

    /// Set description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.raw.description = Some(description.into());
        self
    }

    /// Validate and produce the metadata
    pub fn build(self) -> Result<ToolMetadata> {
        ToolMetadata::try_from(self.raw)
    }
}
