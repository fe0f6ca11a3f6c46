//! Toolgate - routes tool calls to a general or low-latency execution context
//!
//! Every call is resolved to a context (registered metadata, declarations on
//! the tool itself, origin and name heuristics, then a configured default),
//! executed there, and measured. When the low-latency context cannot be used,
//! its tools run on the general context instead.

pub mod config;
pub mod error;
pub mod router;
pub mod runtime;
pub mod tools;

pub use error::{BoxError, Result, ToolgateError};
pub use router::{AggregateStats, LatencyImprovement, Router, RouterBuilder};
pub use tools::{ExecutionContext, MetadataRegistry, ToolFn, ToolMetadata};
