//! Tool System - metadata definitions, registry, and callable bodies

mod callable;
mod catalog;
mod definition;

pub use callable::{AsyncBody, BlockingBody, DeclaresExecutionContext, ToolBody, ToolFn, ToolPanicked, ToolResult};
pub use catalog::{MetadataRegistry, RegistryStatistics};
pub use definition::{ExecutionContext, MAX_PRIORITY, RetryPolicy, ToolMetadata, ToolMetadataBuilder};
