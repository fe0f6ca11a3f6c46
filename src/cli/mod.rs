//! CLI module for toolgate - command-line interface and subcommands.
//!
//! Provides subcommands to inspect a metadata catalog, resolve tool names,
//! and run a smoke dispatch against both execution contexts.

pub mod commands;

pub use commands::Cli;
