//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - stats: registry statistics for a catalog
//! - resolve: resolved execution context per tool name
//! - smoke: dispatch no-op calls and report metrics

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Toolgate - execution context router for tool calls
#[derive(Parser, Debug)]
#[command(name = "toolgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print registry statistics for a metadata catalog as JSON
    Stats {
        /// Catalog file (falls back to the configured catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Print the execution context each tool name resolves to
    Resolve {
        /// Catalog file (falls back to the configured catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Tool names to resolve
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Dispatch no-op calls across the catalog's tools and print metrics
    Smoke {
        /// Catalog file (falls back to the configured catalog)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Number of calls to dispatch
        #[arg(short = 'n', long, default_value_t = 100)]
        calls: usize,
    },
}

impl Commands {
    /// Catalog path given on the command line, if any
    pub fn catalog(&self) -> Option<&PathBuf> {
        match self {
            Commands::Stats { catalog } | Commands::Resolve { catalog, .. } | Commands::Smoke { catalog, .. } => {
                catalog.as_ref()
            }
        }
    }
}
