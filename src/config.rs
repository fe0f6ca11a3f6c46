use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ToolgateError;
use crate::runtime::{DEFAULT_LATENCY_WINDOW, DEFAULT_MAX_BLOCKING_WORKERS};
use crate::tools::ExecutionContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub router: RouterConfig,
    /// Metadata catalog registered at startup
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub default_execution_context: ExecutionContext,
    pub enable_metrics: bool,
    /// Reserved for future instrumentation
    pub enable_memory_tracking: bool,
    pub enable_low_latency: bool,
    pub max_blocking_workers: usize,
    /// Substrings of a tool's origin module that imply the low-latency context
    pub low_latency_origin_markers: Vec<String>,
    /// Substrings of a tool name that imply the low-latency context
    pub low_latency_name_patterns: Vec<String>,
    pub metrics_window: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_execution_context: ExecutionContext::General,
            enable_metrics: true,
            enable_memory_tracking: false,
            enable_low_latency: true,
            max_blocking_workers: DEFAULT_MAX_BLOCKING_WORKERS,
            low_latency_origin_markers: ["p2p", "workflow", "taskqueue", "low_latency"]
                .into_iter()
                .map(String::from)
                .collect(),
            low_latency_name_patterns: ["p2p_", "workflow", "task_queue", "peer", "libp2p", "mcplusplus"]
                .into_iter()
                .map(String::from)
                .collect(),
            metrics_window: DEFAULT_LATENCY_WINDOW,
        }
    }
}

impl RouterConfig {
    /// Set the context used when nothing else matches
    pub fn with_default_context(mut self, context: ExecutionContext) -> Self {
        self.default_execution_context = context;
        self
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.enable_metrics = enabled;
        self
    }

    pub fn with_low_latency(mut self, enabled: bool) -> Self {
        self.enable_low_latency = enabled;
        self
    }

    pub fn with_max_blocking_workers(mut self, workers: usize) -> Self {
        self.max_blocking_workers = workers;
        self
    }

    /// Fail fast on values the router cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        self.default_execution_context.require_concrete()?;
        if self.max_blocking_workers == 0 {
            return Err(ToolgateError::InvalidMetadata(
                "max_blocking_workers must be at least 1".to_string(),
            ));
        }
        if self.metrics_window == 0 {
            return Err(ToolgateError::InvalidMetadata("metrics_window must be at least 1".to_string()));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            router: RouterConfig::default(),
            catalog: None,
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let project_name = env!("CARGO_PKG_NAME");

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        config.router.validate().context("Invalid router configuration")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
