use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::Commands;
use toolgate::config::Config;
use toolgate::{ExecutionContext, MetadataRegistry, Router, ToolFn};

fn setup_logging() -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("toolgate")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("toolgate.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Apply the configured log level unless RUST_LOG already decided it
fn apply_log_level(config: &Config) {
    if std::env::var_os("RUST_LOG").is_some() {
        return;
    }
    if let Some(level) = config.log_level.as_deref().and_then(|l| l.parse::<log::LevelFilter>().ok()) {
        log::set_max_level(level);
    }
}

fn load_registry(catalog: Option<&PathBuf>, config: &Config) -> Result<Arc<MetadataRegistry>> {
    match catalog.or(config.catalog.as_ref()) {
        Some(path) => {
            let registry = MetadataRegistry::from_file(path)
                .context(format!("Failed to load catalog from {}", path.display()))?;
            info!("Loaded {} tools from {}", registry.len(), path.display());
            Ok(Arc::new(registry))
        }
        None => {
            info!("No catalog given, starting with an empty registry");
            Ok(MetadataRegistry::shared())
        }
    }
}

fn build_router(registry: Arc<MetadataRegistry>, config: &Config) -> Result<Router> {
    Router::builder()
        .config(config.router.clone())
        .registry(registry)
        .build()
        .context("Failed to build router")
}

fn noop_tool(blocking: bool) -> ToolFn {
    if blocking {
        ToolFn::from_blocking(|_| Ok(Value::Null))
    } else {
        ToolFn::from_async(|_| async { Ok(Value::Null) })
    }
}

fn paint_context(context: ExecutionContext) -> ColoredString {
    match context {
        ExecutionContext::LowLatency => context.to_string().cyan(),
        ExecutionContext::General => context.to_string().green(),
        ExecutionContext::Auto => context.to_string().yellow(),
    }
}

fn handle_stats_command(catalog: Option<&PathBuf>, config: &Config) -> Result<()> {
    let registry = load_registry(catalog, config)?;
    let stats = registry.statistics();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

async fn handle_resolve_command(catalog: Option<&PathBuf>, names: &[String], config: &Config) -> Result<()> {
    let registry = load_registry(catalog, config)?;
    let router = build_router(registry, config)?;
    router.start().await;

    let tool = noop_tool(false);
    for name in names {
        let resolution = router.resolve_explained(name, &tool);
        println!(
            "{} {} {}",
            name.bold(),
            paint_context(resolution.context),
            format!("({})", resolution.rule).dimmed()
        );
    }

    if !router.low_latency_available() {
        println!(
            "{}",
            "Low-latency context unavailable: its tools would run on the general context".yellow()
        );
    }

    router.stop().await;
    Ok(())
}

async fn handle_smoke_command(catalog: Option<&PathBuf>, calls: usize, config: &Config) -> Result<()> {
    let registry = load_registry(catalog, config)?;

    // Without a catalog, exercise one tool per context via the name heuristics
    let mut targets: Vec<(String, bool)> = registry
        .list_all()
        .iter()
        .map(|meta| (meta.name().to_string(), meta.cpu_intensive()))
        .collect();
    if targets.is_empty() {
        targets = vec![("smoke_convert".to_string(), true), ("p2p_smoke".to_string(), false)];
    }

    let router = build_router(registry, config)?;
    router.start().await;
    println!("{} {} calls over {} tools", "Dispatching:".green(), calls, targets.len());

    let mut failures = 0usize;
    for i in 0..calls {
        let (name, blocking) = &targets[i % targets.len()];
        if let Err(e) = router.dispatch(name, &noop_tool(*blocking), Value::Null).await {
            log::warn!("Smoke dispatch of {} failed: {}", name, e);
            failures += 1;
        }
    }

    let report = serde_json::json!({
        "metricsSnapshot": router.metrics_snapshot(),
        "aggregateStats": router.aggregate_stats(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    router.stop().await;

    if failures > 0 {
        eyre::bail!("{} of {} smoke dispatches failed", failures, calls);
    }
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Stats { catalog } => handle_stats_command(catalog.as_ref(), config),
        Commands::Resolve { catalog, names } => handle_resolve_command(catalog.as_ref(), names, config).await,
        Commands::Smoke { catalog, calls } => handle_smoke_command(catalog.as_ref(), *calls, config).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging first
    setup_logging().context("Failed to setup logging")?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    apply_log_level(&config);

    info!("Starting with config from: {:?}", cli.config);
    if let Some(catalog) = cli.command.catalog() {
        info!("Catalog override: {}", catalog.display());
    }

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
