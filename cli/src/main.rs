// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # autoflow CLI
//!
//! The `autoflow` binary validates and runs workflow manifests locally with
//! the embedded engine.
//!
//! ## Commands
//!
//! - `autoflow config show|validate` - Configuration management
//! - `autoflow workflow validate|run` - Workflow manifests
//! - `autoflow conflict resolve` - Run a conflict resolver over a JSON document

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use autoflow::commands::{self, ConfigCommand, ConflictCommand, WorkflowCommand};
use autoflow_core::domain::engine_config::EngineConfig;

/// autoflow - Self-healing workflow execution
#[derive(Parser)]
#[command(name = "autoflow")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "AUTOFLOW_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true, env = "AUTOFLOW_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Workflow manifests
    #[command(name = "workflow")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Conflict resolution
    #[command(name = "conflict")]
    Conflict {
        #[command(subcommand)]
        command: ConflictCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A broken config file must not prevent `config validate` from reporting it.
    let config = EngineConfig::load_or_default(cli.config.clone()).unwrap_or_default();
    let observability = &config.spec.observability;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(observability.logging.level.as_str());
    init_logging(level, &observability.logging.format)?;

    if observability.metrics.enabled {
        init_metrics(observability.metrics.port)?;
    }

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Workflow { command }) => {
            commands::workflow::handle_command(command, cli.config).await
        }
        Some(Commands::Conflict { command }) => commands::conflict::handle_command(command).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

/// Install the Prometheus recorder and its scrape endpoint
fn init_metrics(port: u16) -> Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!(port, "Prometheus exporter listening");
    Ok(())
}
