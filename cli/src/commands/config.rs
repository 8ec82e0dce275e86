// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use autoflow_core::domain::engine_config::EngineConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = EngineConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  --config flag: {}", path.display()),
            None => println!("  --config flag: {}", "(not set)".dimmed()),
        }
        for (i, path) in EngineConfig::search_paths().iter().enumerate() {
            let marker = if path.exists() { "found".green() } else { "missing".dimmed() };
            println!("  {}. {} ({})", i + 1, path.display(), marker);
        }
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let engine = &config.spec.engine;
    println!("{}", "Engine:".bold());
    println!("  Default step timeout: {:?}", engine.default_step_timeout);
    println!("  Default max retries:  {}", engine.default_max_retries);
    println!("  Backoff unit:         {:?}", engine.backoff_unit);
    println!("  Remediation delay:    {:?}", engine.remediation_delay);
    println!("  History limit:        {}", engine.history_limit);
    println!(
        "  Health gate:          {} (enforce: {}, threshold: {})",
        if engine.health_gate.enabled { "enabled" } else { "disabled" },
        engine.health_gate.enforce,
        engine.health_gate.threshold
    );
    println!();

    let bus = &config.spec.bus;
    println!("{}", "Message Bus:".bold());
    println!("  Message TTL:   {}s", bus.default_ttl_seconds);
    println!("  Context TTL:   {}s", bus.context_ttl_seconds);
    println!("  Poll interval: {:?}", bus.poll_interval);
    println!("  Default scope: {}", bus.default_scope);
    let mut resources: Vec<_> = bus.resources.iter().collect();
    resources.sort_by(|a, b| a.0.cmp(b.0));
    for (name, amount) in resources {
        println!("    - {} = {}", name, amount);
    }
    println!();

    println!("{}", "Alerting:".bold());
    println!(
        "  Webhook: {}",
        config.spec.alerting.webhook_url.as_deref().unwrap_or("(none)")
    );

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config =
        EngineConfig::load_or_default(config_path).context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}
