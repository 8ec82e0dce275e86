// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow command implementations
//!
//! # Commands
//!
//! - `autoflow workflow validate <file>` - Parse and validate a workflow manifest
//! - `autoflow workflow run <file>` - Execute a workflow manifest with the embedded engine

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use autoflow_core::application::WorkflowEngine;
use autoflow_core::domain::engine_config::EngineConfig;
use autoflow_core::domain::events::WorkflowEvent;
use autoflow_core::domain::execution::WorkflowExecution;
use autoflow_core::domain::unit_of_work::ExecutionContext;
use autoflow_core::infrastructure::{
    EventBus, InMemoryExecutionRepository, TracingMetricsSink, WorkflowParser,
};

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Validate a workflow manifest file
    Validate {
        /// Path to workflow manifest YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Execute a workflow manifest
    Run {
        /// Path to workflow manifest YAML file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Initial context (JSON object), merged over `spec.context`
        #[arg(long, short = 'i', value_name = "JSON")]
        input: Option<String>,

        /// Print the final execution record as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: WorkflowCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_validated_config(config_path)?;

    match command {
        WorkflowCommand::Validate { file } => validate_workflow(&file, &config),
        WorkflowCommand::Run { file, input, json } => {
            run_workflow(&file, input.as_deref(), json, &config).await
        }
    }
}

fn load_validated_config(config_path: Option<PathBuf>) -> Result<EngineConfig> {
    let config =
        EngineConfig::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    Ok(config)
}

// ============================================================================
// Command Implementations
// ============================================================================

fn validate_workflow(file: &Path, config: &EngineConfig) -> Result<()> {
    println!("{}", "Validating workflow manifest...".cyan());
    println!("   File: {}", file.display());
    println!();

    let parsed = WorkflowParser::parse_file(file, &config.spec.engine)
        .context("Failed to parse workflow manifest")?;

    println!("{}", "✓ Workflow is valid!".green().bold());
    println!();
    println!("Workflow Details:");
    println!("  Name:        {}", parsed.workflow.id);
    if let Some(description) = &parsed.description {
        println!("  Description: {}", description);
    }
    println!("  Steps:       {}", parsed.workflow.steps().len());
    for step in parsed.workflow.steps() {
        let deps = if step.dependencies.is_empty() {
            String::new()
        } else {
            format!(" <- {}", step.dependencies.join(", "))
        };
        let flag = if step.critical { "" } else { " (optional)" };
        println!("    - {}{}{}", step.id, flag.dimmed(), deps);
    }

    Ok(())
}

async fn run_workflow(
    file: &Path,
    input: Option<&str>,
    as_json: bool,
    config: &EngineConfig,
) -> Result<()> {
    let parsed = WorkflowParser::parse_file(file, &config.spec.engine)
        .context("Failed to parse workflow manifest")?;

    let mut context = parsed.context;
    if let Some(raw) = input {
        context.extend(parse_input(raw)?);
    }

    let event_bus = EventBus::with_default_capacity();
    let mut events = event_bus.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    });

    let engine = WorkflowEngine::from_config(config)
        .with_event_bus(event_bus)
        .with_metrics_sink(Arc::new(TracingMetricsSink::new()))
        .with_repository(Arc::new(InMemoryExecutionRepository::new()));

    let workflow_id = parsed.workflow.id.clone();
    engine
        .register_workflow(workflow_id.clone(), parsed.workflow.into_steps())
        .await
        .context("Failed to register workflow")?;

    println!("{} {}", "Running workflow".cyan(), workflow_id.to_string().bold());
    let execution = engine.execute(workflow_id, context).await;

    // Dropping the engine closes the event stream.
    drop(engine);
    let _ = printer.await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        print_summary(&execution);
    }

    if !execution.success {
        anyhow::bail!("Workflow execution {} ended with status {}", execution.id, execution.status);
    }
    Ok(())
}

fn parse_input(raw: &str) -> Result<ExecutionContext> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("--input must be valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map.into_iter().collect()),
        _ => anyhow::bail!("--input must be a JSON object"),
    }
}

fn print_event(event: &WorkflowEvent) {
    match event {
        WorkflowEvent::StepCompleted { step_id, attempts, .. } => {
            println!("  {} {} (attempts: {})", "✓".green(), step_id, attempts);
        }
        WorkflowEvent::StepFailed {
            step_id,
            failure_kind,
            error,
            critical,
            ..
        } => {
            let label = if *critical { "✗".red() } else { "!".yellow() };
            println!("  {} {} [{}] {}", label, step_id, failure_kind, error.dimmed());
        }
        WorkflowEvent::HealingAttempted {
            step_id,
            action,
            success,
            ..
        } => {
            let outcome = if *success { "ok".green() } else { "failed".red() };
            println!("  {} healing {} via {}: {}", "~".cyan(), step_id, action, outcome);
        }
        WorkflowEvent::ExecutionStarted { .. } | WorkflowEvent::ExecutionFinished { .. } => {}
    }
}

fn print_summary(execution: &WorkflowExecution) {
    println!();
    let status = if execution.success {
        execution.status.to_string().green().bold()
    } else {
        execution.status.to_string().red().bold()
    };
    println!("Execution {}: {}", execution.id, status);
    println!("  Completed: {}", execution.steps_completed.join(", "));
    if !execution.steps_failed.is_empty() {
        println!("  Failed:    {}", execution.steps_failed.join(", "));
    }
    if !execution.healing_actions.is_empty() {
        println!("  Healing:   {} attempt(s)", execution.healing_actions.len());
    }
    if let Some(duration_ms) = execution.metrics.get("duration_ms") {
        println!("  Duration:  {:.0}ms", duration_ms);
    }
    for error in &execution.error_log {
        println!("  {} {}", "error:".red(), error);
    }
}
