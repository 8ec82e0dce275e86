// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Conflict resolution commands
//!
//! `autoflow conflict resolve --type budget requests.json` runs the same
//! resolver the message bus uses for a `ConflictAlert` and prints the decision.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use autoflow_swarm::domain::conflict::{resolver_for, ConflictType};

#[derive(Subcommand)]
pub enum ConflictCommand {
    /// Resolve a conflict described by a JSON document
    Resolve {
        /// Conflict type (budget, timeline, resource, strategy)
        #[arg(long = "type", short = 't', value_name = "TYPE")]
        conflict_type: String,

        /// Path to the JSON request document
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: ConflictCommand) -> Result<()> {
    match command {
        ConflictCommand::Resolve {
            conflict_type,
            file,
        } => resolve(&conflict_type, &file),
    }
}

fn resolve(conflict_type: &str, file: &Path) -> Result<()> {
    let conflict_type: ConflictType = conflict_type.parse()?;

    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let payload: serde_json::Value =
        serde_json::from_str(&raw).context("Conflict document must be valid JSON")?;

    let resolution = resolver_for(conflict_type)
        .resolve(&payload)
        .with_context(|| format!("Failed to resolve {} conflict", conflict_type))?;

    eprintln!(
        "{}",
        format!("✓ Resolved {} conflict", conflict_type).green()
    );
    println!("{}", serde_json::to_string_pretty(&resolution)?);

    Ok(())
}
