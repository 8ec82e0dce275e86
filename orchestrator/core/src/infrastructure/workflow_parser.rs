// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow YAML Parser
//!
//! This module provides infrastructure for parsing workflow YAML manifests
//! into domain objects.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//! - **Anti-Corruption:** Translates YAML schema to domain model
//!
//! # Manifest Format
//!
//! ```yaml
//! apiVersion: autoflow.dev/v1
//! kind: Workflow
//! metadata:
//!   name: nightly-report
//! spec:
//!   context:
//!     region: eu
//!   steps:
//!     - id: extract
//!       command: ./extract.sh
//!       timeout: 2m
//!     - id: publish
//!       command: ./publish.sh
//!       dependencies: [extract]
//!       critical: false
//! ```
//!
//! Steps run in the listed order. Missing `timeout` / `max_retries` fall back
//! to the engine defaults.

use crate::domain::engine_config::{EngineSettings, API_VERSION};
use crate::domain::unit_of_work::ExecutionContext;
use crate::domain::workflow::{Workflow, WorkflowStep};
use crate::infrastructure::command_unit::ShellCommandUnit;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const WORKFLOW_KIND: &str = "Workflow";

// ============================================================================
// YAML Schema (External Representation)
// ============================================================================

/// External YAML representation of a workflow manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: WorkflowMetadataYaml,
    pub spec: WorkflowSpecYaml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetadataYaml {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpecYaml {
    /// Initial execution context, overridable by the caller
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub steps: Vec<WorkflowStepYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStepYaml {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub command: String,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "default_critical")]
    pub critical: bool,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub workdir: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_critical() -> bool {
    true
}

/// Validated workflow plus its default context
#[derive(Debug, Clone)]
pub struct ParsedWorkflow {
    pub workflow: Workflow,
    pub context: ExecutionContext,
    pub description: Option<String>,
}

// ============================================================================
// Parser
// ============================================================================

/// Workflow parser (Infrastructure service)
pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow manifest from YAML file
    pub fn parse_file<P: AsRef<Path>>(
        path: P,
        defaults: &EngineSettings,
    ) -> Result<ParsedWorkflow, WorkflowParseError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| WorkflowParseError::IoError {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse_yaml(&content, defaults)
    }

    /// Parse a workflow manifest from YAML string
    pub fn parse_yaml(
        yaml: &str,
        defaults: &EngineSettings,
    ) -> Result<ParsedWorkflow, WorkflowParseError> {
        let manifest: WorkflowManifest =
            serde_yaml::from_str(yaml).map_err(|e| WorkflowParseError::YamlError(e.to_string()))?;

        Self::validate_and_convert(manifest, defaults)
    }

    /// Validate manifest and convert to domain object
    fn validate_and_convert(
        manifest: WorkflowManifest,
        defaults: &EngineSettings,
    ) -> Result<ParsedWorkflow, WorkflowParseError> {
        if manifest.api_version != API_VERSION {
            return Err(WorkflowParseError::InvalidApiVersion {
                expected: API_VERSION.to_string(),
                got: manifest.api_version,
            });
        }

        if manifest.kind != WORKFLOW_KIND {
            return Err(WorkflowParseError::InvalidKind {
                expected: WORKFLOW_KIND.to_string(),
                got: manifest.kind,
            });
        }

        if manifest.metadata.name.trim().is_empty() {
            return Err(WorkflowParseError::ValidationError(
                "metadata.name cannot be empty".to_string(),
            ));
        }

        let steps = manifest
            .spec
            .steps
            .into_iter()
            .map(|s| Self::convert_step(s, defaults))
            .collect::<Result<Vec<_>, _>>()?;

        let workflow = Workflow::new(manifest.metadata.name, steps)
            .map_err(|e| WorkflowParseError::ValidationError(e.to_string()))?;

        Ok(ParsedWorkflow {
            workflow,
            context: manifest.spec.context,
            description: manifest.metadata.description,
        })
    }

    fn convert_step(
        yaml: WorkflowStepYaml,
        defaults: &EngineSettings,
    ) -> Result<WorkflowStep, WorkflowParseError> {
        if yaml.command.trim().is_empty() {
            return Err(WorkflowParseError::ValidationError(format!(
                "step '{}' has an empty command",
                yaml.id
            )));
        }

        let mut unit = ShellCommandUnit::new(yaml.command).with_env(yaml.env);
        if let Some(dir) = yaml.workdir {
            unit = unit.with_workdir(dir);
        }

        let mut step = WorkflowStep::new(yaml.id, Arc::new(unit))
            .with_timeout(yaml.timeout.unwrap_or(defaults.default_step_timeout))
            .with_max_retries(yaml.max_retries.unwrap_or(defaults.default_max_retries))
            .with_dependencies(yaml.dependencies)
            .critical(yaml.critical);
        if let Some(name) = yaml.name {
            step = step.with_name(name);
        }
        step.metadata = yaml.metadata;
        Ok(step)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowParseError {
    #[error("IO error reading {path}: {error}")]
    IoError { path: String, error: String },

    #[error("YAML parse error: {0}")]
    YamlError(String),

    #[error("Invalid API version: expected '{expected}', got '{got}'")]
    InvalidApiVersion { expected: String, got: String },

    #[error("Invalid kind: expected '{expected}', got '{got}'")]
    InvalidKind { expected: String, got: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}
