// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Domain Model
//!
//! This module defines the core domain entities and value objects for the Workflow Engine.
//! A workflow is an ordered list of steps, each wrapping an opaque unit of work,
//! connected by declared dependencies.
//!
//! # Architectural Context
//!
//! - **Bounded Context:** Execution Context
//! - **Aggregate Root:** Workflow
//!
//! # Design Principles
//!
//! 1. **Immutability:** Step definitions are immutable once registered
//! 2. **Caller Order:** Steps run in the order supplied; the graph is only validated, not sorted
//! 3. **Self-Validating:** [`Workflow::new`] rejects duplicate ids, unknown dependencies and cycles

use crate::domain::unit_of_work::UnitOfWork;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Caller-chosen identifier of a registered workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for WorkflowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for WorkflowId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Entity: WorkflowStep
// ============================================================================

/// One named unit of work inside a workflow.
#[derive(Clone)]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    pub unit: Arc<dyn UnitOfWork>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub dependencies: Vec<String>,
    /// An unresolved failure of a critical step aborts the whole execution.
    pub critical: bool,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, unit: Arc<dyn UnitOfWork>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            unit,
            timeout: DEFAULT_STEP_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            dependencies: Vec::new(),
            critical: true,
            metadata: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl std::fmt::Debug for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("dependencies", &self.dependencies)
            .field("critical", &self.critical)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Aggregate Root: Workflow
// ============================================================================

/// Workflow Aggregate Root
///
/// # Invariants
/// - Must have at least one step
/// - Step ids are non-empty and unique
/// - Every timeout is strictly positive
/// - Every dependency references a step of the same workflow
/// - The dependency graph is acyclic
#[derive(Debug, Clone)]
pub struct Workflow {
    pub id: WorkflowId,
    steps: Vec<WorkflowStep>,
}

impl Workflow {
    /// Create a new Workflow with validation
    pub fn new(id: impl Into<WorkflowId>, steps: Vec<WorkflowStep>) -> Result<Self, WorkflowError> {
        let id = id.into();
        if steps.is_empty() {
            return Err(WorkflowError::NoSteps(id));
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if step.id.trim().is_empty() {
                return Err(WorkflowError::EmptyStepId);
            }
            if !seen.insert(step.id.as_str()) {
                return Err(WorkflowError::DuplicateStepId(step.id.clone()));
            }
            if step.timeout.is_zero() {
                return Err(WorkflowError::InvalidTimeout(step.id.clone()));
            }
        }

        for step in &steps {
            for dep in &step.dependencies {
                if !seen.contains(dep.as_str()) {
                    return Err(WorkflowError::UnknownDependency {
                        step: step.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let workflow = Self { id, steps };
        WorkflowValidator::check_for_cycles(&workflow)?;
        Ok(workflow)
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn get_step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn into_steps(self) -> Vec<WorkflowStep> {
        self.steps
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Workflow '{0}' must have at least one step")]
    NoSteps(WorkflowId),

    #[error("Step id cannot be empty")]
    EmptyStepId,

    #[error("Duplicate step id '{0}'")]
    DuplicateStepId(String),

    #[error("Step '{0}' must have a positive timeout")]
    InvalidTimeout(String),

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Circular dependency detected involving step '{0}'")]
    CyclicDependency(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    #[error("Dependency not met for step '{step}': missing {missing:?}")]
    DependencyNotMet { step: String, missing: Vec<String> },
}

// ============================================================================
// Domain Services
// ============================================================================

/// Domain service for workflow validation
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Reject dependency graphs containing a cycle (DFS with a recursion stack).
    pub fn check_for_cycles(workflow: &Workflow) -> Result<(), WorkflowError> {
        fn visit<'a>(
            current: &'a str,
            workflow: &'a Workflow,
            visited: &mut HashMap<&'a str, bool>,
            rec_stack: &mut HashMap<&'a str, bool>,
        ) -> Option<&'a str> {
            visited.insert(current, true);
            rec_stack.insert(current, true);

            if let Some(step) = workflow.get_step(current) {
                for dep in &step.dependencies {
                    let dep = dep.as_str();
                    if !visited.get(dep).copied().unwrap_or(false) {
                        if let Some(found) = visit(dep, workflow, visited, rec_stack) {
                            return Some(found);
                        }
                    } else if rec_stack.get(dep).copied().unwrap_or(false) {
                        return Some(dep);
                    }
                }
            }

            rec_stack.insert(current, false);
            None
        }

        let mut visited = HashMap::new();
        let mut rec_stack = HashMap::new();

        for step in workflow.steps() {
            if visited.get(step.id.as_str()).copied().unwrap_or(false) {
                continue;
            }
            if let Some(found) = visit(&step.id, workflow, &mut visited, &mut rec_stack) {
                return Err(WorkflowError::CyclicDependency(found.to_string()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::unit_of_work::unit_fn;
    use serde_json::json;

    fn noop(id: &str) -> WorkflowStep {
        WorkflowStep::new(id, unit_fn(|_| Ok(json!(null))))
    }

    #[test]
    fn test_step_defaults() {
        let step = noop("fetch");
        assert_eq!(step.name, "fetch");
        assert_eq!(step.timeout, DEFAULT_STEP_TIMEOUT);
        assert_eq!(step.max_retries, DEFAULT_MAX_RETRIES);
        assert!(step.critical);
        assert!(step.dependencies.is_empty());
    }

    #[test]
    fn test_workflow_validation_no_steps() {
        let result = Workflow::new("empty", vec![]);
        assert!(matches!(result, Err(WorkflowError::NoSteps(_))));
    }

    #[test]
    fn test_workflow_rejects_duplicate_ids() {
        let result = Workflow::new("dup", vec![noop("a"), noop("a")]);
        assert_eq!(result.unwrap_err(), WorkflowError::DuplicateStepId("a".to_string()));
    }

    #[test]
    fn test_workflow_rejects_unknown_dependency() {
        let result = Workflow::new("w", vec![noop("a").with_dependencies(["ghost"])]);
        assert!(matches!(result, Err(WorkflowError::UnknownDependency { .. })));
    }

    #[test]
    fn test_workflow_rejects_zero_timeout() {
        let result = Workflow::new("w", vec![noop("a").with_timeout(Duration::ZERO)]);
        assert_eq!(result.unwrap_err(), WorkflowError::InvalidTimeout("a".to_string()));
    }

    #[test]
    fn test_cycle_detection() {
        let steps = vec![
            noop("a").with_dependencies(["c"]),
            noop("b").with_dependencies(["a"]),
            noop("c").with_dependencies(["b"]),
        ];
        assert!(matches!(
            Workflow::new("cyclic", steps),
            Err(WorkflowError::CyclicDependency(_))
        ));

        let self_loop = vec![noop("a").with_dependencies(["a"])];
        assert!(matches!(
            Workflow::new("self", self_loop),
            Err(WorkflowError::CyclicDependency(_))
        ));
    }

    #[test]
    fn test_valid_diamond_graph() {
        let steps = vec![
            noop("root"),
            noop("left").with_dependencies(["root"]),
            noop("right").with_dependencies(["root"]),
            noop("join").with_dependencies(["left", "right"]),
        ];
        let workflow = Workflow::new("diamond", steps).unwrap();
        assert_eq!(workflow.step_ids(), vec!["root", "left", "right", "join"]);
        assert!(workflow.get_step("join").is_some());
    }
}
