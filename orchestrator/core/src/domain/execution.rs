// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Workflow Execution Record
//!
//! One [`WorkflowExecution`] is produced per `WorkflowEngine::execute` call. The
//! record is the only thing a caller sees: success flag, completed and failed
//! step ids, healing actions, metrics and a human-readable error log.
//!
//! `ended_at` is set exactly when the status becomes terminal.

use crate::domain::healing::HealingRecord;
use crate::domain::workflow::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    /// A critical step is being recovered.
    Healing,
    Completed,
    Failed,
    /// Healing did not resolve a critical failure.
    Escalated,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Escalated
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Healing => "healing",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Escalated => "escalated",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub steps_completed: Vec<String>,
    pub steps_failed: Vec<String>,
    pub healing_actions: Vec<HealingRecord>,
    pub metrics: HashMap<String, f64>,
    pub error_log: Vec<String>,
    pub success: bool,
}

impl WorkflowExecution {
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id,
            status: ExecutionStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            steps_completed: Vec::new(),
            steps_failed: Vec::new(),
            healing_actions: Vec::new(),
            metrics: HashMap::new(),
            error_log: Vec::new(),
            success: false,
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
    }

    pub fn begin_healing(&mut self) {
        self.status = ExecutionStatus::Healing;
    }

    pub fn resume(&mut self) {
        self.status = ExecutionStatus::Running;
    }

    pub fn complete(&mut self) {
        self.finish(ExecutionStatus::Completed, true);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.error_log.push(reason.into());
        self.finish(ExecutionStatus::Failed, false);
    }

    pub fn escalate(&mut self, reason: impl Into<String>) {
        self.error_log.push(reason.into());
        self.finish(ExecutionStatus::Escalated, false);
    }

    fn finish(&mut self, status: ExecutionStatus, success: bool) {
        self.status = status;
        self.success = success;
        self.ended_at = Some(Utc::now());
    }

    pub fn log_error(&mut self, message: impl Into<String>) {
        self.error_log.push(message.into());
    }

    pub fn mark_step_completed(&mut self, step_id: &str) {
        self.steps_failed.retain(|id| id != step_id);
        if !self.is_step_completed(step_id) {
            self.steps_completed.push(step_id.to_string());
        }
    }

    pub fn mark_step_failed(&mut self, step_id: &str) {
        if !self.steps_failed.iter().any(|id| id == step_id) {
            self.steps_failed.push(step_id.to_string());
        }
    }

    pub fn is_step_completed(&self, step_id: &str) -> bool {
        self.steps_completed.iter().any(|id| id == step_id)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.ended_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
