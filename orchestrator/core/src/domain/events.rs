// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::execution::{ExecutionId, ExecutionStatus};
use crate::domain::failure::FailureKind;
use crate::domain::workflow::WorkflowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle events of a single workflow execution, published on the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    ExecutionStarted {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        started_at: DateTime<Utc>,
    },
    StepCompleted {
        execution_id: ExecutionId,
        step_id: String,
        attempts: u32,
        completed_at: DateTime<Utc>,
    },
    StepFailed {
        execution_id: ExecutionId,
        step_id: String,
        failure_kind: FailureKind,
        error: String,
        attempts: u32,
        critical: bool,
        failed_at: DateTime<Utc>,
    },
    HealingAttempted {
        execution_id: ExecutionId,
        step_id: String,
        failure_kind: FailureKind,
        action: String,
        success: bool,
        attempted_at: DateTime<Utc>,
    },
    ExecutionFinished {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        status: ExecutionStatus,
        success: bool,
        finished_at: DateTime<Utc>,
    },
}

impl WorkflowEvent {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            WorkflowEvent::ExecutionStarted { execution_id, .. }
            | WorkflowEvent::StepCompleted { execution_id, .. }
            | WorkflowEvent::StepFailed { execution_id, .. }
            | WorkflowEvent::HealingAttempted { execution_id, .. }
            | WorkflowEvent::ExecutionFinished { execution_id, .. } => *execution_id,
        }
    }
}
