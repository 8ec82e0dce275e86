// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Healing Domain Types
//!
//! Value objects exchanged between the graph runner and the recovery registry.
//! A recovery strategy returns a *decision* ([`RecoveryAction`]); the runner is
//! responsible for applying it and re-invoking the step.

use crate::domain::failure::{FailureKind, StepError};
use crate::domain::workflow::WorkflowId;
use crate::domain::execution::ExecutionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Snapshot of the failing step handed to a recovery strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingContext {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    pub step_id: String,
    pub error: StepError,
    pub attempts: u32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Decision returned by a recovery strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Retry with the given (larger) per-attempt timeout.
    RetryWithTimeout {
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },
    ScaleResources,
    SubstituteDependency,
    RestartUnit,
    /// Wait for the given delay before the retry.
    RetryWithBackoff {
        #[serde(with = "humantime_serde")]
        delay: Duration,
    },
    RestartAndRetry,
    /// Strategy could not produce a decision.
    None,
}

impl RecoveryAction {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryAction::RetryWithTimeout { .. } => "retry_with_increased_timeout",
            RecoveryAction::ScaleResources => "scale_resources",
            RecoveryAction::SubstituteDependency => "substitute_dependency",
            RecoveryAction::RestartUnit => "restart_unit",
            RecoveryAction::RetryWithBackoff { .. } => "retry_with_backoff",
            RecoveryAction::RestartAndRetry => "restart_and_retry",
            RecoveryAction::None => "none",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingResult {
    pub success: bool,
    pub action_name: String,
    pub action: RecoveryAction,
    pub details: String,
}

impl HealingResult {
    pub fn succeeded(action: RecoveryAction, details: impl Into<String>) -> Self {
        Self {
            success: true,
            action_name: action.name().to_string(),
            action,
            details: details.into(),
        }
    }

    pub fn failed(action_name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            success: false,
            action_name: action_name.into(),
            action: RecoveryAction::None,
            details: details.into(),
        }
    }
}

/// Append-only record of one healing attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealingRecord {
    pub id: Uuid,
    pub failure_kind: FailureKind,
    pub context: HealingContext,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub details: String,
}

impl HealingRecord {
    pub fn new(failure_kind: FailureKind, context: HealingContext, result: &HealingResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            failure_kind,
            context,
            success: result.success,
            timestamp: Utc::now(),
            action: result.action_name.clone(),
            details: result.details.clone(),
        }
    }
}
