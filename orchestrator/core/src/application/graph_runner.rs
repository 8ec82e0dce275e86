// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Dependency Graph Runner
//!
//! Walks a workflow's steps in caller-supplied order, gating each step on its
//! dependencies, and drives the healing protocol for critical failures.
//!
//! ## Per-step Decision Table
//! | Situation | Action |
//! |-----------|--------|
//! | a dependency is not in `steps_completed` | abort with `DependencyNotMet` |
//! | step succeeded | mark completed, publish its output into the context |
//! | non-critical step failed | mark failed, continue |
//! | critical step failed, healing failed | escalate, abort |
//! | critical step failed, healing succeeded | apply the decision, run the step once more |
//! | ... and the retry failed | escalate, abort |
//!
//! The runner moves the execution between `Running` and `Healing`; the
//! terminal status is set by the engine from the returned [`RunOutcome`].

use crate::application::recovery::RecoveryStrategyRegistry;
use crate::application::step_executor::{StepExecutor, StepResult};
use crate::domain::events::WorkflowEvent;
use crate::domain::execution::WorkflowExecution;
use crate::domain::failure::StepError;
use crate::domain::healing::{HealingContext, RecoveryAction};
use crate::domain::unit_of_work::ExecutionContext;
use crate::domain::workflow::{WorkflowError, WorkflowStep};
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Result of walking the step list.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub success: bool,
    /// A critical failure was not resolved by healing
    pub escalated: bool,
    /// Reason the run was aborted, if it was
    pub error: Option<String>,
    pub metrics: HashMap<String, f64>,
}

pub struct DependencyGraphRunner {
    executor: StepExecutor,
    recovery: Arc<RecoveryStrategyRegistry>,
    event_bus: Option<EventBus>,
}

#[derive(Default)]
struct RunCounters {
    attempts: u32,
    healing_attempts: u32,
}

impl DependencyGraphRunner {
    pub fn new(executor: StepExecutor, recovery: Arc<RecoveryStrategyRegistry>) -> Self {
        Self {
            executor,
            recovery,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn recovery(&self) -> &Arc<RecoveryStrategyRegistry> {
        &self.recovery
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    pub async fn run_steps(
        &self,
        execution: &mut WorkflowExecution,
        steps: &[WorkflowStep],
        context: ExecutionContext,
    ) -> RunOutcome {
        let started = Instant::now();
        let mut context = context;
        let mut counters = RunCounters::default();

        let mut outcome = RunOutcome {
            success: true,
            ..RunOutcome::default()
        };

        for step in steps {
            let missing: Vec<String> = step
                .dependencies
                .iter()
                .filter(|dep| !execution.is_step_completed(dep))
                .cloned()
                .collect();

            if !missing.is_empty() {
                let err = WorkflowError::DependencyNotMet {
                    step: step.id.clone(),
                    missing,
                };
                warn!(execution_id = %execution.id, step_id = %step.id, "{}", err);
                outcome.success = false;
                outcome.error = Some(err.to_string());
                break;
            }

            debug!(execution_id = %execution.id, step_id = %step.id, "Running step");
            let result = self.executor.run(step, &context).await;
            counters.attempts += result.attempts;

            let error = match result.outcome {
                Ok(value) => {
                    self.record_success(execution, step, result.attempts, value, &mut context);
                    continue;
                }
                Err(ref e) => e.clone(),
            };

            execution.mark_step_failed(&step.id);
            execution.log_error(format!("Step '{}' failed: {}", step.id, error));
            self.publish(WorkflowEvent::StepFailed {
                execution_id: execution.id,
                step_id: step.id.clone(),
                failure_kind: error.kind,
                error: error.message.clone(),
                attempts: result.attempts,
                critical: step.critical,
                failed_at: Utc::now(),
            });

            if !step.critical {
                warn!(
                    execution_id = %execution.id,
                    step_id = %step.id,
                    "Non-critical step failed, continuing: {}",
                    error
                );
                continue;
            }

            counters.healing_attempts += 1;
            match self
                .heal_and_retry(execution, step, &result, error, &context, &mut counters)
                .await
            {
                Ok(retry) => {
                    let attempts = retry.attempts;
                    if let Ok(value) = retry.outcome {
                        execution.resume();
                        self.record_success(execution, step, attempts, value, &mut context);
                    }
                }
                Err(reason) => {
                    warn!(execution_id = %execution.id, step_id = %step.id, "Escalating: {}", reason);
                    outcome.success = false;
                    outcome.escalated = true;
                    outcome.error = Some(reason);
                    break;
                }
            }
        }

        outcome.metrics.insert("steps_total".to_string(), steps.len() as f64);
        outcome.metrics.insert(
            "steps_completed".to_string(),
            execution.steps_completed.len() as f64,
        );
        outcome
            .metrics
            .insert("steps_failed".to_string(), execution.steps_failed.len() as f64);
        outcome
            .metrics
            .insert("healing_attempts".to_string(), counters.healing_attempts as f64);
        outcome
            .metrics
            .insert("total_attempts".to_string(), counters.attempts as f64);
        outcome.metrics.insert(
            "duration_ms".to_string(),
            started.elapsed().as_secs_f64() * 1000.0,
        );
        outcome
    }

    fn record_success(
        &self,
        execution: &mut WorkflowExecution,
        step: &WorkflowStep,
        attempts: u32,
        value: serde_json::Value,
        context: &mut ExecutionContext,
    ) {
        execution.mark_step_completed(&step.id);
        context.insert(step.id.clone(), value);
        self.publish(WorkflowEvent::StepCompleted {
            execution_id: execution.id,
            step_id: step.id.clone(),
            attempts,
            completed_at: Utc::now(),
        });
    }

    /// Returns the retry result when healing succeeded and the retry ran to
    /// success, or the escalation reason otherwise.
    async fn heal_and_retry(
        &self,
        execution: &mut WorkflowExecution,
        step: &WorkflowStep,
        failed: &StepResult,
        error: StepError,
        context: &ExecutionContext,
        counters: &mut RunCounters,
    ) -> Result<StepResult, String> {
        execution.begin_healing();
        let kind = error.kind;
        let healing_context = HealingContext {
            workflow_id: execution.workflow_id.clone(),
            execution_id: execution.id,
            step_id: step.id.clone(),
            error,
            attempts: failed.attempts,
            timeout: step.timeout,
        };

        let (healing, record) = self.recovery.heal_recorded(kind, healing_context).await;
        execution.healing_actions.push(record);
        self.publish(WorkflowEvent::HealingAttempted {
            execution_id: execution.id,
            step_id: step.id.clone(),
            failure_kind: kind,
            action: healing.action_name.clone(),
            success: healing.success,
            attempted_at: Utc::now(),
        });

        if !healing.success {
            return Err(format!(
                "Healing of step '{}' failed ({}): {}",
                step.id, healing.action_name, healing.details
            ));
        }

        let timeout = match &healing.action {
            RecoveryAction::RetryWithTimeout { timeout } => *timeout,
            RecoveryAction::RetryWithBackoff { delay } => {
                tokio::time::sleep(*delay).await;
                step.timeout
            }
            _ => step.timeout,
        };

        info!(
            execution_id = %execution.id,
            step_id = %step.id,
            action = %healing.action_name,
            "Retrying step after healing"
        );
        let retry = self.executor.run_with_timeout(step, context, timeout).await;
        counters.attempts += retry.attempts;

        match &retry.outcome {
            Ok(_) => Ok(retry),
            Err(e) => {
                execution.log_error(format!("Retry of step '{}' after healing failed: {}", step.id, e));
                Err(format!(
                    "Critical step '{}' still failing after {}",
                    step.id, healing.action_name
                ))
            }
        }
    }
}
