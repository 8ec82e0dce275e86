// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Step Executor
//!
//! Runs a single workflow step: invoke its unit of work under a deadline,
//! retry with exponential backoff, and always come back with a [`StepResult`].
//!
//! ## Attempt Loop
//! | Outcome of attempt `n` | Action |
//! |------------------------|--------|
//! | `Ok(value)` | return success |
//! | deadline elapsed | classify `Timeout` |
//! | unit returned `Err` | keep the unit's own classification |
//! | unit panicked | classify `AgentFailure` |
//! | `n < max_retries` | sleep `backoff_unit * 2^n`, retry |
//! | `n == max_retries` | return the last failure |
//!
//! Each attempt runs on its own tokio task so a panic or a timed-out unit
//! cannot take the caller down with it; a timed-out task is aborted.

use crate::domain::failure::{FailureKind, StepError};
use crate::domain::unit_of_work::ExecutionContext;
use crate::domain::workflow::WorkflowStep;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_id: String,
    pub outcome: Result<Value, StepError>,
    /// Attempts made, including the successful one
    pub attempts: u32,
    pub elapsed: Duration,
}

impl StepResult {
    pub fn success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn value(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&StepError> {
        self.outcome.as_ref().err()
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.error().map(|e| e.kind)
    }
}

#[derive(Debug, Clone)]
pub struct StepExecutor {
    backoff_unit: Duration,
}

impl Default for StepExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl StepExecutor {
    pub fn new(backoff_unit: Duration) -> Self {
        Self { backoff_unit }
    }

    pub fn backoff_unit(&self) -> Duration {
        self.backoff_unit
    }

    /// Delay slept after failed attempt `attempt` (counted from 0).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.backoff_unit.saturating_mul(factor)
    }

    pub async fn run(&self, step: &WorkflowStep, context: &ExecutionContext) -> StepResult {
        self.run_with_timeout(step, context, step.timeout).await
    }

    /// Same as [`run`](Self::run) with an overridden per-attempt deadline.
    pub async fn run_with_timeout(
        &self,
        step: &WorkflowStep,
        context: &ExecutionContext,
        timeout: Duration,
    ) -> StepResult {
        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            metrics::counter!("autoflow_step_attempts_total").increment(1);
            debug!(step_id = %step.id, attempt, "Invoking unit of work");

            let error = match self.attempt(step, context.clone(), timeout).await {
                Ok(value) => {
                    return StepResult {
                        step_id: step.id.clone(),
                        outcome: Ok(value),
                        attempts: attempt + 1,
                        elapsed: started.elapsed(),
                    };
                }
                Err(e) => e,
            };

            warn!(
                step_id = %step.id,
                attempt,
                failure_kind = %error.kind,
                "Step attempt failed: {}",
                error.message
            );

            if attempt >= step.max_retries {
                return StepResult {
                    step_id: step.id.clone(),
                    outcome: Err(error),
                    attempts: attempt + 1,
                    elapsed: started.elapsed(),
                };
            }

            tokio::time::sleep(self.backoff_for(attempt)).await;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        step: &WorkflowStep,
        context: ExecutionContext,
        timeout: Duration,
    ) -> Result<Value, StepError> {
        let unit = step.unit.clone();
        let mut handle = tokio::spawn(async move { unit.invoke(context).await });

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => Err(StepError::agent(format!(
                "unit of work for step '{}' panicked",
                step.id
            ))),
            Ok(Err(join_err)) => Err(StepError::agent(join_err.to_string())),
            Err(_) => {
                handle.abort();
                Err(StepError::timeout(format!(
                    "step '{}' exceeded timeout of {:?}",
                    step.id, timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::unit_of_work::{unit_async, unit_fn};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn counting_unit(fail_times: u32, calls: Arc<AtomicU32>) -> WorkflowStep {
        WorkflowStep::new(
            "flaky",
            unit_fn(move |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < fail_times {
                    Err(StepError::network("connection refused"))
                } else {
                    Ok(json!({"ok": true}))
                }
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let step = counting_unit(0, calls.clone());
        let result = StepExecutor::default().run(&step, &ExecutionContext::new()).await;

        assert!(result.success());
        assert_eq!(result.attempts, 1);
        assert_eq!(result.value(), Some(&json!({"ok": true})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let step = counting_unit(2, calls.clone()).with_max_retries(3);
        let result = StepExecutor::default().run(&step, &ExecutionContext::new()).await;

        assert!(result.success());
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_keep_last_kind() {
        let calls = Arc::new(AtomicU32::new(0));
        let step = counting_unit(u32::MAX, calls.clone()).with_max_retries(2);
        let result = StepExecutor::default().run(&step, &ExecutionContext::new()).await;

        assert!(!result.success());
        assert_eq!(result.attempts, 3);
        assert_eq!(result.failure_kind(), Some(FailureKind::NetworkError));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sum_bounded() {
        let calls = Arc::new(AtomicU32::new(0));
        let step = counting_unit(u32::MAX, calls).with_max_retries(3);
        let start = tokio::time::Instant::now();
        let result = StepExecutor::new(Duration::from_millis(100))
            .run(&step, &ExecutionContext::new())
            .await;

        assert_eq!(result.attempts, 4);
        // 100 + 200 + 400
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(700));
        assert!(elapsed < Duration::from_millis(800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_classified() {
        let step = WorkflowStep::new(
            "slow",
            unit_async(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!(null))
            }),
        )
        .with_timeout(Duration::from_secs(1))
        .with_max_retries(0);

        let result = StepExecutor::default().run(&step, &ExecutionContext::new()).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test]
    async fn test_panic_classified_as_agent_failure() {
        let step = WorkflowStep::new(
            "boom",
            unit_fn(|_| panic!("unit exploded")),
        )
        .with_max_retries(0);

        let result = StepExecutor::default().run(&step, &ExecutionContext::new()).await;
        assert_eq!(result.failure_kind(), Some(FailureKind::AgentFailure));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_sync_unit_times_out() {
        let step = WorkflowStep::new(
            "blocking",
            unit_fn(|_| {
                std::thread::sleep(Duration::from_millis(1500));
                Ok(json!("finished"))
            }),
        )
        .with_timeout(Duration::from_millis(100))
        .with_max_retries(0);

        let started = std::time::Instant::now();
        let result = StepExecutor::default().run(&step, &ExecutionContext::new()).await;

        assert_eq!(result.failure_kind(), Some(FailureKind::Timeout));
        assert!(started.elapsed() < Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_schedule() {
        let executor = StepExecutor::new(Duration::from_millis(10));
        assert_eq!(executor.backoff_for(0), Duration::from_millis(10));
        assert_eq!(executor.backoff_for(1), Duration::from_millis(20));
        assert_eq!(executor.backoff_for(3), Duration::from_millis(80));
        assert!(executor.backoff_for(64) > Duration::from_secs(1));
    }
}
