// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the workflow engine
//!
//! These tests drive the public engine API end to end:
//! 1. Register workflows built from closure units
//! 2. Execute them and inspect the returned execution record
//! 3. Verify dependency gating, retry bounds and healing escalation
//! 4. Observe the event stream and the execution repository

use async_trait::async_trait;
use autoflow_core::application::recovery::{RecoveryError, RecoveryStrategy};
use autoflow_core::application::WorkflowEngine;
use autoflow_core::domain::engine_config::EngineSettings;
use autoflow_core::domain::events::WorkflowEvent;
use autoflow_core::domain::execution::ExecutionStatus;
use autoflow_core::domain::failure::{FailureKind, StepError};
use autoflow_core::domain::healing::{HealingContext, RecoveryAction};
use autoflow_core::domain::repository::ExecutionRepository;
use autoflow_core::domain::unit_of_work::{unit_async, unit_fn, ExecutionContext};
use autoflow_core::domain::workflow::{WorkflowId, WorkflowStep};
use autoflow_core::infrastructure::event_bus::EventBus;
use autoflow_core::infrastructure::repositories::InMemoryExecutionRepository;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn settings() -> EngineSettings {
    EngineSettings {
        backoff_unit: Duration::from_millis(100),
        ..EngineSettings::default()
    }
}

fn counting_failure(calls: Arc<AtomicU32>) -> WorkflowStep {
    WorkflowStep::new(
        "a",
        unit_fn(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StepError::agent("unit always fails"))
        }),
    )
}

fn recording_step(id: &'static str, log: Arc<Mutex<Vec<String>>>) -> WorkflowStep {
    WorkflowStep::new(
        id,
        unit_fn(move |_| {
            log.lock().push(id.to_string());
            Ok(json!(id))
        }),
    )
}

#[tokio::test(start_paused = true)]
async fn test_critical_failure_heals_once_then_escalates() {
    let engine = WorkflowEngine::new(settings());
    let a_calls = Arc::new(AtomicU32::new(0));
    let b_calls = Arc::new(AtomicU32::new(0));
    let b_counter = b_calls.clone();

    let steps = vec![
        counting_failure(a_calls.clone()),
        WorkflowStep::new(
            "b",
            unit_fn(move |_| {
                b_counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!(null))
            }),
        )
        .with_dependencies(["a"]),
    ];
    engine.register_workflow("W", steps).await.unwrap();

    let execution = engine.execute("W", ExecutionContext::new()).await;

    assert!(!execution.success);
    assert_eq!(execution.status, ExecutionStatus::Escalated);
    assert_eq!(execution.steps_failed, vec!["a"]);
    assert!(execution.steps_completed.is_empty());
    assert_eq!(execution.healing_actions.len(), 1);
    assert!(execution.healing_actions[0].success);
    assert_eq!(execution.healing_actions[0].failure_kind, FailureKind::AgentFailure);
    // Four attempts before healing and four on the single post-heal retry.
    assert_eq!(a_calls.load(Ordering::SeqCst), 8);
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    assert!(execution.ended_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_non_critical_failure_still_blocks_dependents() {
    let engine = WorkflowEngine::new(settings());
    let log = Arc::new(Mutex::new(Vec::new()));

    let steps = vec![
        counting_failure(Arc::new(AtomicU32::new(0))).critical(false),
        recording_step("b", log.clone()).with_dependencies(["a"]),
    ];
    engine.register_workflow("W", steps).await.unwrap();

    let execution = engine.execute("W", ExecutionContext::new()).await;

    assert!(!execution.success);
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.steps_failed, vec!["a"]);
    assert!(execution.steps_completed.is_empty());
    assert!(execution.healing_actions.is_empty());
    assert!(log.lock().is_empty());
    assert!(execution
        .error_log
        .iter()
        .any(|e| e.contains("Dependency not met for step 'b'")));
}

#[tokio::test(start_paused = true)]
async fn test_dependents_run_only_after_dependencies_complete() {
    let engine = WorkflowEngine::new(settings());
    let log = Arc::new(Mutex::new(Vec::new()));

    let steps = vec![
        recording_step("root", log.clone()),
        recording_step("left", log.clone()).with_dependencies(["root"]),
        recording_step("right", log.clone()).with_dependencies(["root"]),
        recording_step("join", log.clone()).with_dependencies(["left", "right"]),
    ];
    engine.register_workflow("diamond", steps).await.unwrap();

    let execution = engine.execute("diamond", ExecutionContext::new()).await;

    assert!(execution.success);
    assert_eq!(*log.lock(), vec!["root", "left", "right", "join"]);
    assert_eq!(execution.steps_completed, *log.lock());
}

#[tokio::test(start_paused = true)]
async fn test_out_of_order_listing_fails_fast() {
    let engine = WorkflowEngine::new(settings());
    let log = Arc::new(Mutex::new(Vec::new()));

    // Steps run in listed order; a dependency listed later is not yet completed.
    let steps = vec![
        recording_step("late", log.clone()).with_dependencies(["early"]),
        recording_step("early", log.clone()),
    ];
    engine.register_workflow("w", steps).await.unwrap();

    let execution = engine.execute("w", ExecutionContext::new()).await;
    assert!(!execution.success);
    assert!(log.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_retry_bound_and_backoff_budget() {
    let engine = WorkflowEngine::new(settings());
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let step = WorkflowStep::new(
        "flaky",
        unit_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StepError::network("connection reset"))
        }),
    )
    .with_max_retries(2)
    .critical(false);
    engine.register_workflow("w", vec![step]).await.unwrap();

    let started = tokio::time::Instant::now();
    let execution = engine.execute("w", ExecutionContext::new()).await;
    let elapsed = started.elapsed();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(execution.metrics["total_attempts"], 3.0);
    // Backoff of 1 + 2 units between the three attempts.
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(400));
    // Non-critical and nothing depends on it.
    assert!(execution.success);
}

#[tokio::test(start_paused = true)]
async fn test_execute_never_raises_for_failing_units() {
    let engine = WorkflowEngine::new(settings());

    let steps = vec![
        WorkflowStep::new(
            "slow",
            unit_async(|_| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(json!(null))
            }),
        )
        .with_timeout(Duration::from_secs(1))
        .with_max_retries(1)
        .critical(false),
        WorkflowStep::new("panics", unit_fn(|_| panic!("unit blew up")))
            .with_max_retries(0)
            .critical(false),
        WorkflowStep::new("broken", unit_fn(|_| Err(StepError::resource_exhausted("oom"))))
            .with_max_retries(0),
    ];
    engine.register_workflow("doomed", steps).await.unwrap();

    let execution = engine.execute("doomed", ExecutionContext::new()).await;

    assert!(!execution.success);
    assert!(!execution.error_log.is_empty());
    assert_eq!(execution.steps_failed, vec!["slow", "panics", "broken"]);
    assert!(execution.error_log[0].contains("timeout"));
    assert_eq!(
        execution.healing_actions[0].failure_kind,
        FailureKind::ResourceExhaustion
    );
}

#[tokio::test(start_paused = true)]
async fn test_event_stream_for_execution() {
    let bus = EventBus::with_default_capacity();
    let mut receiver = bus.subscribe();
    let engine = WorkflowEngine::new(settings()).with_event_bus(bus);

    let steps = vec![
        WorkflowStep::new("ok", unit_fn(|_| Ok(json!(1)))),
        WorkflowStep::new("optional", unit_fn(|_| Err(StepError::agent("skip me"))))
            .with_max_retries(0)
            .critical(false),
    ];
    engine.register_workflow("events", steps).await.unwrap();
    let execution = engine.execute("events", ExecutionContext::new()).await;

    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }

    assert_eq!(events.len(), 4);
    assert!(events.iter().all(|e| e.execution_id() == execution.id));
    assert!(matches!(events[0], WorkflowEvent::ExecutionStarted { .. }));
    assert!(matches!(&events[1], WorkflowEvent::StepCompleted { step_id, .. } if step_id == "ok"));
    assert!(matches!(
        &events[2],
        WorkflowEvent::StepFailed { step_id, critical: false, .. } if step_id == "optional"
    ));
    assert!(matches!(
        events[3],
        WorkflowEvent::ExecutionFinished { success: true, status: ExecutionStatus::Completed, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_executions_are_persisted() {
    let repository = Arc::new(InMemoryExecutionRepository::new());
    let engine = WorkflowEngine::new(settings()).with_repository(repository.clone());

    engine
        .register_workflow("persisted", vec![WorkflowStep::new("a", unit_fn(|_| Ok(json!(1))))])
        .await
        .unwrap();
    let first = engine.execute("persisted", ExecutionContext::new()).await;
    engine.execute("missing", ExecutionContext::new()).await;

    let stored = repository
        .find_by_workflow(&WorkflowId::from("persisted"))
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, first.id);
    assert_eq!(repository.len(), 2);
}

struct PanickingStrategy;

#[async_trait]
impl RecoveryStrategy for PanickingStrategy {
    fn name(&self) -> &str {
        "panicking"
    }

    async fn apply(&self, _context: &HealingContext) -> Result<RecoveryAction, RecoveryError> {
        panic!("strategy exploded")
    }
}

#[tokio::test(start_paused = true)]
async fn test_panicking_strategy_escalates_instead_of_unwinding() {
    let engine = WorkflowEngine::new(settings());
    engine
        .recovery()
        .register(FailureKind::AgentFailure, Arc::new(PanickingStrategy));

    let steps =
        vec![WorkflowStep::new("a", unit_fn(|_| Err(StepError::agent("down")))).with_max_retries(0)];
    engine.register_workflow("W", steps).await.unwrap();

    let execution = engine.execute("W", ExecutionContext::new()).await;

    assert!(!execution.success);
    assert_eq!(execution.status, ExecutionStatus::Escalated);
    assert_eq!(execution.healing_actions.len(), 1);
    assert!(!execution.healing_actions[0].success);
    assert_eq!(execution.healing_actions[0].action, "panicking");
    assert!(execution.error_log.iter().any(|e| e.contains("panicked")));
    assert_eq!(engine.recovery().total_attempts(), 1);
}
