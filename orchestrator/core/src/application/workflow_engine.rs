// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Engine Application Service
//!
//! Registry of workflow definitions and the single entry point for running
//! them.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Own execution records, aggregate counters and the anomaly model
//! - **Dependencies:** Domain (Workflow, Execution), DependencyGraphRunner, optional ports
//!
//! # State Machine
//!
//! ```text
//! Pending ──▶ Running ──▶ Completed
//!               │  ▲
//!               ▼  │
//!             Healing ──▶ Escalated
//!               │
//!               └───────▶ Failed
//! ```
//!
//! `execute` never returns an error: unknown workflows, refused admissions and
//! step failures all end up in the returned record's `error_log`.

use crate::application::graph_runner::DependencyGraphRunner;
use crate::application::recovery::RecoveryStrategyRegistry;
use crate::application::step_executor::StepExecutor;
use crate::domain::anomaly::{AnomalyScore, AnomalyScorer, FeatureVector};
use crate::domain::engine_config::{EngineConfig, EngineSettings};
use crate::domain::events::WorkflowEvent;
use crate::domain::execution::{ExecutionId, ExecutionStatus, WorkflowExecution};
use crate::domain::repository::ExecutionRepository;
use crate::domain::telemetry::{MetricsSink, NullProbe, SystemProbe};
use crate::domain::unit_of_work::ExecutionContext;
use crate::domain::workflow::{Workflow, WorkflowError, WorkflowId, WorkflowStep};
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Aggregate snapshot returned by [`WorkflowEngine::get_system_metrics`].
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub uptime_seconds: f64,
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub success_rate: f64,
    pub healing_attempts: u64,
    pub successful_healings: u64,
    pub healing_success_rate: f64,
    pub auto_resolution_rate: f64,
    pub registered_workflows: usize,
    pub last_anomaly_score: Option<f64>,
}

#[derive(Debug, Default)]
struct EngineCounters {
    total: u64,
    successful: u64,
    failed: u64,
    healing_attempts: u64,
    healing_successes: u64,
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

pub struct WorkflowEngine {
    settings: EngineSettings,
    workflows: RwLock<HashMap<WorkflowId, Arc<Workflow>>>,
    executor: StepExecutor,
    recovery: Arc<RecoveryStrategyRegistry>,
    history: Mutex<VecDeque<WorkflowExecution>>,
    counters: Mutex<EngineCounters>,
    scorer: Mutex<AnomalyScorer>,
    last_anomaly: Mutex<Option<AnomalyScore>>,
    started_at: Instant,

    event_bus: Option<EventBus>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    repository: Option<Arc<dyn ExecutionRepository>>,
    probe: Arc<dyn SystemProbe>,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new(EngineSettings::default())
    }
}

impl WorkflowEngine {
    pub fn new(settings: EngineSettings) -> Self {
        let gate = &settings.health_gate;
        Self {
            executor: StepExecutor::new(settings.backoff_unit),
            recovery: Arc::new(RecoveryStrategyRegistry::new(
                settings.remediation_delay,
                settings.backoff_unit,
            )),
            scorer: Mutex::new(AnomalyScorer::new(gate.window, gate.threshold, gate.min_samples)),
            workflows: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            counters: Mutex::new(EngineCounters::default()),
            last_anomaly: Mutex::new(None),
            started_at: Instant::now(),
            event_bus: None,
            metrics_sink: None,
            repository: None,
            probe: Arc::new(NullProbe),
            settings,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.spec.engine.clone())
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(sink);
        self
    }

    pub fn with_repository(mut self, repository: Arc<dyn ExecutionRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn SystemProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_recovery_registry(mut self, recovery: Arc<RecoveryStrategyRegistry>) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn recovery(&self) -> &Arc<RecoveryStrategyRegistry> {
        &self.recovery
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Validate and store a workflow, replacing any definition with the same id.
    pub async fn register_workflow(
        &self,
        id: impl Into<WorkflowId>,
        steps: Vec<WorkflowStep>,
    ) -> Result<bool, WorkflowError> {
        let workflow = Workflow::new(id, steps)?;
        let id = workflow.id.clone();
        let step_count = workflow.steps().len();

        let replaced = self
            .workflows
            .write()
            .insert(id.clone(), Arc::new(workflow))
            .is_some();

        info!(workflow_id = %id, steps = step_count, replaced, "Workflow registered");
        Ok(true)
    }

    pub async fn is_registered(&self, id: &WorkflowId) -> bool {
        self.workflows.read().contains_key(id)
    }

    pub async fn list_workflows(&self) -> Vec<WorkflowId> {
        let mut ids: Vec<WorkflowId> = self.workflows.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn execute(
        &self,
        workflow_id: impl Into<WorkflowId>,
        context: ExecutionContext,
    ) -> WorkflowExecution {
        let workflow_id = workflow_id.into();
        let mut execution = WorkflowExecution::new(workflow_id.clone());

        let workflow = self.workflows.read().get(&workflow_id).cloned();
        let Some(workflow) = workflow else {
            let err = WorkflowError::WorkflowNotFound(workflow_id);
            warn!("{}", err);
            execution.fail(err.to_string());
            return self.finish(execution, false).await;
        };

        if let Some(reason) = self.admission_refusal() {
            warn!(workflow_id = %workflow_id, "{}", reason);
            execution.fail(reason);
            return self.finish(execution, false).await;
        }

        execution.start();
        info!(workflow_id = %workflow_id, execution_id = %execution.id, "Starting workflow execution");
        self.publish(WorkflowEvent::ExecutionStarted {
            execution_id: execution.id,
            workflow_id: workflow_id.clone(),
            started_at: execution.started_at,
        });

        let mut runner = DependencyGraphRunner::new(self.executor.clone(), self.recovery.clone());
        if let Some(bus) = &self.event_bus {
            runner = runner.with_event_bus(bus.clone());
        }

        let outcome = runner.run_steps(&mut execution, workflow.steps(), context).await;
        execution.metrics.extend(outcome.metrics);

        match (outcome.success, outcome.escalated, outcome.error) {
            (true, _, _) => execution.complete(),
            (false, true, reason) => {
                execution.escalate(reason.unwrap_or_else(|| "Critical step unresolved".to_string()))
            }
            (false, false, reason) => {
                execution.fail(reason.unwrap_or_else(|| "Workflow execution failed".to_string()))
            }
        }

        self.finish(execution, true).await
    }

    /// Refuse new work while the most recent execution scored as anomalous.
    fn admission_refusal(&self) -> Option<String> {
        let gate = &self.settings.health_gate;
        if !(gate.enabled && gate.enforce) {
            return None;
        }
        // A refusal consumes the anomaly so the following request is admitted.
        let mut last = self.last_anomaly.lock();
        match *last {
            Some(score) if score.is_anomaly => {
                *last = None;
                Some(format!(
                    "Health gate refused execution: anomaly score {:.2} exceeds {:.2}",
                    score.score, gate.threshold
                ))
            }
            _ => None,
        }
    }

    /// Bookkeeping shared by every exit path of `execute`.
    async fn finish(&self, mut execution: WorkflowExecution, ran: bool) -> WorkflowExecution {
        if ran && self.settings.health_gate.enabled {
            let features = self.feature_vector(&execution);
            let score = {
                let mut scorer = self.scorer.lock();
                let score = scorer.score(&features);
                scorer.observe(features);
                score
            };
            execution.metrics.insert("anomaly_score".to_string(), score.score);
            execution.metrics.insert(
                "anomaly_detected".to_string(),
                if score.is_anomaly { 1.0 } else { 0.0 },
            );
            if score.is_anomaly {
                warn!(
                    execution_id = %execution.id,
                    score = score.score,
                    "Anomalous workflow execution"
                );
            }
            *self.last_anomaly.lock() = Some(score);
        }

        let healing_successes = execution.healing_actions.iter().filter(|h| h.success).count();
        {
            let mut counters = self.counters.lock();
            counters.total += 1;
            if execution.success {
                counters.successful += 1;
            } else {
                counters.failed += 1;
            }
            counters.healing_attempts += execution.healing_actions.len() as u64;
            counters.healing_successes += healing_successes as u64;
        }

        metrics::counter!(
            "autoflow_workflow_executions_total",
            "status" => execution.status.as_str()
        )
        .increment(1);
        if let Some(ms) = execution.duration_ms() {
            metrics::histogram!("autoflow_workflow_duration_seconds").record(ms as f64 / 1000.0);
        }

        info!(
            workflow_id = %execution.workflow_id,
            execution_id = %execution.id,
            status = %execution.status,
            completed = execution.steps_completed.len(),
            failed = execution.steps_failed.len(),
            "Workflow execution finished"
        );

        self.publish(WorkflowEvent::ExecutionFinished {
            execution_id: execution.id,
            workflow_id: execution.workflow_id.clone(),
            status: execution.status,
            success: execution.success,
            finished_at: execution.ended_at.unwrap_or_else(Utc::now),
        });

        self.log_run(&execution).await;

        if let Some(repository) = &self.repository {
            if let Err(e) = repository.save(&execution).await {
                warn!(execution_id = %execution.id, "Failed to persist execution: {}", e);
            }
        }

        {
            let mut history = self.history.lock();
            history.push_back(execution.clone());
            while history.len() > self.settings.history_limit.max(1) {
                history.pop_front();
            }
        }

        execution
    }

    async fn log_run(&self, execution: &WorkflowExecution) {
        let Some(sink) = &self.metrics_sink else {
            return;
        };

        let params = HashMap::from([
            ("workflow_id".to_string(), execution.workflow_id.to_string()),
            ("execution_id".to_string(), execution.id.to_string()),
        ]);
        let tags = HashMap::from([
            ("status".to_string(), execution.status.to_string()),
            ("success".to_string(), execution.success.to_string()),
        ]);
        let name = format!("workflow_{}", execution.workflow_id);

        match sink.log_run(&name, &execution.metrics, &params, &tags).await {
            Ok(run_id) => debug!(execution_id = %execution.id, run_id = %run_id, "Run logged"),
            Err(e) => warn!(execution_id = %execution.id, "Metrics sink failed: {}", e),
        }
    }

    fn feature_vector(&self, execution: &WorkflowExecution) -> FeatureVector {
        let sample = self.probe.sample();
        let duration_ms = execution.metrics.get("duration_ms").copied().unwrap_or(0.0);
        let completed = execution.steps_completed.len() as f64;
        let failed = execution.steps_failed.len() as f64;
        let attempted = completed + failed;
        let duration_secs = (duration_ms / 1000.0).max(0.001);

        FeatureVector {
            cpu: sample.cpu,
            memory: sample.memory,
            response_time: duration_ms,
            error_rate: if attempted > 0.0 { failed / attempted } else { 0.0 },
            success_rate: if execution.success { 1.0 } else { 0.0 },
            throughput: completed / duration_secs,
        }
    }

    fn publish(&self, event: WorkflowEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    pub fn get_system_metrics(&self) -> SystemMetrics {
        let counters = self.counters.lock();
        let healing_success_rate = ratio(counters.healing_successes, counters.healing_attempts);
        let registered_workflows = self.workflows.read().len();

        SystemMetrics {
            uptime_seconds: self.started_at.elapsed().as_secs_f64(),
            total_executions: counters.total,
            successful_executions: counters.successful,
            failed_executions: counters.failed,
            success_rate: ratio(counters.successful, counters.total),
            healing_attempts: counters.healing_attempts,
            successful_healings: counters.healing_successes,
            healing_success_rate,
            auto_resolution_rate: healing_success_rate * self.settings.auto_resolution_factor,
            registered_workflows,
            last_anomaly_score: self.last_anomaly.lock().map(|s| s.score),
        }
    }

    /// Retained executions, oldest first.
    pub fn execution_history(&self) -> Vec<WorkflowExecution> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn get_execution(&self, id: ExecutionId) -> Option<WorkflowExecution> {
        self.history.lock().iter().find(|e| e.id == id).cloned()
    }

    pub fn last_status(&self, workflow_id: &WorkflowId) -> Option<ExecutionStatus> {
        self.history
            .lock()
            .iter()
            .rev()
            .find(|e| &e.workflow_id == workflow_id)
            .map(|e| e.status)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
