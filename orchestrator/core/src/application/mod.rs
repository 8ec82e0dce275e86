// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod graph_runner;
pub mod recovery;
pub mod step_executor;
pub mod workflow_engine;

// Re-export services for convenience
pub use graph_runner::{DependencyGraphRunner, RunOutcome};
pub use recovery::{HealingStats, RecoveryError, RecoveryStrategy, RecoveryStrategyRegistry};
pub use step_executor::{StepExecutor, StepResult};
pub use workflow_engine::{SystemMetrics, WorkflowEngine};
