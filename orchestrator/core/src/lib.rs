// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Lib
//!
//! Workflow execution core: dependency-gated step runner with per-step
//! timeout and retry, self-healing of critical steps, and the engine that
//! keeps execution history and system metrics.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Re-exports the domain model and application services

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
pub use application::{
    DependencyGraphRunner, RecoveryStrategyRegistry, StepExecutor, StepResult, SystemMetrics,
    WorkflowEngine,
};
