// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Execution History Repository
//!
//! Persistence contract for finished [`WorkflowExecution`] records. The engine
//! keeps its own bounded in-memory history; a repository extends that beyond
//! the process lifetime. Interface defined here, implemented in
//! `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `ExecutionRepository` | `WorkflowExecution` | `InMemoryExecutionRepository` |

use crate::domain::execution::{ExecutionId, WorkflowExecution};
use crate::domain::workflow::WorkflowId;
use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Save execution (create or update)
    async fn save(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, RepositoryError>;

    async fn find_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError>;

    /// Most recent first
    async fn find_recent(&self, limit: usize) -> Result<Vec<WorkflowExecution>, RepositoryError>;
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
