// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository abstractions defined in
//! the domain layer.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve finished workflow executions
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)
//!
//! # Available Implementations
//!
//! - **InMemoryExecutionRepository** - Thread-safe HashMap-backed storage,
//!   shared between clones

use crate::domain::execution::{ExecutionId, WorkflowExecution};
use crate::domain::repository::{ExecutionRepository, RepositoryError};
use crate::domain::workflow::WorkflowId;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryExecutionRepository {
    executions: Arc<RwLock<HashMap<ExecutionId, WorkflowExecution>>>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.read().is_empty()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn save(&self, execution: &WorkflowExecution) -> Result<(), RepositoryError> {
        self.executions
            .write()
            .insert(execution.id, execution.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, RepositoryError> {
        Ok(self.executions.read().get(&id).cloned())
    }

    async fn find_by_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let executions = self.executions.read();
        let mut matching: Vec<WorkflowExecution> = executions
            .values()
            .filter(|e| &e.workflow_id == workflow_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(matching)
    }

    async fn find_recent(&self, limit: usize) -> Result<Vec<WorkflowExecution>, RepositoryError> {
        let executions = self.executions.read();
        let mut execution_list: Vec<WorkflowExecution> = executions.values().cloned().collect();
        // Sort by started_at desc
        execution_list.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(execution_list.into_iter().take(limit).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn execution(workflow: &str, minutes_ago: i64) -> WorkflowExecution {
        let mut execution = WorkflowExecution::new(WorkflowId::new(workflow));
        execution.started_at = Utc::now() - Duration::minutes(minutes_ago);
        execution
    }

    #[tokio::test]
    async fn test_save_and_find_by_id() {
        let repo = InMemoryExecutionRepository::new();
        let mut exec = execution("etl", 0);
        repo.save(&exec).await.unwrap();

        exec.start();
        exec.complete();
        repo.save(&exec).await.unwrap();

        let found = repo.find_by_id(exec.id).await.unwrap().unwrap();
        assert!(found.success);
        assert_eq!(repo.len(), 1);
        assert!(repo.find_by_id(ExecutionId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_workflow_and_recent() {
        let repo = InMemoryExecutionRepository::new();
        let old = execution("etl", 30);
        let new = execution("etl", 1);
        let other = execution("report", 10);
        for e in [&old, &new, &other] {
            repo.save(e).await.unwrap();
        }

        let etl = repo.find_by_workflow(&WorkflowId::new("etl")).await.unwrap();
        assert_eq!(etl.iter().map(|e| e.id).collect::<Vec<_>>(), vec![new.id, old.id]);

        let recent = repo.find_recent(2).await.unwrap();
        assert_eq!(recent.iter().map(|e| e.id).collect::<Vec<_>>(), vec![new.id, other.id]);
    }
}
