// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Unit of Work Port
//!
//! The body of a workflow step is opaque to the engine. Anything that can be
//! invoked with the execution context and return a tagged result qualifies:
//! an LLM-backed agent, a shell command, a remote worker, or a plain closure.
//!
//! | Adapter | Wraps |
//! |---------|-------|
//! | [`FnUnit`] | synchronous closure |
//! | [`AsyncFnUnit`] | closure returning a future |
//! | `ShellCommandUnit` | `sh -c` command (infrastructure layer) |

use crate::domain::failure::StepError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Context map handed to every step of an execution.
pub type ExecutionContext = HashMap<String, Value>;

/// Result type produced by a single invocation of a unit of work.
pub type UnitResult = Result<Value, StepError>;

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    async fn invoke(&self, context: ExecutionContext) -> UnitResult;
}

/// Adapter for synchronous closures.
///
/// The closure runs on the blocking pool so a unit that blocks its thread
/// still answers to the step timeout.
pub struct FnUnit<F> {
    func: Arc<F>,
}

impl<F> FnUnit<F>
where
    F: Fn(&ExecutionContext) -> UnitResult + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self {
            func: Arc::new(func),
        }
    }
}

#[async_trait]
impl<F> UnitOfWork for FnUnit<F>
where
    F: Fn(&ExecutionContext) -> UnitResult + Send + Sync + 'static,
{
    async fn invoke(&self, context: ExecutionContext) -> UnitResult {
        let func = Arc::clone(&self.func);
        match tokio::task::spawn_blocking(move || func(&context)).await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(StepError::agent("synchronous unit of work panicked"))
            }
            Err(join_err) => Err(StepError::agent(join_err.to_string())),
        }
    }
}

/// Adapter for closures that return a future.
pub struct AsyncFnUnit<F, Fut> {
    func: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncFnUnit<F, Fut>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UnitResult> + Send + 'static,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            _future: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut> UnitOfWork for AsyncFnUnit<F, Fut>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UnitResult> + Send + 'static,
{
    async fn invoke(&self, context: ExecutionContext) -> UnitResult {
        (self.func)(context).await
    }
}

/// Wrap a synchronous closure as a shareable unit of work.
pub fn unit_fn<F>(func: F) -> Arc<dyn UnitOfWork>
where
    F: Fn(&ExecutionContext) -> UnitResult + Send + Sync + 'static,
{
    Arc::new(FnUnit::new(func))
}

/// Wrap an async closure as a shareable unit of work.
pub fn unit_async<F, Fut>(func: F) -> Arc<dyn UnitOfWork>
where
    F: Fn(ExecutionContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = UnitResult> + Send + 'static,
{
    Arc::new(AsyncFnUnit::new(func))
}
