// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Recovery Strategy Registry
//!
//! Maps a [`FailureKind`] to exactly one recovery strategy, runs it, and keeps
//! an append-only history of every healing attempt.
//!
//! ## Default Strategies
//! | Failure kind | Decision |
//! |--------------|----------|
//! | `Timeout` | retry with double the timeout |
//! | `ResourceExhaustion` | scale resources |
//! | `DependencyFailure` | substitute an alternate dependency |
//! | `AgentFailure` | restart the failing unit |
//! | `NetworkError` | retry after an exponential backoff delay |
//! | `Unknown` | restart and retry |
//!
//! A strategy returns a decision only; the graph runner performs the retry.
//! Strategy errors are reported as an unsuccessful [`HealingResult`].

use crate::domain::failure::FailureKind;
use crate::domain::healing::{HealingContext, HealingRecord, HealingResult, RecoveryAction};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const MAX_NETWORK_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("Recovery action failed: {0}")]
    ActionFailed(String),

    #[error("Recovery not applicable: {0}")]
    NotApplicable(String),
}

#[async_trait]
pub trait RecoveryStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, context: &HealingContext) -> Result<RecoveryAction, RecoveryError>;
}

// ============================================================================
// Default strategies
// ============================================================================

/// Simulated remediation time shared by the default strategies.
async fn remediate(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

pub struct IncreaseTimeoutStrategy {
    remediation_delay: Duration,
}

#[async_trait]
impl RecoveryStrategy for IncreaseTimeoutStrategy {
    fn name(&self) -> &str {
        "retry_with_increased_timeout"
    }

    async fn apply(&self, context: &HealingContext) -> Result<RecoveryAction, RecoveryError> {
        remediate(self.remediation_delay).await;
        Ok(RecoveryAction::RetryWithTimeout {
            timeout: context.timeout.saturating_mul(2),
        })
    }
}

/// Strategy that only signals a fixed action after remediation.
pub struct SignalStrategy {
    name: &'static str,
    action: RecoveryAction,
    remediation_delay: Duration,
}

#[async_trait]
impl RecoveryStrategy for SignalStrategy {
    fn name(&self) -> &str {
        self.name
    }

    async fn apply(&self, _context: &HealingContext) -> Result<RecoveryAction, RecoveryError> {
        remediate(self.remediation_delay).await;
        Ok(self.action.clone())
    }
}

pub struct NetworkBackoffStrategy {
    base_delay: Duration,
    remediation_delay: Duration,
}

#[async_trait]
impl RecoveryStrategy for NetworkBackoffStrategy {
    fn name(&self) -> &str {
        "retry_with_backoff"
    }

    async fn apply(&self, context: &HealingContext) -> Result<RecoveryAction, RecoveryError> {
        remediate(self.remediation_delay).await;
        let factor = 2_u32.checked_pow(context.attempts.min(16)).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor).min(MAX_NETWORK_BACKOFF);
        Ok(RecoveryAction::RetryWithBackoff { delay })
    }
}

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HealingStats {
    pub attempts: u64,
    pub successes: u64,
}

impl HealingStats {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

pub struct RecoveryStrategyRegistry {
    strategies: RwLock<HashMap<FailureKind, Arc<dyn RecoveryStrategy>>>,
    history: RwLock<Vec<HealingRecord>>,
}

impl Default for RecoveryStrategyRegistry {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::from_secs(1))
    }
}

impl RecoveryStrategyRegistry {
    /// Registry populated with one default strategy per failure kind.
    pub fn new(remediation_delay: Duration, backoff_unit: Duration) -> Self {
        let signal = |name: &'static str, action: RecoveryAction| -> Arc<dyn RecoveryStrategy> {
            Arc::new(SignalStrategy {
                name,
                action,
                remediation_delay,
            })
        };

        let mut strategies: HashMap<FailureKind, Arc<dyn RecoveryStrategy>> = HashMap::new();
        strategies.insert(
            FailureKind::Timeout,
            Arc::new(IncreaseTimeoutStrategy { remediation_delay }),
        );
        strategies.insert(
            FailureKind::ResourceExhaustion,
            signal("scale_resources", RecoveryAction::ScaleResources),
        );
        strategies.insert(
            FailureKind::DependencyFailure,
            signal("substitute_dependency", RecoveryAction::SubstituteDependency),
        );
        strategies.insert(
            FailureKind::AgentFailure,
            signal("restart_unit", RecoveryAction::RestartUnit),
        );
        strategies.insert(
            FailureKind::NetworkError,
            Arc::new(NetworkBackoffStrategy {
                base_delay: backoff_unit,
                remediation_delay,
            }),
        );
        strategies.insert(
            FailureKind::Unknown,
            signal("restart_and_retry", RecoveryAction::RestartAndRetry),
        );

        Self {
            strategies: RwLock::new(strategies),
            history: RwLock::new(Vec::new()),
        }
    }

    /// Replace the strategy used for `kind`.
    pub fn register(&self, kind: FailureKind, strategy: Arc<dyn RecoveryStrategy>) {
        info!(failure_kind = %kind, strategy = strategy.name(), "Registering recovery strategy");
        self.strategies.write().insert(kind, strategy);
    }

    pub async fn heal(&self, kind: FailureKind, context: HealingContext) -> HealingResult {
        self.heal_recorded(kind, context).await.0
    }

    /// Heal and return the history record appended for this attempt.
    pub async fn heal_recorded(
        &self,
        kind: FailureKind,
        context: HealingContext,
    ) -> (HealingResult, HealingRecord) {
        let strategy = self.strategies.read().get(&kind).cloned();

        let result = match strategy {
            Some(strategy) => match Self::apply_isolated(&strategy, &context).await {
                Ok(action) => HealingResult {
                    success: true,
                    action_name: strategy.name().to_string(),
                    details: format!(
                        "{} applied to step '{}' after {} attempt(s)",
                        action.name(),
                        context.step_id,
                        context.attempts
                    ),
                    action,
                },
                Err(e) => HealingResult::failed(strategy.name(), e.to_string()),
            },
            None => HealingResult::failed("none", format!("no recovery strategy for {}", kind)),
        };

        if result.success {
            info!(
                step_id = %context.step_id,
                failure_kind = %kind,
                action = %result.action_name,
                "Healing strategy applied"
            );
        } else {
            warn!(
                step_id = %context.step_id,
                failure_kind = %kind,
                action = %result.action_name,
                "Healing failed: {}",
                result.details
            );
        }

        metrics::counter!(
            "autoflow_healing_attempts_total",
            "failure_kind" => kind.as_str(),
            "success" => if result.success { "true" } else { "false" }
        )
        .increment(1);

        let record = HealingRecord::new(kind, context, &result);
        self.history.write().push(record.clone());
        (result, record)
    }

    /// Run a strategy on its own task so a panicking strategy is reported
    /// as a failed attempt instead of unwinding through the engine.
    async fn apply_isolated(
        strategy: &Arc<dyn RecoveryStrategy>,
        context: &HealingContext,
    ) -> Result<RecoveryAction, RecoveryError> {
        let task_strategy = Arc::clone(strategy);
        let task_context = context.clone();
        let handle = tokio::spawn(async move { task_strategy.apply(&task_context).await });

        match handle.await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => Err(RecoveryError::ActionFailed(format!(
                "strategy '{}' panicked",
                strategy.name()
            ))),
            Err(join_err) => Err(RecoveryError::ActionFailed(join_err.to_string())),
        }
    }

    pub fn history(&self) -> Vec<HealingRecord> {
        self.history.read().clone()
    }

    pub fn total_attempts(&self) -> usize {
        self.history.read().len()
    }

    pub fn successful_attempts(&self) -> usize {
        self.history.read().iter().filter(|r| r.success).count()
    }

    /// `successful / total`, 0.0 before any attempt.
    pub fn healing_success_rate(&self) -> f64 {
        let history = self.history.read();
        if history.is_empty() {
            return 0.0;
        }
        let successes = history.iter().filter(|r| r.success).count();
        successes as f64 / history.len() as f64
    }

    pub fn stats_by_kind(&self) -> BTreeMap<FailureKind, HealingStats> {
        let mut stats: BTreeMap<FailureKind, HealingStats> = BTreeMap::new();
        for record in self.history.read().iter() {
            let entry = stats.entry(record.failure_kind).or_default();
            entry.attempts += 1;
            if record.success {
                entry.successes += 1;
            }
        }
        stats
    }
}
