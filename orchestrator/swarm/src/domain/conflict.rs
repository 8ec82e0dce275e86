// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Conflict Resolution
//!
//! Deterministic arbitration of competing requests between agents. Each
//! conflict type has a typed request document and a pure resolver function;
//! [`ConflictResolver`] wraps them behind a JSON-in / JSON-out seam so the
//! bus can look resolvers up by the `conflict_type` field of a
//! `ConflictAlert` payload.
//!
//! | Type | Ordering | Allocation |
//! |------|----------|------------|
//! | budget | priority desc, ROI desc | greedy from the total budget |
//! | timeline | dependency count desc, priority desc | back-to-back from the start date |
//! | resource | priority desc, per resource type | greedy from each resource total |
//! | strategy | weighted score | highest score wins |
//!
//! Sorts are stable, so ties keep the caller's order.

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictType {
    Budget,
    Timeline,
    Resource,
    Strategy,
}

impl ConflictType {
    pub const ALL: [ConflictType; 4] = [
        ConflictType::Budget,
        ConflictType::Timeline,
        ConflictType::Resource,
        ConflictType::Strategy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::Budget => "budget",
            ConflictType::Timeline => "timeline",
            ConflictType::Resource => "resource",
            ConflictType::Strategy => "strategy",
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictType {
    type Err = ConflictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConflictType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ConflictError::UnknownConflictType(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum ConflictError {
    #[error("Unknown conflict type '{0}'")]
    UnknownConflictType(String),

    #[error("Invalid conflict payload: {0}")]
    InvalidPayload(String),

    #[error("No strategies to choose from")]
    NoCandidates,
}

impl From<serde_json::Error> for ConflictError {
    fn from(err: serde_json::Error) -> Self {
        ConflictError::InvalidPayload(err.to_string())
    }
}

fn non_negative(field: &str, owner: &str, value: f64) -> Result<(), ConflictError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConflictError::InvalidPayload(format!(
            "{} of '{}' must be a non-negative number, got {}",
            field, owner, value
        )))
    }
}

// ============================================================================
// Budget
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRequest {
    pub requester: String,
    pub amount: f64,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub estimated_roi: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConflict {
    pub total_budget: f64,
    pub requests: Vec<BudgetRequest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub requester: String,
    pub requested: f64,
    pub allocated: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetResolution {
    /// In allocation order
    pub allocations: Vec<Allocation>,
    pub total_allocated: f64,
    pub remaining_budget: f64,
}

pub fn resolve_budget(conflict: &BudgetConflict) -> Result<BudgetResolution, ConflictError> {
    non_negative("total_budget", "conflict", conflict.total_budget)?;
    for request in &conflict.requests {
        non_negative("amount", &request.requester, request.amount)?;
    }

    let mut ordered: Vec<&BudgetRequest> = conflict.requests.iter().collect();
    ordered.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(b.estimated_roi.total_cmp(&a.estimated_roi))
    });

    let mut remaining = conflict.total_budget;
    let allocations: Vec<Allocation> = ordered
        .into_iter()
        .map(|request| {
            let allocated = request.amount.min(remaining);
            remaining -= allocated;
            Allocation {
                requester: request.requester.clone(),
                requested: request.amount,
                allocated,
            }
        })
        .collect();

    Ok(BudgetResolution {
        total_allocated: conflict.total_budget - remaining,
        remaining_budget: remaining,
        allocations,
    })
}

// ============================================================================
// Timeline
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineTask {
    pub task_id: String,
    /// Days
    pub estimated_duration: f64,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineConflict {
    pub tasks: Vec<TimelineTask>,
    /// Defaults to the time of resolution
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineResolution {
    pub schedule: Vec<ScheduledTask>,
    pub total_duration_days: f64,
}

pub fn resolve_timeline(
    conflict: &TimelineConflict,
    now: DateTime<Utc>,
) -> Result<TimelineResolution, ConflictError> {
    for task in &conflict.tasks {
        non_negative("estimated_duration", &task.task_id, task.estimated_duration)?;
    }

    let mut ordered: Vec<&TimelineTask> = conflict.tasks.iter().collect();
    ordered.sort_by(|a, b| {
        b.dependencies
            .len()
            .cmp(&a.dependencies.len())
            .then(b.priority.cmp(&a.priority))
    });

    let mut cursor = conflict.start_date.unwrap_or(now);
    let mut total_days = 0.0;
    let mut schedule = Vec::with_capacity(ordered.len());
    for task in ordered {
        let start = cursor;
        let end = offset_days(start, task.estimated_duration).ok_or_else(|| {
            ConflictError::InvalidPayload(format!(
                "estimated_duration of '{}' pushes the schedule out of range",
                task.task_id
            ))
        })?;
        cursor = end;
        total_days += task.estimated_duration;
        schedule.push(ScheduledTask {
            task_id: task.task_id.clone(),
            start,
            end,
        });
    }

    Ok(TimelineResolution {
        schedule,
        total_duration_days: total_days,
    })
}

/// `start + days`, or `None` when the result leaves chrono's range.
fn offset_days(start: DateTime<Utc>, days: f64) -> Option<DateTime<Utc>> {
    let millis = (days * 86_400_000.0).round();
    if !millis.is_finite() || millis >= i64::MAX as f64 {
        return None;
    }
    start.checked_add_signed(Duration::try_milliseconds(millis as i64)?)
}

// ============================================================================
// Resource
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceClaim {
    pub requester: String,
    pub resource_type: String,
    pub amount: f64,
    #[serde(default)]
    pub priority: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConflict {
    /// Total available per resource type
    pub resources: BTreeMap<String, f64>,
    pub requests: Vec<ResourceClaim>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceResolution {
    pub allocations: BTreeMap<String, Vec<Allocation>>,
    pub unallocated: BTreeMap<String, f64>,
}

pub fn resolve_resources(conflict: &ResourceConflict) -> Result<ResourceResolution, ConflictError> {
    for (resource, total) in &conflict.resources {
        non_negative("total", resource, *total)?;
    }
    for claim in &conflict.requests {
        non_negative("amount", &claim.requester, claim.amount)?;
    }

    let mut by_type: BTreeMap<&str, Vec<&ResourceClaim>> = BTreeMap::new();
    for claim in &conflict.requests {
        by_type.entry(claim.resource_type.as_str()).or_default().push(claim);
    }

    let mut allocations = BTreeMap::new();
    let mut unallocated: BTreeMap<String, f64> = conflict.resources.clone();

    for (resource, mut claims) in by_type {
        claims.sort_by(|a, b| b.priority.cmp(&a.priority));
        let remaining = unallocated.entry(resource.to_string()).or_insert(0.0);
        let granted: Vec<Allocation> = claims
            .into_iter()
            .map(|claim| {
                let allocated = claim.amount.min(*remaining);
                *remaining -= allocated;
                Allocation {
                    requester: claim.requester.clone(),
                    requested: claim.amount,
                    allocated,
                }
            })
            .collect();
        allocations.insert(resource.to_string(), granted);
    }

    Ok(ResourceResolution {
        allocations,
        unallocated,
    })
}

// ============================================================================
// Strategy
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyCandidate {
    pub name: String,
    #[serde(default)]
    pub market_fit: f64,
    #[serde(default)]
    pub roi_potential: f64,
    #[serde(default)]
    pub feasibility: f64,
    #[serde(default)]
    pub risk_level: f64,
}

impl StrategyCandidate {
    pub fn score(&self) -> f64 {
        0.3 * self.market_fit + 0.3 * self.roi_potential + 0.2 * self.feasibility + 0.2 * self.risk_level
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConflict {
    pub strategies: Vec<StrategyCandidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyScore {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyResolution {
    pub selected: String,
    pub score: f64,
    pub scores: Vec<StrategyScore>,
}

pub fn resolve_strategy(conflict: &StrategyConflict) -> Result<StrategyResolution, ConflictError> {
    let scores: Vec<StrategyScore> = conflict
        .strategies
        .iter()
        .map(|s| StrategyScore {
            name: s.name.clone(),
            score: s.score(),
        })
        .collect();

    // First candidate wins ties.
    let best = scores
        .iter()
        .fold(None::<&StrategyScore>, |best, s| match best {
            Some(b) if b.score >= s.score => Some(b),
            _ => Some(s),
        })
        .ok_or(ConflictError::NoCandidates)?;
    let (selected, score) = (best.name.clone(), best.score);

    Ok(StrategyResolution {
        selected,
        score,
        scores,
    })
}

// ============================================================================
// JSON seam
// ============================================================================

/// Resolver looked up by the bus for a `ConflictAlert`.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, payload: &Value) -> Result<Value, ConflictError>;
}

fn parse<T: DeserializeOwned>(payload: &Value) -> Result<T, ConflictError> {
    Ok(T::deserialize(payload)?)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BudgetResolver;

impl ConflictResolver for BudgetResolver {
    fn resolve(&self, payload: &Value) -> Result<Value, ConflictError> {
        Ok(serde_json::to_value(resolve_budget(&parse(payload)?)?)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TimelineResolver;

impl ConflictResolver for TimelineResolver {
    fn resolve(&self, payload: &Value) -> Result<Value, ConflictError> {
        Ok(serde_json::to_value(resolve_timeline(
            &parse(payload)?,
            Utc::now(),
        )?)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceResolver;

impl ConflictResolver for ResourceResolver {
    fn resolve(&self, payload: &Value) -> Result<Value, ConflictError> {
        Ok(serde_json::to_value(resolve_resources(&parse(payload)?)?)?)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyResolver;

impl ConflictResolver for StrategyResolver {
    fn resolve(&self, payload: &Value) -> Result<Value, ConflictError> {
        Ok(serde_json::to_value(resolve_strategy(&parse(payload)?)?)?)
    }
}

pub fn resolver_for(conflict_type: ConflictType) -> Arc<dyn ConflictResolver> {
    match conflict_type {
        ConflictType::Budget => Arc::new(BudgetResolver),
        ConflictType::Timeline => Arc::new(TimelineResolver),
        ConflictType::Resource => Arc::new(ResourceResolver),
        ConflictType::Strategy => Arc::new(StrategyResolver),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn budget_request(requester: &str, amount: f64, priority: u32, roi: f64) -> BudgetRequest {
        BudgetRequest {
            requester: requester.to_string(),
            amount,
            priority,
            estimated_roi: roi,
        }
    }

    #[test]
    fn test_budget_orders_by_priority_then_roi() {
        let conflict = BudgetConflict {
            total_budget: 1000.0,
            requests: vec![
                budget_request("ads", 400.0, 2, 1.5),
                budget_request("seo", 300.0, 3, 1.1),
                budget_request("email", 500.0, 2, 3.0),
                budget_request("events", 200.0, 1, 9.0),
            ],
        };
        let resolution = resolve_budget(&conflict).unwrap();

        let order: Vec<&str> = resolution.allocations.iter().map(|a| a.requester.as_str()).collect();
        assert_eq!(order, vec!["seo", "email", "ads", "events"]);
        let granted: Vec<f64> = resolution.allocations.iter().map(|a| a.allocated).collect();
        assert_eq!(granted, vec![300.0, 500.0, 200.0, 0.0]);
        assert_eq!(resolution.total_allocated, 1000.0);
        assert_eq!(resolution.remaining_budget, 0.0);
    }

    #[test]
    fn test_budget_rejects_negative_amount() {
        let conflict = BudgetConflict {
            total_budget: 10.0,
            requests: vec![budget_request("x", -1.0, 1, 1.0)],
        };
        assert!(matches!(
            resolve_budget(&conflict),
            Err(ConflictError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_timeline_back_to_back() {
        let start = "2026-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let conflict = TimelineConflict {
            tasks: vec![
                TimelineTask {
                    task_id: "launch".into(),
                    estimated_duration: 1.0,
                    priority: 5,
                    dependencies: vec![],
                },
                TimelineTask {
                    task_id: "build".into(),
                    estimated_duration: 2.5,
                    priority: 1,
                    dependencies: vec!["design".into(), "budget".into()],
                },
                TimelineTask {
                    task_id: "design".into(),
                    estimated_duration: 3.0,
                    priority: 2,
                    dependencies: vec!["research".into()],
                },
            ],
            start_date: None,
        };

        let resolution = resolve_timeline(&conflict, start).unwrap();
        let ids: Vec<&str> = resolution.schedule.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["build", "design", "launch"]);
        assert_eq!(resolution.schedule[0].start, start);
        assert_eq!(resolution.schedule[1].start, resolution.schedule[0].end);
        assert_eq!(resolution.schedule[0].end, start + Duration::hours(60));
        assert_eq!(resolution.total_duration_days, 6.5);
    }

    #[test]
    fn test_timeline_out_of_range_is_rejected() {
        let conflict = TimelineConflict {
            tasks: vec![TimelineTask {
                task_id: "forever".into(),
                estimated_duration: 1.0e9,
                priority: 1,
                dependencies: vec![],
            }],
            start_date: None,
        };
        assert!(matches!(
            resolve_timeline(&conflict, Utc::now()),
            Err(ConflictError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_resources_allocated_per_type() {
        let conflict: ResourceConflict = serde_json::from_value(json!({
            "resources": {"compute": 100.0, "memory": 64.0},
            "requests": [
                {"requester": "a", "resource_type": "compute", "amount": 80.0, "priority": 1},
                {"requester": "b", "resource_type": "compute", "amount": 50.0, "priority": 2},
                {"requester": "c", "resource_type": "memory", "amount": 32.0, "priority": 1},
                {"requester": "d", "resource_type": "gpu", "amount": 1.0, "priority": 9}
            ]
        }))
        .unwrap();

        let resolution = resolve_resources(&conflict).unwrap();
        let compute = &resolution.allocations["compute"];
        assert_eq!(compute[0].requester, "b");
        assert_eq!(compute[0].allocated, 50.0);
        assert_eq!(compute[1].allocated, 50.0);
        assert_eq!(resolution.unallocated["compute"], 0.0);
        assert_eq!(resolution.unallocated["memory"], 32.0);
        assert_eq!(resolution.allocations["gpu"][0].allocated, 0.0);
    }

    #[test]
    fn test_strategy_weighted_score() {
        let resolver = StrategyResolver;
        let decision = resolver
            .resolve(&json!({
                "strategies": [
                    {"name": "premium", "market_fit": 0.9, "roi_potential": 0.4, "feasibility": 0.5, "risk_level": 0.5},
                    {"name": "freemium", "market_fit": 0.7, "roi_potential": 0.8, "feasibility": 0.9, "risk_level": 0.6}
                ]
            }))
            .unwrap();
        assert_eq!(decision["selected"], "freemium");
        let score = decision["score"].as_f64().unwrap();
        assert!((score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_strategy_requires_candidates() {
        let result = resolve_strategy(&StrategyConflict { strategies: vec![] });
        assert!(matches!(result, Err(ConflictError::NoCandidates)));
    }

    #[test]
    fn test_conflict_type_parse() {
        assert_eq!("timeline".parse::<ConflictType>().unwrap(), ConflictType::Timeline);
        assert!(matches!(
            "weather".parse::<ConflictType>(),
            Err(ConflictError::UnknownConflictType(_))
        ));
    }
}
