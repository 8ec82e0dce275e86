// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Step Failure Taxonomy
//!
//! Every unit of work returns a tagged result: either a JSON value or a
//! [`StepError`] carrying a [`FailureKind`]. The kind drives which recovery
//! strategy the healing layer selects for a critical step.
//!
//! Timeouts are detected by the step executor (never raised by the unit
//! itself); panics inside a unit are reported as [`FailureKind::AgentFailure`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Classification of a failed step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    ResourceExhaustion,
    DependencyFailure,
    AgentFailure,
    NetworkError,
    Unknown,
}

impl FailureKind {
    pub const ALL: [FailureKind; 6] = [
        FailureKind::Timeout,
        FailureKind::ResourceExhaustion,
        FailureKind::DependencyFailure,
        FailureKind::AgentFailure,
        FailureKind::NetworkError,
        FailureKind::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Timeout => "timeout",
            FailureKind::ResourceExhaustion => "resource_exhaustion",
            FailureKind::DependencyFailure => "dependency_failure",
            FailureKind::AgentFailure => "agent_failure",
            FailureKind::NetworkError => "network_error",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown failure kind '{}'", s))
    }
}

/// Error returned by a unit of work (or synthesised by the executor).
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct StepError {
    pub kind: FailureKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Ordinary business failure of the unit.
    pub fn agent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AgentFailure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NetworkError, message)
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ResourceExhaustion, message)
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::new(FailureKind::DependencyFailure, message)
    }
}
