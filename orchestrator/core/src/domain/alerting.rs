// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Alerting Port
//!
//! External visibility for error and conflict alerts (chat webhook, email,
//! pager). Implementations live in `crate::infrastructure::alerting`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn notify(&self, message: &str, severity: AlertSeverity) -> Result<(), AlertError>;
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Alert delivery failed: {0}")]
    Delivery(String),

    #[error("Alert endpoint returned status {0}")]
    Status(u16),
}
