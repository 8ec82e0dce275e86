// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Telemetry Ports
//!
//! - [`MetricsSink`]: experiment-tracker style sink called once per finished
//!   execution (`log_run`). Sink failures never fail the workflow.
//! - [`SystemProbe`]: host resource readings used to build the anomaly feature
//!   vector.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Record one run and return the sink's run id.
    async fn log_run(
        &self,
        name: &str,
        metrics: &HashMap<String, f64>,
        params: &HashMap<String, String>,
        tags: &HashMap<String, String>,
    ) -> Result<String, SinkError>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink unavailable: {0}")]
    Unavailable(String),

    #[error("Sink rejected run: {0}")]
    Rejected(String),
}

/// Resource utilisation as fractions in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceSample {
    pub cpu: f64,
    pub memory: f64,
}

pub trait SystemProbe: Send + Sync {
    fn sample(&self) -> ResourceSample;
}

/// Probe that always reports zero utilisation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProbe;

impl SystemProbe for NullProbe {
    fn sample(&self) -> ResourceSample {
        ResourceSample::default()
    }
}
