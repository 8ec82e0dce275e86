// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Telemetry adapters
//!
//! [`TracingMetricsSink`] records each finished run as `metrics` gauges
//! labelled by run name, plus one structured tracing event. The gauges surface
//! through whichever recorder the binary installs (Prometheus in the CLI).

use crate::domain::telemetry::{MetricsSink, SinkError};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetricsSink;

impl TracingMetricsSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MetricsSink for TracingMetricsSink {
    async fn log_run(
        &self,
        name: &str,
        metrics: &HashMap<String, f64>,
        params: &HashMap<String, String>,
        tags: &HashMap<String, String>,
    ) -> Result<String, SinkError> {
        if name.is_empty() {
            return Err(SinkError::Rejected("run name cannot be empty".to_string()));
        }

        let run_id = Uuid::new_v4().to_string();
        for (key, value) in metrics {
            metrics::gauge!(
                "autoflow_run_metric",
                "run" => name.to_string(),
                "metric" => key.clone()
            )
            .set(*value);
        }

        info!(
            run_id = %run_id,
            run = name,
            metrics = ?metrics,
            params = ?params,
            tags = ?tags,
            "Run recorded"
        );
        Ok(run_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_run_returns_distinct_ids() {
        let sink = TracingMetricsSink::new();
        let metrics = HashMap::from([("duration_ms".to_string(), 12.0)]);
        let a = sink
            .log_run("etl", &metrics, &HashMap::new(), &HashMap::new())
            .await
            .unwrap();
        let b = sink
            .log_run("etl", &metrics, &HashMap::new(), &HashMap::new())
            .await
            .unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let result = TracingMetricsSink
            .log_run("", &HashMap::new(), &HashMap::new(), &HashMap::new())
            .await;
        assert!(matches!(result, Err(SinkError::Rejected(_))));
    }
}
