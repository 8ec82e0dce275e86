// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Alert channel adapters
//!
//! - [`LogAlertChannel`] writes alerts to the tracing pipeline.
//! - [`WebhookAlertChannel`] posts `{"text", "severity"}` JSON to a chat-style
//!   incoming webhook.

use crate::domain::alerting::{AlertChannel, AlertError, AlertSeverity};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    async fn notify(&self, message: &str, severity: AlertSeverity) -> Result<(), AlertError> {
        match severity {
            AlertSeverity::Info => info!(alert = message, "Alert"),
            AlertSeverity::Warning => warn!(alert = message, "Alert"),
            AlertSeverity::Critical => error!(alert = message, "Alert"),
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
    severity: AlertSeverity,
}

#[derive(Debug, Clone)]
pub struct WebhookAlertChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertChannel {
    pub fn new(url: impl Into<String>) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .map_err(|e| AlertError::Delivery(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertChannel for WebhookAlertChannel {
    async fn notify(&self, message: &str, severity: AlertSeverity) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload {
                text: message,
                severity,
            })
            .send()
            .await
            .map_err(|e| AlertError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %self.url, status = status.as_u16(), "Webhook rejected alert");
            return Err(AlertError::Status(status.as_u16()));
        }
        Ok(())
    }
}
