// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Messages
//!
//! Typed envelope carried by the [`MessageBus`](crate::application::MessageBus).
//!
//! A message is created by a sender, enqueued, dispatched exactly once by the
//! bus and then discarded. A message older than its TTL at dispatch time is
//! dropped without being delivered.

use super::older_than;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    DataShare,
    DecisionRequest,
    DecisionResponse,
    ConflictAlert,
    ResourceRequest,
    ResourceResponse,
    StatusUpdate,
    ErrorAlert,
    SuccessNotification,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::DataShare => "data_share",
            MessageType::DecisionRequest => "decision_request",
            MessageType::DecisionResponse => "decision_response",
            MessageType::ConflictAlert => "conflict_alert",
            MessageType::ResourceRequest => "resource_request",
            MessageType::ResourceResponse => "resource_response",
            MessageType::StatusUpdate => "status_update",
            MessageType::ErrorAlert => "error_alert",
            MessageType::SuccessNotification => "success_notification",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Informational urgency. The bus dispatches in FIFO order regardless.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl MessagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagePriority::Low => "low",
            MessagePriority::Normal => "normal",
            MessagePriority::High => "high",
            MessagePriority::Critical => "critical",
        }
    }
}

impl std::fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessagePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(MessagePriority::Low),
            "normal" => Ok(MessagePriority::Normal),
            "high" => Ok(MessagePriority::High),
            "critical" => Ok(MessagePriority::Critical),
            other => Err(format!("unknown message priority '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: MessageId,
    pub sender: String,
    pub recipients: Vec<String>,
    pub message_type: MessageType,
    pub priority: MessagePriority,
    pub content: Value,
    pub created_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    #[serde(default)]
    pub requires_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_to: Option<MessageId>,
}

impl AgentMessage {
    pub const DEFAULT_TTL_SECONDS: u64 = 300;

    pub fn new(
        sender: impl Into<String>,
        recipients: Vec<String>,
        message_type: MessageType,
        content: Value,
    ) -> Self {
        Self {
            id: MessageId::new(),
            sender: sender.into(),
            recipients,
            message_type,
            priority: MessagePriority::Normal,
            content,
            created_at: Utc::now(),
            ttl_seconds: Self::DEFAULT_TTL_SECONDS,
            requires_response: false,
            response_to: None,
        }
    }

    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn requiring_response(mut self) -> Self {
        self.requires_response = true;
        self
    }

    pub fn in_response_to(mut self, id: MessageId) -> Self {
        self.response_to = Some(id);
        self
    }

    /// Age strictly greater than the TTL.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        older_than(self.created_at, now, self.ttl_seconds)
    }

    /// String field of an object payload.
    pub fn content_str(&self, field: &str) -> Option<&str> {
        self.content.get(field).and_then(Value::as_str)
    }
}
