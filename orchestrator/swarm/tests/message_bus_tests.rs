// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the message bus
//!
//! Cover the typed handlers (data share, resource request, conflict alert),
//! TTL expiry, delivery to inboxes and the background dispatch loop.

use async_trait::async_trait;
use autoflow_core::domain::alerting::{AlertChannel, AlertError, AlertSeverity};
use autoflow_core::domain::engine_config::BusSettings;
use autoflow_swarm::application::{MessageBus, BUS_SENDER};
use autoflow_swarm::domain::conflict::{resolve_budget, BudgetConflict, BudgetRequest};
use autoflow_swarm::domain::{AgentMessage, MessagePriority, MessageType};
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn bus() -> MessageBus {
    MessageBus::new(BusSettings::default()).unwrap()
}

fn object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

#[derive(Default)]
struct RecordingChannel {
    alerts: Mutex<Vec<(String, AlertSeverity)>>,
}

#[async_trait]
impl AlertChannel for RecordingChannel {
    async fn notify(&self, message: &str, severity: AlertSeverity) -> Result<(), AlertError> {
        self.alerts.lock().push((message.to_string(), severity));
        Ok(())
    }
}

#[tokio::test]
async fn test_data_share_merges_into_shared_context() {
    let bus = bus();
    bus.send(
        "analyst",
        vec![],
        MessageType::DataShare,
        json!({"data_key": "x", "data_value": {"n": 1}}),
        MessagePriority::Normal,
    );
    bus.send(
        "planner",
        vec![],
        MessageType::DataShare,
        json!({"data_key": "x", "data_value": {"m": 2}}),
        MessagePriority::Normal,
    );
    assert_eq!(bus.dispatch_pending().await, 2);

    let entry = bus.get_shared_context("global", "x").unwrap();
    assert_eq!(Value::Object(entry.data), json!({"n": 1, "m": 2}));
    assert!(entry.access_count >= 2);
}

#[tokio::test]
async fn test_data_share_respects_scope_and_wraps_scalars() {
    let bus = bus();
    bus.send(
        "analyst",
        vec![],
        MessageType::DataShare,
        json!({"data_key": "rate", "scope_id": "campaign-7", "data_value": 0.42}),
        MessagePriority::Low,
    );
    bus.dispatch_pending().await;

    assert!(bus.get_shared_context("global", "rate").is_none());
    let entry = bus.get_shared_context("campaign-7", "rate").unwrap();
    assert_eq!(entry.data["value"], json!(0.42));
}

#[test]
fn test_set_shared_context_merges() {
    let bus = bus();
    bus.set_shared_context("s", "k", object(json!({"a": 1})), None);
    bus.set_shared_context("s", "k", object(json!({"b": 2})), None);

    let entry = bus.get_shared_context("s", "k").unwrap();
    assert_eq!(Value::Object(entry.data), json!({"a": 1, "b": 2}));
}

#[tokio::test]
async fn test_resource_request_partial_grant_is_allocated() {
    let bus = bus();
    let mut inbox = bus.register_agent("growth", "marketing");
    bus.send(
        "growth",
        vec![],
        MessageType::ResourceRequest,
        json!({"resource_type": "budget", "amount": 150.0}),
        MessagePriority::Normal,
    );
    assert_eq!(bus.dispatch_pending().await, 2);

    let response = inbox.try_recv().unwrap();
    assert_eq!(response.message_type, MessageType::ResourceResponse);
    assert_eq!(response.sender, BUS_SENDER);
    assert_eq!(response.priority, MessagePriority::High);
    assert_eq!(response.content["requested_amount"], json!(150.0));
    assert_eq!(response.content["allocated_amount"], json!(100.0));
    assert_eq!(response.content["status"], "allocated");
    assert_eq!(bus.available_resource("budget"), 0.0);
}

#[tokio::test]
async fn test_resource_request_for_exhausted_pool_is_denied() {
    let bus = bus();
    let mut inbox = bus.register_agent("ops", "operations");
    for _ in 0..2 {
        bus.send(
            "ops",
            vec![],
            MessageType::ResourceRequest,
            json!({"resource_type": "memory", "amount": 100.0}),
            MessagePriority::Normal,
        );
    }
    bus.dispatch_pending().await;

    let first = inbox.try_recv().unwrap();
    let second = inbox.try_recv().unwrap();
    assert_eq!(first.content["status"], "allocated");
    assert_eq!(second.content["status"], "denied");
    assert_eq!(second.content["allocated_amount"], json!(0.0));
}

#[tokio::test]
async fn test_expired_message_is_dropped() {
    let bus = bus();
    let mut inbox = bus.register_agent("writer", "content");

    let mut stale = AgentMessage::new(
        "planner",
        vec!["writer".into()],
        MessageType::StatusUpdate,
        json!({"stage": "late"}),
    )
    .with_ttl(1);
    stale.created_at = Utc::now() - ChronoDuration::seconds(10);
    bus.submit(stale);

    bus.send(
        "planner",
        vec!["writer".into()],
        MessageType::StatusUpdate,
        json!({"stage": "fresh"}),
        MessagePriority::Normal,
    );
    bus.dispatch_pending().await;

    let delivered = inbox.try_recv().unwrap();
    assert_eq!(delivered.content["stage"], "fresh");
    assert!(inbox.try_recv().is_none());

    let counters = bus.get_bus_status().counters;
    assert_eq!(counters.expired, 1);
    assert_eq!(counters.dispatched, 1);
    assert_eq!(bus.recent_messages().len(), 1);
}

#[tokio::test]
async fn test_expired_data_share_never_reaches_context() {
    let bus = bus();
    let mut stale = AgentMessage::new(
        "analyst",
        vec![],
        MessageType::DataShare,
        json!({"data_key": "x", "data_value": {"n": 1}}),
    )
    .with_ttl(0);
    stale.created_at = Utc::now() - ChronoDuration::milliseconds(50);
    bus.submit(stale);
    bus.dispatch_pending().await;

    assert!(bus.get_shared_context("global", "x").is_none());
}

#[tokio::test]
async fn test_conflict_alert_produces_decision_response() {
    let bus = bus();
    let mut finance = bus.register_agent("finance", "finance");
    let mut marketing = bus.register_agent("marketing", "marketing");

    let alert = bus.send(
        "planner",
        vec!["finance".into(), "marketing".into()],
        MessageType::ConflictAlert,
        json!({
            "conflict_type": "budget",
            "total_budget": 100.0,
            "requests": [
                {"requester": "seo", "amount": 60.0, "priority": 1, "estimated_roi": 2.0},
                {"requester": "ads", "amount": 50.0, "priority": 3, "estimated_roi": 1.0},
                {"requester": "events", "amount": 40.0, "priority": 3, "estimated_roi": 5.0}
            ]
        }),
        MessagePriority::Normal,
    );
    assert_eq!(bus.dispatch_pending().await, 2);

    for inbox in [&mut finance, &mut marketing] {
        let decision = inbox.try_recv().unwrap();
        assert_eq!(decision.message_type, MessageType::DecisionResponse);
        assert_eq!(decision.response_to, Some(alert));
        assert_eq!(decision.content["conflict_type"], "budget");

        let allocations = decision.content["resolution"]["allocations"]
            .as_array()
            .unwrap();
        let order: Vec<&str> = allocations
            .iter()
            .map(|a| a["requester"].as_str().unwrap())
            .collect();
        assert_eq!(order, vec!["events", "ads", "seo"]);
        assert_eq!(allocations[2]["allocated"], json!(10.0));
    }
    assert_eq!(bus.get_bus_status().counters.conflicts_resolved, 1);
}

#[tokio::test]
async fn test_conflict_alert_with_unknown_type_is_ignored() {
    let bus = bus();
    let mut finance = bus.register_agent("finance", "finance");
    bus.send(
        "planner",
        vec!["finance".into()],
        MessageType::ConflictAlert,
        json!({"conflict_type": "staffing"}),
        MessagePriority::Normal,
    );
    assert_eq!(bus.dispatch_pending().await, 1);
    assert!(finance.try_recv().is_none());
}

#[tokio::test]
async fn test_out_of_range_timeline_does_not_stop_dispatch() {
    let bus = Arc::new(bus());
    let mut finance = bus.register_agent("finance", "finance");

    bus.send(
        "planner",
        vec!["finance".into()],
        MessageType::ConflictAlert,
        json!({
            "conflict_type": "timeline",
            "tasks": [{"task_id": "t", "estimated_duration": 1.0e9}]
        }),
        MessagePriority::Normal,
    );
    bus.send(
        "planner",
        vec!["finance".into()],
        MessageType::StatusUpdate,
        json!({"stage": "after"}),
        MessagePriority::Normal,
    );

    assert_eq!(bus.dispatch_pending().await, 2);
    let next = finance.try_recv().unwrap();
    assert_eq!(next.message_type, MessageType::StatusUpdate);
    assert!(finance.try_recv().is_none());
    assert_eq!(bus.get_bus_status().counters.conflicts_resolved, 0);
}

#[test]
fn test_budget_resolution_is_deterministic() {
    let conflict = BudgetConflict {
        total_budget: 100.0,
        requests: vec![
            BudgetRequest {
                requester: "a".into(),
                amount: 70.0,
                priority: 2,
                estimated_roi: 1.5,
            },
            BudgetRequest {
                requester: "b".into(),
                amount: 30.0,
                priority: 2,
                estimated_roi: 3.0,
            },
            BudgetRequest {
                requester: "c".into(),
                amount: 90.0,
                priority: 5,
                estimated_roi: 0.1,
            },
        ],
    };

    let first = resolve_budget(&conflict).unwrap();
    let second = resolve_budget(&conflict).unwrap();
    assert_eq!(first, second);

    let order: Vec<&str> = first.allocations.iter().map(|a| a.requester.as_str()).collect();
    assert_eq!(order, vec!["c", "b", "a"]);

    let total: f64 = first.allocations.iter().map(|a| a.allocated).sum();
    assert!(total <= conflict.total_budget);
    assert_eq!(first.total_allocated, 100.0);
    assert_eq!(first.remaining_budget, 0.0);
}

#[tokio::test]
async fn test_broadcast_excludes_sender() {
    let bus = bus();
    let mut ceo = bus.register_agent("ceo", "executive");
    let mut cfo = bus.register_agent("cfo", "finance");
    let mut cmo = bus.register_agent("cmo", "marketing");

    bus.broadcast(
        "ceo",
        MessageType::StatusUpdate,
        json!({"quarter": "Q3"}),
        MessagePriority::Normal,
    );
    bus.dispatch_pending().await;

    assert!(ceo.try_recv().is_none());
    let to_cfo = cfo.try_recv().unwrap();
    assert_eq!(to_cfo.recipients, vec!["cfo", "cmo"]);
    assert!(cmo.try_recv().is_some());
}

#[tokio::test]
async fn test_background_loop_delivers_until_stopped() {
    let settings = BusSettings {
        poll_interval: Duration::from_millis(10),
        ..BusSettings::default()
    };
    let bus = Arc::new(MessageBus::new(settings).unwrap());
    let mut inbox = bus.register_agent("writer", "content");

    assert_ok!(bus.start());
    assert!(bus.is_running());
    assert_err!(bus.start());

    bus.send(
        "planner",
        vec!["writer".into()],
        MessageType::DecisionRequest,
        json!({"question": "ship?"}),
        MessagePriority::High,
    );
    let received = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received.content["question"], "ship?");

    bus.stop().await;
    assert!(!bus.is_running());

    bus.send(
        "planner",
        vec!["writer".into()],
        MessageType::StatusUpdate,
        json!({}),
        MessagePriority::Normal,
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(inbox.try_recv().is_none());
    assert_eq!(bus.get_bus_status().queue_depth, 1);
}

#[tokio::test]
async fn test_high_priority_alerts_are_forwarded() {
    let channel = Arc::new(RecordingChannel::default());
    let bus = bus().with_alert_channel(channel.clone());

    bus.send(
        "crawler",
        vec![],
        MessageType::ErrorAlert,
        json!({"message": "crawler lost its session"}),
        MessagePriority::Critical,
    );
    bus.send(
        "crawler",
        vec![],
        MessageType::ErrorAlert,
        json!({"message": "minor hiccup"}),
        MessagePriority::Low,
    );
    bus.dispatch_pending().await;

    let alerts = channel.alerts.lock();
    assert_eq!(alerts.len(), 1);
    assert!(alerts[0].0.contains("crawler lost its session"));
    assert_eq!(alerts[0].1, AlertSeverity::Critical);
}
