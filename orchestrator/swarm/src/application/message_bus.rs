// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Message Bus Application Service
//!
//! Asynchronous point-to-point and broadcast messaging between agents, plus
//! the handlers that act on typed messages.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Own the message queue, agent registrations, resource pool and shared context
//! - **Dependencies:** Domain (messages, shared context, conflict resolvers), core alerting port
//!
//! # Dispatch
//!
//! `send` only enqueues. Messages are dispatched one at a time in FIFO order,
//! either by the background loop started with [`MessageBus::start`] or by an
//! explicit [`MessageBus::dispatch_pending`]. Both paths share one dispatch
//! lock, so handlers never run concurrently.
//!
//! | Type | Handling |
//! |------|----------|
//! | `ConflictAlert` | resolver keyed by `conflict_type`, `DecisionResponse` to the recipients |
//! | `DataShare` | merge `data_value` into the shared context under `data_key` |
//! | `ResourceRequest` | grant `min(amount, available)`, `ResourceResponse` to the sender |
//! | anything else | delivered to the inbox of each registered recipient |
//!
//! A message older than its TTL when dequeued is dropped and logged.

use crate::domain::conflict::{resolver_for, ConflictResolver, ConflictType};
use crate::domain::message::{AgentMessage, MessageId, MessagePriority, MessageType};
use crate::domain::shared_context::{SharedContextEntry, SharedContextStore};
use autoflow_core::domain::alerting::{AlertChannel, AlertSeverity};
use autoflow_core::domain::engine_config::BusSettings;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sender id used on replies generated by the bus itself.
pub const BUS_SENDER: &str = "message_bus";

#[derive(Debug, Error)]
pub enum MessageBusError {
    #[error("Message bus is already running")]
    AlreadyRunning,

    #[error("Invalid bus configuration: {0}")]
    InvalidConfig(String),
}

/// Receiving end handed out by [`MessageBus::register_agent`].
#[derive(Debug)]
pub struct AgentInbox {
    agent_id: String,
    receiver: mpsc::UnboundedReceiver<AgentMessage>,
}

impl AgentInbox {
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Waits for the next message; `None` once the agent is unregistered.
    pub async fn recv(&mut self) -> Option<AgentMessage> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<AgentMessage> {
        self.receiver.try_recv().ok()
    }
}

struct RegisteredAgent {
    agent_type: String,
    inbox: mpsc::UnboundedSender<AgentMessage>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BusCounters {
    pub sent: u64,
    pub dispatched: u64,
    pub expired: u64,
    pub delivered: u64,
    pub skipped_recipients: u64,
    pub conflicts_resolved: u64,
    pub resource_requests: u64,
    pub alerts_forwarded: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BusStatus {
    pub running: bool,
    pub queue_depth: usize,
    pub registered_agents: usize,
    pub agents_by_type: BTreeMap<String, Vec<String>>,
    pub shared_context_entries: usize,
    pub resources: BTreeMap<String, f64>,
    pub conflict_types: Vec<String>,
    pub counters: BusCounters,
}

pub struct MessageBus {
    settings: BusSettings,
    alert_min_priority: MessagePriority,
    alert_channel: Option<Arc<dyn AlertChannel>>,

    queue: Mutex<VecDeque<AgentMessage>>,
    notify: Notify,
    dispatch_lock: tokio::sync::Mutex<()>,

    agents: RwLock<HashMap<String, RegisteredAgent>>,
    resources: Mutex<HashMap<String, f64>>,
    resolvers: RwLock<HashMap<String, Arc<dyn ConflictResolver>>>,
    context: SharedContextStore,
    history: Mutex<VecDeque<AgentMessage>>,
    counters: Mutex<BusCounters>,

    running: AtomicBool,
    shutdown: Mutex<CancellationToken>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MessageBus {
    pub fn new(settings: BusSettings) -> Result<Self, MessageBusError> {
        let alert_min_priority = settings
            .alert_min_priority
            .parse::<MessagePriority>()
            .map_err(MessageBusError::InvalidConfig)?;

        let resolvers = ConflictType::ALL
            .into_iter()
            .map(|t| (t.as_str().to_string(), resolver_for(t)))
            .collect();

        Ok(Self {
            alert_min_priority,
            alert_channel: None,
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dispatch_lock: tokio::sync::Mutex::new(()),
            agents: RwLock::new(HashMap::new()),
            resources: Mutex::new(settings.resources.clone()),
            resolvers: RwLock::new(resolvers),
            context: SharedContextStore::new(settings.context_ttl_seconds),
            history: Mutex::new(VecDeque::new()),
            counters: Mutex::new(BusCounters::default()),
            running: AtomicBool::new(false),
            shutdown: Mutex::new(CancellationToken::new()),
            task: Mutex::new(None),
            settings,
        })
    }

    pub fn with_alert_channel(mut self, channel: Arc<dyn AlertChannel>) -> Self {
        self.alert_channel = Some(channel);
        self
    }

    pub fn settings(&self) -> &BusSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Spawn the dispatch loop.
    pub fn start(self: &Arc<Self>) -> Result<(), MessageBusError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MessageBusError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        *self.shutdown.lock() = token.clone();

        let bus = Arc::clone(self);
        let handle = tokio::spawn(async move {
            bus.run(token).await;
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Cancel the dispatch loop and wait for it to exit. Queued messages stay
    /// queued.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shutdown.lock().cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Message bus dispatch task failed: {}", e);
                }
            }
        }
        info!("Message bus stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run(&self, token: CancellationToken) {
        info!(
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "Message bus dispatch loop started"
        );

        loop {
            self.dispatch_pending().await;

            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Shutdown signal received, stopping dispatch loop");
                    break;
                }
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }
    }

    /// Dispatch everything currently queued, including replies generated
    /// while draining. Returns the number of messages processed.
    pub async fn dispatch_pending(&self) -> usize {
        let _dispatch = self.dispatch_lock.lock().await;
        let mut processed = 0;

        loop {
            let next = self.queue.lock().pop_front();
            let Some(message) = next else {
                break;
            };
            self.process(message).await;
            processed += 1;
        }

        processed
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    pub fn send(
        &self,
        sender: impl Into<String>,
        recipients: Vec<String>,
        message_type: MessageType,
        content: Value,
        priority: MessagePriority,
    ) -> MessageId {
        let message = AgentMessage::new(sender, recipients, message_type, content)
            .with_priority(priority)
            .with_ttl(self.settings.default_ttl_seconds);
        self.submit(message)
    }

    /// Enqueue a fully built message.
    pub fn submit(&self, message: AgentMessage) -> MessageId {
        let id = message.id;
        debug!(
            message_id = %id,
            message_type = %message.message_type,
            sender = %message.sender,
            recipients = message.recipients.len(),
            "Message enqueued"
        );
        self.queue.lock().push_back(message);
        self.counters.lock().sent += 1;
        self.notify.notify_one();
        id
    }

    /// Send to every registered agent except the sender.
    pub fn broadcast(
        &self,
        sender: impl Into<String>,
        message_type: MessageType,
        content: Value,
        priority: MessagePriority,
    ) -> MessageId {
        let sender = sender.into();
        let mut recipients: Vec<String> = self
            .agents
            .read()
            .keys()
            .filter(|id| **id != sender)
            .cloned()
            .collect();
        recipients.sort();
        self.send(sender, recipients, message_type, content, priority)
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register `agent_id` under `agent_type`. Re-registering replaces the
    /// previous inbox.
    pub fn register_agent(
        &self,
        agent_id: impl Into<String>,
        agent_type: impl Into<String>,
    ) -> AgentInbox {
        let agent_id = agent_id.into();
        let agent_type = agent_type.into();
        let (tx, rx) = mpsc::unbounded_channel();

        info!(agent_id = %agent_id, agent_type = %agent_type, "Agent registered");
        self.agents.write().insert(
            agent_id.clone(),
            RegisteredAgent {
                agent_type,
                inbox: tx,
            },
        );

        AgentInbox {
            agent_id,
            receiver: rx,
        }
    }

    pub fn unregister_agent(&self, agent_id: &str) -> bool {
        let removed = self.agents.write().remove(agent_id).is_some();
        if removed {
            info!(agent_id = %agent_id, "Agent unregistered");
        }
        removed
    }

    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.agents.read().contains_key(agent_id)
    }

    /// Replace or add the resolver used for `conflict_type`.
    pub fn register_resolver(
        &self,
        conflict_type: impl Into<String>,
        resolver: Arc<dyn ConflictResolver>,
    ) {
        self.resolvers.write().insert(conflict_type.into(), resolver);
    }

    // ------------------------------------------------------------------
    // Shared context and resources
    // ------------------------------------------------------------------

    pub fn get_shared_context(&self, scope_id: &str, key: &str) -> Option<SharedContextEntry> {
        self.context.get(scope_id, key)
    }

    pub fn set_shared_context(
        &self,
        scope_id: &str,
        key: &str,
        data: Map<String, Value>,
        ttl_seconds: Option<u64>,
    ) -> SharedContextEntry {
        self.context.set(scope_id, key, data, ttl_seconds)
    }

    pub fn shared_context(&self) -> &SharedContextStore {
        &self.context
    }

    pub fn purge_expired_context(&self) -> usize {
        let purged = self.context.purge_expired();
        if purged > 0 {
            debug!(purged, "Purged expired shared context entries");
        }
        purged
    }

    pub fn available_resource(&self, resource_type: &str) -> f64 {
        self.resources.lock().get(resource_type).copied().unwrap_or(0.0)
    }

    /// Return units to the pool; returns the new available amount.
    pub fn release_resource(&self, resource_type: &str, amount: f64) -> f64 {
        let mut resources = self.resources.lock();
        let available = resources.entry(resource_type.to_string()).or_insert(0.0);
        if amount.is_finite() && amount > 0.0 {
            *available += amount;
        }
        *available
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn get_bus_status(&self) -> BusStatus {
        let mut agents_by_type: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let registered_agents = {
            let agents = self.agents.read();
            for (id, agent) in agents.iter() {
                agents_by_type
                    .entry(agent.agent_type.clone())
                    .or_default()
                    .push(id.clone());
            }
            agents.len()
        };
        for ids in agents_by_type.values_mut() {
            ids.sort();
        }

        let mut conflict_types: Vec<String> = self.resolvers.read().keys().cloned().collect();
        conflict_types.sort();

        BusStatus {
            running: self.is_running(),
            queue_depth: self.queue.lock().len(),
            registered_agents,
            agents_by_type,
            shared_context_entries: self.context.len(),
            resources: self
                .resources
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            conflict_types,
            counters: self.counters.lock().clone(),
        }
    }

    /// Recently dispatched messages, oldest first.
    pub fn recent_messages(&self) -> Vec<AgentMessage> {
        self.history.lock().iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    async fn process(&self, message: AgentMessage) {
        let now = Utc::now();
        if message.is_expired_at(now) {
            warn!(
                message_id = %message.id,
                message_type = %message.message_type,
                sender = %message.sender,
                age_ms = now.signed_duration_since(message.created_at).num_milliseconds(),
                ttl_seconds = message.ttl_seconds,
                "Dropping expired message"
            );
            self.counters.lock().expired += 1;
            metrics::counter!("autoflow_bus_messages_total", "outcome" => "expired").increment(1);
            return;
        }

        debug!(
            message_id = %message.id,
            message_type = %message.message_type,
            priority = %message.priority,
            "Dispatching message"
        );

        match message.message_type {
            MessageType::ConflictAlert => self.handle_conflict(&message),
            MessageType::DataShare => self.handle_data_share(&message),
            MessageType::ResourceRequest => self.handle_resource_request(&message),
            _ => self.deliver(&message),
        }

        if matches!(
            message.message_type,
            MessageType::ConflictAlert | MessageType::ErrorAlert
        ) {
            self.forward_alert(&message).await;
        }

        self.counters.lock().dispatched += 1;
        metrics::counter!("autoflow_bus_messages_total", "outcome" => "dispatched").increment(1);

        let mut history = self.history.lock();
        history.push_back(message);
        while history.len() > self.settings.history_limit {
            history.pop_front();
        }
    }

    fn handle_conflict(&self, message: &AgentMessage) {
        let Some(conflict_type) = message.content_str("conflict_type") else {
            warn!(message_id = %message.id, "Conflict alert without conflict_type");
            return;
        };

        let resolver = self.resolvers.read().get(conflict_type).cloned();
        let Some(resolver) = resolver else {
            warn!(message_id = %message.id, conflict_type, "No resolver for conflict type");
            return;
        };

        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| resolver.resolve(&message.content)));
        let Ok(outcome) = outcome else {
            warn!(message_id = %message.id, conflict_type, "Conflict resolver panicked");
            return;
        };

        match outcome {
            Ok(resolution) => {
                info!(message_id = %message.id, conflict_type, "Conflict resolved");
                self.counters.lock().conflicts_resolved += 1;
                let reply = AgentMessage::new(
                    BUS_SENDER,
                    message.recipients.clone(),
                    MessageType::DecisionResponse,
                    json!({
                        "conflict_type": conflict_type,
                        "resolution": resolution,
                        "original_message_id": message.id,
                    }),
                )
                .with_priority(MessagePriority::High)
                .with_ttl(self.settings.default_ttl_seconds)
                .in_response_to(message.id);
                self.submit(reply);
            }
            Err(e) => {
                warn!(message_id = %message.id, conflict_type, "Conflict resolution failed: {}", e);
            }
        }
    }

    fn handle_data_share(&self, message: &AgentMessage) {
        let Some(key) = message.content_str("data_key") else {
            warn!(message_id = %message.id, "Data share without data_key");
            return;
        };
        let scope = message
            .content_str("scope_id")
            .unwrap_or(self.settings.default_scope.as_str());

        let data = match message.content.get("data_value") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => {
                warn!(message_id = %message.id, data_key = key, "Data share without data_value");
                return;
            }
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        let ttl = message.content.get("ttl_seconds").and_then(Value::as_u64);

        self.context.set(scope, key, data, ttl);
        self.context.touch(scope, key);
        debug!(scope_id = scope, data_key = key, sender = %message.sender, "Shared context updated");
    }

    fn handle_resource_request(&self, message: &AgentMessage) {
        let resource_type = message.content_str("resource_type");
        let requested = message.content.get("amount").and_then(Value::as_f64);
        let (Some(resource_type), Some(requested)) = (resource_type, requested) else {
            warn!(message_id = %message.id, "Resource request without resource_type or amount");
            return;
        };
        if !requested.is_finite() || requested < 0.0 {
            warn!(message_id = %message.id, requested, "Resource request with invalid amount");
            return;
        }

        let (allocated, remaining) = {
            let mut resources = self.resources.lock();
            match resources.get_mut(resource_type) {
                Some(available) => {
                    let allocated = requested.min(*available);
                    *available -= allocated;
                    (allocated, *available)
                }
                None => (0.0, 0.0),
            }
        };
        let status = if allocated > 0.0 { "allocated" } else { "denied" };
        self.counters.lock().resource_requests += 1;

        info!(
            message_id = %message.id,
            requester = %message.sender,
            resource_type,
            requested,
            allocated,
            status,
            "Resource request handled"
        );

        let reply = AgentMessage::new(
            BUS_SENDER,
            vec![message.sender.clone()],
            MessageType::ResourceResponse,
            json!({
                "resource_type": resource_type,
                "requested_amount": requested,
                "allocated_amount": allocated,
                "remaining": remaining,
                "status": status,
            }),
        )
        .with_priority(MessagePriority::High)
        .with_ttl(self.settings.default_ttl_seconds)
        .in_response_to(message.id);
        self.submit(reply);
    }

    fn deliver(&self, message: &AgentMessage) {
        let mut delivered = 0;
        let mut skipped = 0;
        {
            let agents = self.agents.read();
            for recipient in &message.recipients {
                match agents.get(recipient) {
                    Some(agent) if agent.inbox.send(message.clone()).is_ok() => delivered += 1,
                    _ => {
                        debug!(message_id = %message.id, recipient = %recipient, "Recipient not reachable, skipping");
                        skipped += 1;
                    }
                }
            }
        }

        let mut counters = self.counters.lock();
        counters.delivered += delivered;
        counters.skipped_recipients += skipped;
    }

    async fn forward_alert(&self, message: &AgentMessage) {
        let Some(channel) = self.alert_channel.clone() else {
            return;
        };
        if message.priority < self.alert_min_priority {
            return;
        }

        let severity = match message.message_type {
            MessageType::ErrorAlert => AlertSeverity::Critical,
            _ => AlertSeverity::Warning,
        };
        let summary = message
            .content_str("message")
            .map(str::to_string)
            .unwrap_or_else(|| message.content.to_string());
        let text = format!(
            "[{}] {} from {}: {}",
            message.priority, message.message_type, message.sender, summary
        );

        match channel.notify(&text, severity).await {
            Ok(()) => self.counters.lock().alerts_forwarded += 1,
            Err(e) => warn!(message_id = %message.id, "Alert forwarding failed: {}", e),
        }
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("running", &self.is_running())
            .field("queue_depth", &self.queue.lock().len())
            .field("context_entries", &self.context.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> MessageBus {
        MessageBus::new(BusSettings::default()).unwrap()
    }

    #[test]
    fn test_invalid_alert_priority_rejected() {
        let settings = BusSettings {
            alert_min_priority: "urgent".to_string(),
            ..BusSettings::default()
        };
        assert!(matches!(
            MessageBus::new(settings),
            Err(MessageBusError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_send_only_enqueues() {
        let bus = bus();
        let mut inbox = bus.register_agent("writer", "content");
        bus.send(
            "planner",
            vec!["writer".into()],
            MessageType::StatusUpdate,
            json!({"stage": "draft"}),
            MessagePriority::Normal,
        );

        assert!(inbox.try_recv().is_none());
        assert_eq!(bus.get_bus_status().queue_depth, 1);

        assert_eq!(bus.dispatch_pending().await, 1);
        let message = inbox.try_recv().unwrap();
        assert_eq!(message.content["stage"], "draft");
    }

    #[tokio::test]
    async fn test_unregistered_recipients_are_skipped() {
        let bus = bus();
        let mut inbox = bus.register_agent("a", "ops");
        bus.send(
            "x",
            vec!["ghost".into(), "a".into()],
            MessageType::SuccessNotification,
            json!({}),
            MessagePriority::Low,
        );
        bus.dispatch_pending().await;

        assert!(inbox.try_recv().is_some());
        let counters = bus.get_bus_status().counters;
        assert_eq!(counters.delivered, 1);
        assert_eq!(counters.skipped_recipients, 1);
    }

    #[tokio::test]
    async fn test_release_resource_returns_units() {
        let bus = bus();
        bus.send(
            "agent",
            vec![],
            MessageType::ResourceRequest,
            json!({"resource_type": "compute", "amount": 30.0}),
            MessagePriority::Normal,
        );
        bus.dispatch_pending().await;
        assert_eq!(bus.available_resource("compute"), 70.0);
        assert_eq!(bus.release_resource("compute", 30.0), 100.0);
        assert_eq!(bus.release_resource("compute", -5.0), 100.0);
    }

    struct PanickingResolver;

    impl ConflictResolver for PanickingResolver {
        fn resolve(&self, _payload: &Value) -> Result<Value, crate::domain::ConflictError> {
            panic!("resolver bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_resolver_is_contained() {
        let bus = bus();
        bus.register_resolver("budget", Arc::new(PanickingResolver));
        let mut inbox = bus.register_agent("cfo", "finance");
        bus.send(
            "planner",
            vec!["cfo".into()],
            MessageType::ConflictAlert,
            json!({"conflict_type": "budget"}),
            MessagePriority::Normal,
        );
        bus.send(
            "planner",
            vec!["cfo".into()],
            MessageType::StatusUpdate,
            json!({}),
            MessagePriority::Normal,
        );

        assert_eq!(bus.dispatch_pending().await, 2);
        assert_eq!(inbox.try_recv().unwrap().message_type, MessageType::StatusUpdate);
        assert!(inbox.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_status_groups_agents_by_type() {
        let bus = bus();
        let _a = bus.register_agent("writer-2", "content");
        let _b = bus.register_agent("writer-1", "content");
        let _c = bus.register_agent("cfo", "finance");
        assert!(bus.unregister_agent("cfo"));
        assert!(!bus.unregister_agent("cfo"));

        let status = bus.get_bus_status();
        assert_eq!(status.registered_agents, 2);
        assert_eq!(status.agents_by_type["content"], vec!["writer-1", "writer-2"]);
        assert!(!status.agents_by_type.contains_key("finance"));
        assert_eq!(
            status.conflict_types,
            vec!["budget", "resource", "strategy", "timeline"]
        );
    }
}
