// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `autoflow-swarm`: Agent Coordination Crate
//!
//! Lets the agents taking part in a workflow talk to each other without
//! holding references to one another.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `AgentMessage`, `SharedContextStore`, conflict resolvers |
//! | [`application`] | Application | `MessageBus` dispatch loop and handlers |
//!
//! ## Key Concepts
//!
//! - **Message**: typed envelope with a TTL. Dispatched once, in FIFO order.
//! - **Shared context**: `(scope, key)` maps merged by `DataShare` messages.
//! - **Conflict resolution**: deterministic budget, timeline, resource and
//!   strategy arbitration triggered by `ConflictAlert` messages.
//! - **Resource pool**: named quantities granted by `ResourceRequest` messages.
//!
//! State is held in memory only.

pub mod application;
pub mod domain;

pub use application::{MessageBus, MessageBusError};
pub use domain::*;
