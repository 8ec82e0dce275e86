// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types for agent coordination. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`message`] | `AgentMessage`, `MessageType`, `MessagePriority` |
//! | [`shared_context`] | `SharedContextStore`, `SharedContextEntry` |
//! | [`conflict`] | `ConflictType`, `ConflictResolver`, budget/timeline/resource/strategy resolvers |

pub mod conflict;
pub mod message;
pub mod shared_context;

pub use conflict::{ConflictError, ConflictResolver, ConflictType};
pub use message::{AgentMessage, MessageId, MessagePriority, MessageType};
pub use shared_context::{SharedContextEntry, SharedContextStore};

use chrono::{DateTime, Utc};

/// `now - since > ttl_seconds`, at millisecond precision.
pub(crate) fn older_than(since: DateTime<Utc>, now: DateTime<Utc>, ttl_seconds: u64) -> bool {
    let ttl_ms = i64::try_from(ttl_seconds)
        .unwrap_or(i64::MAX)
        .saturating_mul(1000);
    now.signed_duration_since(since).num_milliseconds() > ttl_ms
}
