// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services for agent coordination.

pub mod message_bus;

pub use message_bus::{AgentInbox, BusCounters, BusStatus, MessageBus, MessageBusError, BUS_SENDER};
