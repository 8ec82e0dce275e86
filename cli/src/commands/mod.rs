// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the autoflow CLI

pub mod config;
pub mod conflict;
pub mod workflow;

pub use self::config::ConfigCommand;
pub use self::conflict::ConflictCommand;
pub use self::workflow::WorkflowCommand;
