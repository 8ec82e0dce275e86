// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Workflow, execution and healing model plus the ports the engine consumes.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Entities, value objects and collaborator traits

pub mod alerting;
pub mod anomaly;
pub mod engine_config;
pub mod events;
pub mod execution;
pub mod failure;
pub mod healing;
pub mod repository;
pub mod telemetry;
pub mod unit_of_work;
pub mod workflow;
