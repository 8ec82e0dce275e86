// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod alerting;
pub mod command_unit;
pub mod event_bus;
pub mod repositories;
pub mod telemetry;
pub mod workflow_parser;

pub use alerting::{LogAlertChannel, WebhookAlertChannel};
pub use command_unit::ShellCommandUnit;
pub use event_bus::{EventBus, EventBusError};
pub use repositories::InMemoryExecutionRepository;
pub use telemetry::TracingMetricsSink;
pub use workflow_parser::{ParsedWorkflow, WorkflowParseError, WorkflowParser};
