// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shell Command Unit of Work
//!
//! Runs a step body as `sh -c <command>`.
//!
//! - The execution context is passed as JSON in `AUTOFLOW_CONTEXT`.
//! - Stdout is parsed as JSON when possible, otherwise returned as a string.
//! - A non-zero exit status is an `AgentFailure` carrying the stderr tail.
//!
//! The child is killed when the invocation is dropped, so a step timeout
//! reaps the process.

use crate::domain::failure::StepError;
use crate::domain::unit_of_work::{ExecutionContext, UnitOfWork, UnitResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

pub const CONTEXT_ENV_VAR: &str = "AUTOFLOW_CONTEXT";

const STDERR_TAIL: usize = 512;

#[derive(Debug, Clone)]
pub struct ShellCommandUnit {
    command: String,
    env: HashMap<String, String>,
    workdir: Option<PathBuf>,
}

impl ShellCommandUnit {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: HashMap::new(),
            workdir: None,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

fn parse_stdout(stdout: &[u8]) -> Value {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    let start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map(|(i, _)| i)
        .unwrap_or(0);
    trimmed[start..].to_string()
}

#[async_trait]
impl UnitOfWork for ShellCommandUnit {
    async fn invoke(&self, context: ExecutionContext) -> UnitResult {
        let context_json = serde_json::to_string(&context)
            .map_err(|e| StepError::agent(format!("failed to serialise context: {}", e)))?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(&self.command)
            .env(CONTEXT_ENV_VAR, context_json)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        debug!(command = %self.command, "Spawning shell command");
        let output = cmd
            .output()
            .await
            .map_err(|e| StepError::agent(format!("failed to spawn '{}': {}", self.command, e)))?;

        if output.status.success() {
            Ok(parse_stdout(&output.stdout))
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Err(StepError::agent(format!(
                "command exited with {}: {}",
                code,
                stderr_tail(&output.stderr)
            )))
        }
    }
}
