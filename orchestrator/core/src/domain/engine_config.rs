// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Engine Configuration Types
//
// Defines the configuration schema for an autoflow engine process:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Step defaults, backoff unit and healing behaviour
// - Anomaly health gate
// - Message bus TTLs and resource pools
// - Alerting and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_VERSION: &str = "autoflow.dev/v1";
pub const CONFIG_KIND: &str = "EngineConfig";

const PRIORITY_NAMES: [&str; 4] = ["low", "normal", "high", "critical"];

/// Top-level Kubernetes-style engine configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigManifest {
    /// API version (must be "autoflow.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "EngineConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: EngineConfigSpec,
}

/// Shorthand used throughout the crates.
pub type EngineConfig = EngineConfigManifest;

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigSpec {
    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub bus: BusSettings,

    #[serde(default)]
    pub alerting: AlertingSettings,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Timeout applied to manifest steps that do not declare one
    #[serde(default = "default_step_timeout", with = "humantime_serde")]
    pub default_step_timeout: Duration,

    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Base of the exponential retry backoff (`unit * 2^attempt`)
    #[serde(default = "default_backoff_unit", with = "humantime_serde")]
    pub backoff_unit: Duration,

    /// Duration of the simulated remediation performed by default strategies
    #[serde(default, with = "humantime_serde")]
    pub remediation_delay: Duration,

    /// Share of successful healings considered fully automatic
    #[serde(default = "default_auto_resolution_factor")]
    pub auto_resolution_factor: f64,

    /// Executions retained in the in-memory history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    #[serde(default)]
    pub health_gate: HealthGateConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_step_timeout: default_step_timeout(),
            default_max_retries: default_max_retries(),
            backoff_unit: default_backoff_unit(),
            remediation_delay: Duration::ZERO,
            auto_resolution_factor: default_auto_resolution_factor(),
            history_limit: default_history_limit(),
            health_gate: HealthGateConfig::default(),
        }
    }
}

/// Anomaly-based admission control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthGateConfig {
    /// Score executions and record the result in their metrics
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Refuse new executions while the last scored execution was anomalous
    #[serde(default)]
    pub enforce: bool,

    #[serde(default = "default_anomaly_threshold")]
    pub threshold: f64,

    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    #[serde(default = "default_anomaly_window")]
    pub window: usize,
}

impl Default for HealthGateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enforce: false,
            threshold: default_anomaly_threshold(),
            min_samples: default_min_samples(),
            window: default_anomaly_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    #[serde(default = "default_message_ttl")]
    pub default_ttl_seconds: u64,

    #[serde(default = "default_context_ttl")]
    pub context_ttl_seconds: u64,

    /// Bounded wait of the dispatch loop on an empty queue
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Processed messages retained for status reporting
    #[serde(default = "default_bus_history_limit")]
    pub history_limit: usize,

    /// Scope used by data-share messages without a `scope_id`
    #[serde(default = "default_scope")]
    pub default_scope: String,

    /// Resource type -> units available to resource requests
    #[serde(default = "default_resources")]
    pub resources: HashMap<String, f64>,

    /// Lowest priority of error/conflict alerts forwarded to the alert channel
    #[serde(default = "default_alert_min_priority")]
    pub alert_min_priority: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            default_ttl_seconds: default_message_ttl(),
            context_ttl_seconds: default_context_ttl(),
            poll_interval: default_poll_interval(),
            history_limit: default_bus_history_limit(),
            default_scope: default_scope(),
            resources: default_resources(),
            alert_min_priority: default_alert_min_priority(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertingSettings {
    /// Enables the webhook alert channel when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Install the Prometheus exporter
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_step_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_unit() -> Duration {
    Duration::from_secs(1)
}

fn default_auto_resolution_factor() -> f64 {
    0.85
}

fn default_history_limit() -> usize {
    1000
}

fn default_anomaly_threshold() -> f64 {
    3.0
}

fn default_min_samples() -> usize {
    10
}

fn default_anomaly_window() -> usize {
    500
}

fn default_message_ttl() -> u64 {
    300
}

fn default_context_ttl() -> u64 {
    3600
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_bus_history_limit() -> usize {
    100
}

fn default_scope() -> String {
    "global".to_string()
}

fn default_resources() -> HashMap<String, f64> {
    HashMap::from([
        ("compute".to_string(), 100.0),
        ("memory".to_string(), 100.0),
        ("budget".to_string(), 100.0),
    ])
}

fn default_alert_min_priority() -> String {
    "high".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9464
}

impl Default for EngineConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: CONFIG_KIND.to_string(),
            metadata: ManifestMetadata {
                name: "autoflow".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: EngineConfigSpec::default(),
        }
    }
}

impl EngineConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Candidate locations in precedence order (after an explicit `--config`)
    /// 1. AUTOFLOW_CONFIG_PATH environment variable
    /// 2. ./autoflow-config.yaml (working directory)
    /// 3. ~/.autoflow/config.yaml (user home)
    /// 4. /etc/autoflow/config.yaml (system)
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(path) = std::env::var("AUTOFLOW_CONFIG_PATH") {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from("./autoflow-config.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".autoflow").join("config.yaml"));
        }
        paths.push(PathBuf::from("/etc/autoflow/config.yaml"));
        paths
    }

    /// Discover configuration file using precedence order
    pub fn discover_config() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.exists())
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // 1. Explicit CLI path (Fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        // 2. Discovery (Env -> Cwd -> Home -> System)
        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::debug!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("AUTOFLOW_BACKOFF_UNIT_MS") {
            match val.trim().parse::<u64>() {
                Ok(ms) => {
                    tracing::info!("Environment override: AUTOFLOW_BACKOFF_UNIT_MS={}", ms);
                    self.spec.engine.backoff_unit = Duration::from_millis(ms);
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for AUTOFLOW_BACKOFF_UNIT_MS: '{}'. Expected milliseconds. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Some(val) = lookup("AUTOFLOW_ENFORCE_HEALTH_GATE") {
            match val.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => {
                    tracing::info!("Environment override: AUTOFLOW_ENFORCE_HEALTH_GATE=true");
                    self.spec.engine.health_gate.enforce = true;
                }
                "false" | "0" | "no" | "off" => {
                    tracing::info!("Environment override: AUTOFLOW_ENFORCE_HEALTH_GATE=false");
                    self.spec.engine.health_gate.enforce = false;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for AUTOFLOW_ENFORCE_HEALTH_GATE: '{}'. Expected true/false. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != CONFIG_KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, CONFIG_KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let engine = &self.spec.engine;
        if engine.backoff_unit.is_zero() {
            anyhow::bail!("spec.engine.backoff_unit must be greater than zero");
        }
        if engine.default_step_timeout.is_zero() {
            anyhow::bail!("spec.engine.default_step_timeout must be greater than zero");
        }
        if !(0.0..=1.0).contains(&engine.auto_resolution_factor) {
            anyhow::bail!(
                "spec.engine.auto_resolution_factor must be within 0.0..=1.0, got {}",
                engine.auto_resolution_factor
            );
        }
        if engine.health_gate.threshold <= 0.0 {
            anyhow::bail!("spec.engine.health_gate.threshold must be positive");
        }

        let bus = &self.spec.bus;
        if bus.poll_interval.is_zero() {
            anyhow::bail!("spec.bus.poll_interval must be greater than zero");
        }
        if bus.default_scope.is_empty() {
            anyhow::bail!("spec.bus.default_scope cannot be empty");
        }
        for (resource, amount) in &bus.resources {
            if *amount < 0.0 || !amount.is_finite() {
                anyhow::bail!("spec.bus.resources.{} must be a non-negative number", resource);
            }
        }
        if !PRIORITY_NAMES.contains(&bus.alert_min_priority.to_lowercase().as_str()) {
            anyhow::bail!(
                "spec.bus.alert_min_priority must be one of {:?}, got '{}'",
                PRIORITY_NAMES,
                bus.alert_min_priority
            );
        }

        if let Some(url) = &self.spec.alerting.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("spec.alerting.webhook_url must be an http(s) URL");
            }
        }

        let format = self.spec.observability.logging.format.as_str();
        if format != "text" && format != "json" {
            anyhow::bail!("spec.observability.logging.format must be 'text' or 'json'");
        }

        Ok(())
    }
}
