//! Application configuration
//!
//! Every field carries a serde default so that partial TOML/JSON files load.
//! Loading and environment overrides live in the infra crate.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SyncBridgeError};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub source: SourceConfig,
    pub target: TargetConfig,
    pub mapping_service: MappingServiceConfig,
    pub retry: CallRetryConfig,
    pub retry_queue: RetryQueueConfig,
    pub reconciliation: ReconciliationConfig,
    pub normalization: NormalizationConfig,
    pub fields: FieldsConfig,
    pub dispatcher: DispatcherConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        require_url("source.base_url", &self.source.base_url)?;
        require_url("target.base_url", &self.target.base_url)?;
        require_url("mapping_service.base_url", &self.mapping_service.base_url)?;

        if self.source.resource.trim().is_empty() || self.target.resource.trim().is_empty() {
            return Err(SyncBridgeError::Config("resource names must not be empty".into()));
        }
        if self.target.system_name.trim().is_empty() {
            return Err(SyncBridgeError::Config("target.system_name must not be empty".into()));
        }
        if self.reconciliation.page_size == 0 {
            return Err(SyncBridgeError::Config(
                "reconciliation.page_size must be greater than zero".into(),
            ));
        }
        if self.dispatcher.partitions == 0 || self.dispatcher.channel_capacity == 0 {
            return Err(SyncBridgeError::Config(
                "dispatcher partitions and channel_capacity must be greater than zero".into(),
            ));
        }
        if self.dispatcher.max_attempts == 0 {
            return Err(SyncBridgeError::Config(
                "dispatcher.max_attempts must be at least 1".into(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncBridgeError::Config("retry.max_attempts must be at least 1".into()));
        }
        if self.retry_queue.max_attempts == 0 || self.retry_queue.capacity == 0 {
            return Err(SyncBridgeError::Config(
                "retry_queue max_attempts and capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn require_url(field: &str, value: &str) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SyncBridgeError::Config(format!("{field} must not be empty")));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(SyncBridgeError::Config(format!("{field} must be an http(s) URL: {trimmed}")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: "0.0.0.0:8080".to_string() }
    }
}

/// Source-of-truth API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Resource path segment, e.g. `alerts`
    pub resource: String,
    /// Pre-acquired bearer token
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8081".to_string(),
            resource: "entities".to_string(),
            token: None,
            timeout_ms: 10_000,
        }
    }
}

/// Legacy target system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub base_url: String,
    pub resource: String,
    /// Name carried in `originSystem` by changes this engine wrote
    pub system_name: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8082".to_string(),
            resource: "entities".to_string(),
            system_name: "NOMIS".to_string(),
            token: None,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingServiceConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for MappingServiceConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:8083".to_string(), token: None, timeout_ms: 5_000 }
    }
}

/// Synchronous retry of idempotent reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallRetryConfig {
    /// Total attempts including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Timeout applied to each individual attempt
    pub call_timeout_ms: u64,
}

impl Default for CallRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: 2.0,
            call_timeout_ms: 10_000,
        }
    }
}

/// Asynchronous redelivery of failed mapping writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryQueueConfig {
    pub capacity: usize,
    /// Deliveries before the message is dead-lettered
    pub max_attempts: u32,
    pub redelivery_delay_ms: u64,
}

impl Default for RetryQueueConfig {
    fn default() -> Self {
        Self { capacity: 1_024, max_attempts: 5, redelivery_delay_ms: 30_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first)
    pub cron: String,
    pub page_size: u64,
    /// Partitions whose unmapped source entities are expected and not
    /// reported as mismatches
    pub excluded_partitions: BTreeSet<String>,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: "0 0 2 * * *".to_string(),
            page_size: 100,
            excluded_partitions: BTreeSet::new(),
        }
    }
}

/// Code normalization tables applied before comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    /// Deprecated code to canonical replacement
    pub deprecated_codes: BTreeMap<String, String>,
    /// Codes ignored on both sides
    pub excluded_codes: BTreeSet<String>,
}

/// JSON pointers locating comparable fields in each system's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryFields {
    pub status: String,
    pub codes: String,
    pub code_count: String,
    /// Detail key to JSON pointer
    pub details: BTreeMap<String, String>,
}

impl Default for SummaryFields {
    fn default() -> Self {
        Self {
            status: "/status".to_string(),
            codes: "/codes".to_string(),
            code_count: "/codeCount".to_string(),
            details: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldsConfig {
    pub source: SummaryFields,
    pub target: SummaryFields,
    /// Target field name to source JSON pointer; empty copies the payload
    pub transform: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of sequential partition workers
    pub partitions: usize,
    pub channel_capacity: usize,
    /// Passes per notification, counting the first, while failures stay retryable
    pub max_attempts: u32,
    pub redelivery_delay_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { partitions: 8, channel_capacity: 256, max_attempts: 3, redelivery_delay_ms: 2_000 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}
