//! Application constants

// Telemetry event names
pub const EVENT_SYNC_OUTCOME: &str = "sync-outcome";
pub const EVENT_DUPLICATE_MAPPING: &str = "duplicate-mapping";
pub const EVENT_MAPPING_RETRY_QUEUED: &str = "mapping-retry-queued";
pub const EVENT_MAPPING_DEAD_LETTERED: &str = "mapping-dead-lettered";
pub const EVENT_RECONCILIATION_REQUESTED: &str = "reconciliation-requested";
pub const EVENT_RECONCILIATION_MISMATCH: &str = "reconciliation-mismatch";
pub const EVENT_RECONCILIATION_REPORT: &str = "reconciliation-report";

// Environment variables
pub const ENV_CONFIG_PATH: &str = "SYNCBRIDGE_CONFIG";
pub const ENV_BIND_ADDR: &str = "SYNCBRIDGE_BIND_ADDR";
pub const ENV_SOURCE_URL: &str = "SYNCBRIDGE_SOURCE_URL";
pub const ENV_TARGET_URL: &str = "SYNCBRIDGE_TARGET_URL";
pub const ENV_MAPPING_URL: &str = "SYNCBRIDGE_MAPPING_URL";
pub const ENV_TARGET_SYSTEM: &str = "SYNCBRIDGE_TARGET_SYSTEM";
pub const ENV_PAGE_SIZE: &str = "SYNCBRIDGE_PAGE_SIZE";
pub const ENV_RECONCILIATION_CRON: &str = "SYNCBRIDGE_RECONCILIATION_CRON";
pub const ENV_RECONCILIATION_ENABLED: &str = "SYNCBRIDGE_RECONCILIATION_ENABLED";

/// Longest error text carried in telemetry and dead letters
pub const MAX_REASON_LENGTH: usize = 512;
