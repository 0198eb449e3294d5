//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Read a `.env` file into the process environment if one exists
//! 2. Load the file named by `SYNCBRIDGE_CONFIG`, or search the standard
//!    locations, or fall back to built-in defaults
//! 3. Apply environment variable overrides
//!
//! Both JSON and TOML files are supported (detected by extension). Every
//! section is optional.
//!
//! ## Environment Variables
//! - `SYNCBRIDGE_CONFIG`: Explicit config file path
//! - `SYNCBRIDGE_BIND_ADDR`: HTTP listen address
//! - `SYNCBRIDGE_SOURCE_URL`, `SYNCBRIDGE_TARGET_URL`, `SYNCBRIDGE_MAPPING_URL`:
//!   Base URLs of the three remote services
//! - `SYNCBRIDGE_TARGET_SYSTEM`: Origin name identifying the target system
//! - `SYNCBRIDGE_PAGE_SIZE`: Reconciliation page size
//! - `SYNCBRIDGE_RECONCILIATION_CRON`: Reconciliation schedule
//! - `SYNCBRIDGE_RECONCILIATION_ENABLED`: Whether the schedule runs
//!   (true/false)
//!
//! ## File Locations
//! The loader searches the following paths (in order):
//! 1. `./syncbridge.toml`, `./config.toml`, `./syncbridge.json`,
//!    `./config.json` (current working directory)
//! 2. The same names in the parent and grandparent directories
//! 3. Relative to executable location

use std::path::{Path, PathBuf};

use syncbridge_domain::constants::{
    ENV_BIND_ADDR, ENV_CONFIG_PATH, ENV_MAPPING_URL, ENV_PAGE_SIZE, ENV_RECONCILIATION_CRON,
    ENV_RECONCILIATION_ENABLED, ENV_SOURCE_URL, ENV_TARGET_SYSTEM, ENV_TARGET_URL,
};
use syncbridge_domain::{Config, Result, SyncBridgeError};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["syncbridge.toml", "config.toml", "syncbridge.json", "config.json"];

/// Load configuration using the full strategy described above.
///
/// # Errors
/// Returns `SyncBridgeError::Config` if an explicitly named file is missing,
/// a file cannot be parsed, or an override has an invalid value.
pub fn load() -> Result<Config> {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded .env file");
    }

    let explicit = std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from);
    let mut config = match explicit.or_else(discover_config_paths) {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::info!("No config file found, using defaults");
            Config::default()
        }
    };

    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations.
///
/// # Errors
/// Returns `SyncBridgeError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SyncBridgeError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => discover_config_paths().ok_or_else(|| {
            SyncBridgeError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SyncBridgeError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, detecting the format by
/// extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SyncBridgeError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SyncBridgeError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(SyncBridgeError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe the standard locations for a configuration file.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn discover_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd.clone());
        roots.push(cwd.join(".."));
        roots.push(cwd.join("../.."));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
            roots.push(exe_dir.join(".."));
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

/// Overwrite file or default values with any environment variables set.
///
/// # Errors
/// Returns `SyncBridgeError::Config` if a numeric override does not parse.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    if let Some(value) = env_opt(ENV_BIND_ADDR) {
        config.server.bind_addr = value;
    }
    if let Some(value) = env_opt(ENV_SOURCE_URL) {
        config.source.base_url = value;
    }
    if let Some(value) = env_opt(ENV_TARGET_URL) {
        config.target.base_url = value;
    }
    if let Some(value) = env_opt(ENV_MAPPING_URL) {
        config.mapping_service.base_url = value;
    }
    if let Some(value) = env_opt(ENV_TARGET_SYSTEM) {
        config.target.system_name = value;
    }
    if let Some(value) = env_opt(ENV_PAGE_SIZE) {
        config.reconciliation.page_size = value.parse::<u64>().map_err(|e| {
            SyncBridgeError::Config(format!("Invalid {}: {}", ENV_PAGE_SIZE, e))
        })?;
    }
    if let Some(value) = env_opt(ENV_RECONCILIATION_CRON) {
        config.reconciliation.cron = value;
    }
    config.reconciliation.enabled =
        env_bool(ENV_RECONCILIATION_ENABLED, config.reconciliation.enabled);
    Ok(())
}

/// Non-empty environment variable, if set.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
