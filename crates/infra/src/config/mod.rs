//! Configuration loading
//!
//! Reads configuration files and environment overrides into the domain
//! [`syncbridge_domain::Config`].

pub mod loader;

// Re-export commonly used items
pub use loader::{apply_env_overrides, load, load_from_file, discover_config_paths};
