//! Tracing subscriber setup for the service binary

use syncbridge_domain::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` when set, otherwise the configured level.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber.
///
/// Fails if a subscriber is already installed (tests, embedding).
pub fn init_tracing(config: &LoggingConfig) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    match config.format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn configured_level_applies_without_rust_log() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig { level: "debug".into(), format: LogFormat::Json };

        assert_eq!(env_filter(&config).to_string(), "debug");
    }

    #[test]
    #[serial]
    fn rust_log_overrides_configured_level() {
        std::env::set_var("RUST_LOG", "syncbridge_infra=trace");
        let filter = env_filter(&LoggingConfig::default());
        std::env::remove_var("RUST_LOG");

        assert_eq!(filter.to_string(), "syncbridge_infra=trace");
    }
}
