//! Telemetry sink backed by structured logs
//!
//! Events go to the `telemetry` tracing target so a log shipper can route
//! them separately from diagnostic output.

use syncbridge_core::{TelemetryEvent, TelemetrySink};
use tracing::{error, info};

/// Writes each telemetry event as one structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TracingTelemetry {
    pub fn new() -> Self {
        Self
    }
}

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: TelemetryEvent) {
        let properties = serde_json::to_string(&event.properties)
            .unwrap_or_else(|_| format!("{:?}", event.properties));

        if event.fatal {
            error!(target: "telemetry", event = event.name, fatal = true, properties = %properties);
        } else {
            info!(target: "telemetry", event = event.name, properties = %properties);
        }
    }
}
