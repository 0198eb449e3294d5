//! Port for structured telemetry events

use std::collections::BTreeMap;

use serde::Serialize;

/// Named business event with string properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub name: &'static str,
    pub properties: BTreeMap<String, String>,
    /// Marks an inconsistency that needs manual repair
    pub fatal: bool,
}

impl TelemetryEvent {
    pub fn new(name: &'static str) -> Self {
        Self { name, properties: BTreeMap::new(), fatal: false }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.properties.insert(key.into(), value.to_string());
        self
    }

    pub fn with_opt(self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.with(key, value),
            None => self,
        }
    }

    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Receives telemetry events. Emission never fails the caller.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}
