//! Inbound change notifications

use serde::{Deserialize, Serialize};

/// Kind of change a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

impl ChangeKind {
    /// Recognise the change kind from the suffix of an event type such as
    /// `person.alert.created`. Unknown suffixes yield `None` so that new event
    /// types can be published before this engine understands them.
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        let suffix = event_type.rsplit('.').next()?.trim().to_ascii_lowercase();
        match suffix.as_str() {
            "created" | "inserted" => Some(Self::Create),
            "updated" | "changed" => Some(Self::Update),
            "deleted" | "removed" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => f.write_str("create"),
            Self::Update => f.write_str("update"),
            Self::Delete => f.write_str("delete"),
        }
    }
}

/// `additionalInformation` block of the wire message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdditionalInformation {
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_system: Option<String>,
}

/// Wire shape of an inbound change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEventMessage {
    pub event_type: String,
    pub additional_information: AdditionalInformation,
    #[serde(default)]
    pub correlation_ids: Vec<String>,
}

/// One inbound change, flattened for the orchestrator. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotification {
    pub event_type: String,
    pub entity_id: String,
    pub origin_system: Option<String>,
    pub correlation_ids: Vec<String>,
}

impl ChangeNotification {
    pub fn new(event_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            entity_id: entity_id.into(),
            origin_system: None,
            correlation_ids: Vec::new(),
        }
    }

    pub fn with_origin(mut self, origin_system: impl Into<String>) -> Self {
        self.origin_system = Some(origin_system.into());
        self
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_ids.push(id.into());
        self
    }

    pub fn kind(&self) -> Option<ChangeKind> {
        ChangeKind::from_event_type(&self.event_type)
    }

    /// True when the change originated in `system` (case-insensitive).
    pub fn originated_in(&self, system: &str) -> bool {
        self.origin_system
            .as_deref()
            .is_some_and(|origin| origin.trim().eq_ignore_ascii_case(system.trim()))
    }
}

impl From<ChangeEventMessage> for ChangeNotification {
    fn from(message: ChangeEventMessage) -> Self {
        Self {
            event_type: message.event_type,
            entity_id: message.additional_information.entity_id,
            origin_system: message.additional_information.origin_system,
            correlation_ids: message.correlation_ids,
        }
    }
}
