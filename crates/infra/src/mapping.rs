//! Configuration-driven entity mapping
//!
//! Field locations are JSON pointers from [`FieldsConfig`], so a new entity
//! type needs configuration rather than code.

use serde_json::{Map, Value};
use syncbridge_core::EntityMapper;
use syncbridge_domain::{
    EntitySummary, FieldsConfig, Result, SourceEntity, SummaryFields, SyncBridgeError, TargetEntity,
};

/// `EntityMapper` driven by [`FieldsConfig`].
#[derive(Debug, Clone, Default)]
pub struct ConfiguredEntityMapper {
    fields: FieldsConfig,
}

impl ConfiguredEntityMapper {
    pub fn new(fields: FieldsConfig) -> Self {
        Self { fields }
    }
}

impl EntityMapper for ConfiguredEntityMapper {
    fn to_target(&self, source: &SourceEntity) -> Result<Value> {
        if self.fields.transform.is_empty() {
            return Ok(source.payload.clone());
        }

        let body: Map<String, Value> = self
            .fields
            .transform
            .iter()
            .filter_map(|(field, pointer)| {
                source.payload.pointer(pointer).map(|value| (field.clone(), value.clone()))
            })
            .collect();

        if body.is_empty() {
            return Err(SyncBridgeError::Permanent(format!(
                "source entity {} has none of the mapped fields",
                source.id
            )));
        }
        Ok(Value::Object(body))
    }

    fn summarize_source(&self, source: &SourceEntity) -> EntitySummary {
        summarize(&source.payload, &self.fields.source)
    }

    fn summarize_target(&self, target: &TargetEntity) -> EntitySummary {
        summarize(&target.payload, &self.fields.target)
    }
}

fn summarize(payload: &Value, fields: &SummaryFields) -> EntitySummary {
    let codes = payload.pointer(&fields.codes).and_then(Value::as_array).map(|items| {
        items.iter().filter_map(scalar_text).collect::<Vec<_>>()
    });
    let code_count = payload
        .pointer(&fields.code_count)
        .and_then(Value::as_u64)
        .map(|count| u32::try_from(count).unwrap_or(u32::MAX));

    EntitySummary {
        status: payload.pointer(&fields.status).and_then(scalar_text),
        codes,
        code_count,
        details: fields
            .details
            .iter()
            .filter_map(|(key, pointer)| {
                payload.pointer(pointer).and_then(scalar_text).map(|value| (key.clone(), value))
            })
            .collect(),
    }
}

/// Strings as-is, numbers and booleans rendered; null and containers are
/// treated as absent.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}
