//! Conversions between wire types and the crate's value model.

use std::collections::HashMap;

use prost_types::value::Kind;
use prost_types::{ListValue, Struct, Value};

use super::proto;
use super::{ChangeType, FlagChange, StreamEvent};
use crate::types::{EvaluationContext, MetadataValue};

/// Renders the context into the `google.protobuf.Struct` the service
/// expects: attributes at the top level, targeting key under `targetingKey`.
pub fn context_to_struct(context: &EvaluationContext) -> Struct {
    match json_to_value(&context.to_json()).kind {
        Some(Kind::StructValue(s)) => s,
        _ => Struct::default(),
    }
}

pub fn json_to_value(json: &serde_json::Value) -> Value {
    let kind = match json {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        serde_json::Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_value).collect(),
        }),
        serde_json::Value::Object(map) => Kind::StructValue(Struct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect(),
        }),
    };

    Value { kind: Some(kind) }
}

pub fn value_to_json(value: Value) -> serde_json::Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(b),
        Some(Kind::NumberValue(n)) => serde_json::Number::from_f64(n)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        Some(Kind::StringValue(s)) => serde_json::Value::String(s),
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.into_iter().map(value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => struct_to_json(s),
    }
}

pub fn struct_to_json(s: Struct) -> serde_json::Value {
    serde_json::Value::Object(
        s.fields
            .into_iter()
            .map(|(k, v)| (k, value_to_json(v)))
            .collect(),
    )
}

/// Scalar annotations only; nested values in the metadata struct are
/// dropped rather than flattened.
pub fn metadata_from_struct(metadata: Option<Struct>) -> HashMap<String, MetadataValue> {
    let Some(metadata) = metadata else {
        return HashMap::new();
    };

    metadata
        .fields
        .into_iter()
        .filter_map(|(key, value)| {
            let scalar = match value.kind {
                Some(Kind::BoolValue(b)) => MetadataValue::Bool(b),
                Some(Kind::NumberValue(n)) => MetadataValue::Number(n),
                Some(Kind::StringValue(s)) => MetadataValue::String(s),
                _ => return None,
            };
            Some((key, scalar))
        })
        .collect()
}

/// The wire encodes "no variant" as an empty string.
pub fn optional_variant(variant: String) -> Option<String> {
    if variant.is_empty() {
        None
    } else {
        Some(variant)
    }
}

pub fn stream_event(event: proto::event_stream_response::Event) -> StreamEvent {
    use proto::event_stream_response::Event;

    match event {
        Event::Ready(_) => StreamEvent::Ready,
        Event::ConfigurationChange(change) => StreamEvent::ConfigurationChanged {
            flags: change
                .flags
                .into_iter()
                .map(|(key, record)| (key, flag_change(record)))
                .collect(),
        },
    }
}

fn flag_change(record: proto::FlagChange) -> FlagChange {
    let change_type = match proto::ChangeType::try_from(record.change_type) {
        Ok(proto::ChangeType::Create) => ChangeType::Create,
        Ok(proto::ChangeType::Delete) => ChangeType::Delete,
        // Unspecified and unknown future kinds invalidate like an update;
        // only the existence of a change matters to the cache.
        _ => ChangeType::Update,
    };

    FlagChange {
        change_type,
        source: record.source,
    }
}
