use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    Boolean,
    String,
    Number,
    Integer,
    Object,
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlagType::Boolean => "boolean",
            FlagType::String => "string",
            FlagType::Number => "number",
            FlagType::Integer => "integer",
            FlagType::Object => "object",
        };
        write!(f, "{}", name)
    }
}

/// Why a resolution produced the value it did.
///
/// `Static` is the only reason that makes a value cacheable: a static result
/// cannot change without a configuration change, which the event stream
/// reports. `Cached` never comes from the server; it is written by the
/// resolver when serving a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionReason {
    Static,
    TargetingMatch,
    Split,
    Default,
    Disabled,
    Cached,
    Error,
    Unknown,
}

impl ResolutionReason {
    /// Lenient parse of the wire form; anything unrecognized maps to
    /// `Unknown` rather than failing the resolution.
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "STATIC" => ResolutionReason::Static,
            "TARGETING_MATCH" => ResolutionReason::TargetingMatch,
            "SPLIT" => ResolutionReason::Split,
            "DEFAULT" => ResolutionReason::Default,
            "DISABLED" => ResolutionReason::Disabled,
            "CACHED" => ResolutionReason::Cached,
            "ERROR" => ResolutionReason::Error,
            _ => ResolutionReason::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionReason::Static => "STATIC",
            ResolutionReason::TargetingMatch => "TARGETING_MATCH",
            ResolutionReason::Split => "SPLIT",
            ResolutionReason::Default => "DEFAULT",
            ResolutionReason::Disabled => "DISABLED",
            ResolutionReason::Cached => "CACHED",
            ResolutionReason::Error => "ERROR",
            ResolutionReason::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ResolutionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    String(String),
    Int(i64),
    Number(f64),
    Object(serde_json::Value),
}

impl FlagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FlagValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FlagValue::Number(n) => Some(*n),
            FlagValue::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FlagValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&serde_json::Value> {
        match self {
            FlagValue::Object(v) => Some(v),
            _ => None,
        }
    }

    pub fn flag_type(&self) -> FlagType {
        match self {
            FlagValue::Bool(_) => FlagType::Boolean,
            FlagValue::String(_) => FlagType::String,
            FlagValue::Number(_) => FlagType::Number,
            FlagValue::Int(_) => FlagType::Integer,
            FlagValue::Object(_) => FlagType::Object,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FlagValue::Bool(b) => serde_json::Value::Bool(*b),
            FlagValue::String(s) => serde_json::Value::String(s.clone()),
            FlagValue::Int(n) => serde_json::Value::from(*n),
            FlagValue::Number(n) => serde_json::Number::from_f64(*n)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            FlagValue::Object(v) => v.clone(),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::String(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::String(value.to_string())
    }
}

impl From<f64> for FlagValue {
    fn from(value: f64) -> Self {
        FlagValue::Number(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl From<i32> for FlagValue {
    fn from(value: i32) -> Self {
        FlagValue::Int(value as i64)
    }
}

impl From<serde_json::Value> for FlagValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Bool(b) => FlagValue::Bool(b),
            serde_json::Value::String(s) => FlagValue::String(s),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FlagValue::Int(i)
                } else {
                    FlagValue::Number(n.as_f64().unwrap_or(0.0))
                }
            }
            other => FlagValue::Object(other),
        }
    }
}

/// Opaque scalar annotation attached to a resolution by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    String(String),
    Number(f64),
}

/// The outcome of a single flag resolution.
///
/// Every resolve call produces one of these; failures are embedded in
/// `error_code`/`error_message` with the caller's default as the value,
/// never surfaced as `Err`.
#[derive(Debug, Clone)]
pub struct ResolutionDetails {
    pub flag_key: String,
    pub value: FlagValue,
    pub variant: Option<String>,
    pub reason: ResolutionReason,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub flag_metadata: HashMap<String, MetadataValue>,
    pub timestamp: DateTime<Utc>,
}

impl ResolutionDetails {
    pub fn new(flag_key: impl Into<String>, value: FlagValue, reason: ResolutionReason) -> Self {
        Self {
            flag_key: flag_key.into(),
            value,
            variant: None,
            reason,
            error_code: None,
            error_message: None,
            flag_metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Degraded result carrying the caller's default and the error kind.
    pub fn error(
        flag_key: impl Into<String>,
        default_value: FlagValue,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            flag_key: flag_key.into(),
            value: default_value,
            variant: None,
            reason: ResolutionReason::Error,
            error_code: Some(code),
            error_message: Some(message.into()),
            flag_metadata: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Rewrite for a cache hit so callers can tell a reused value from a
    /// fresh one.
    pub fn into_cached(mut self) -> Self {
        self.reason = ResolutionReason::Cached;
        self.timestamp = Utc::now();
        self
    }

    pub fn is_error(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Inputs a flag may be targeted on: an optional targeting key plus free-form
/// attributes. Part of the cache key via [`EvaluationContext::fingerprint`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targeting_key: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, FlagValue>,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_targeting_key(targeting_key: impl Into<String>) -> Self {
        Self {
            targeting_key: Some(targeting_key.into()),
            attributes: HashMap::new(),
        }
    }

    pub fn targeting_key(mut self, targeting_key: impl Into<String>) -> Self {
        self.targeting_key = Some(targeting_key.into());
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<FlagValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attributes(mut self, attrs: HashMap<String, FlagValue>) -> Self {
        self.attributes.extend(attrs);
        self
    }

    pub fn merge(&self, other: Option<&EvaluationContext>) -> EvaluationContext {
        match other {
            None => self.clone(),
            Some(other) => {
                let mut merged = self.clone();
                if other.targeting_key.is_some() {
                    merged.targeting_key = other.targeting_key.clone();
                }
                merged.attributes.extend(other.attributes.clone());
                merged
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targeting_key.is_none() && self.attributes.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&FlagValue> {
        self.attributes.get(key)
    }

    /// The JSON form sent over the wire; also the fingerprint input.
    /// Attributes sit at the top level with the targeting key under the
    /// reserved `targetingKey` field.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (key, value) in &self.attributes {
            map.insert(key.clone(), value.to_json());
        }
        if let Some(ref targeting_key) = self.targeting_key {
            map.insert(
                "targetingKey".to_string(),
                serde_json::Value::String(targeting_key.clone()),
            );
        }
        serde_json::Value::Object(map)
    }

    /// Stable fingerprint over the canonical (RFC 8785) JSON form.
    ///
    /// Two contexts with the same fields produce the same digest regardless
    /// of attribute insertion order, which is what makes this usable as half
    /// of a cache key.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json_canonicalizer::to_string(&self.to_json())
            .unwrap_or_else(|_| self.to_json().to_string());
        let digest = Sha256::digest(canonical.as_bytes());
        hex::encode(digest)
    }
}
