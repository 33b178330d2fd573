//! Model status payload normalization
//!
//! The status endpoints answer with one of three JSON shapes:
//!
//! | Shape | Example |
//! |-------|---------|
//! | List | `[{"id": "a", "available": true}]` |
//! | Wrapped | `{"models": [{"id": "a", "available": true}]}` |
//! | Mapping | `{"a": {"up": true, "host": "gpu-1"}}` |
//!
//! [`normalize`] classifies the payload first and then applies the same
//! field-resolution rules to every entry. It never fails: anything it does not
//! recognize yields an empty list.

use serde::Serialize;
use serde_json::{Map, Value};

/// Provider reported when an entry names none
pub const DEFAULT_PROVIDER: &str = "ollama";

/// One model backend as shown in the status view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelStatusRecord {
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub provider: String,
    pub available: bool,
    pub latency_ms: Option<f64>,
    pub host: Option<String>,
    /// Entire source object, kept for mapping-shaped payloads only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_meta: Option<Map<String, Value>>,
}

impl ModelStatusRecord {
    /// Name shown in the list: display name, then id, then "model"
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("model")
    }

    /// `<provider> · <host>`, with "local" standing in for a missing host
    pub fn subtitle(&self) -> String {
        format!("{} · {}", self.provider, self.host.as_deref().unwrap_or("local"))
    }

    pub fn latency_label(&self) -> String {
        match self.latency_ms {
            Some(ms) if ms >= 0.0 => format!("{} ms", ms.round()),
            _ => "—".to_string(),
        }
    }

    /// Key that distinguishes rows within one poll cycle
    pub fn display_key(&self, index: usize) -> String {
        let base = self.id.as_deref().or(self.display_name.as_deref()).unwrap_or("m");
        format!("{base}{index}")
    }
}

/// Structural classification of a status payload
#[derive(Debug)]
enum PayloadShape<'a> {
    List(&'a [Value]),
    Wrapped(&'a [Value]),
    Mapping(&'a Map<String, Value>),
    Unrecognized,
}

impl<'a> PayloadShape<'a> {
    fn classify(payload: &'a Value) -> Self {
        match payload {
            Value::Array(items) => PayloadShape::List(items),
            Value::Object(map) => match map.get("models") {
                Some(Value::Array(items)) => PayloadShape::Wrapped(items),
                _ => PayloadShape::Mapping(map),
            },
            Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
                PayloadShape::Unrecognized
            }
        }
    }
}

/// Convert any status payload into an ordered list of records
pub fn normalize(payload: &Value) -> Vec<ModelStatusRecord> {
    match PayloadShape::classify(payload) {
        PayloadShape::List(items) | PayloadShape::Wrapped(items) => items
            .iter()
            .filter_map(Value::as_object)
            .map(|entry| resolve(entry, None))
            .collect(),
        PayloadShape::Mapping(map) => map
            .iter()
            .filter_map(|(key, value)| value.as_object().map(|entry| resolve(entry, Some(key))))
            .collect(),
        PayloadShape::Unrecognized => Vec::new(),
    }
}

fn resolve(entry: &Map<String, Value>, key: Option<&str>) -> ModelStatusRecord {
    let id = first_present(entry, &["id"])
        .map(text_of)
        .or_else(|| key.map(str::to_string));
    let display_name = first_present(entry, &["name"])
        .map(text_of)
        .or_else(|| key.map(str::to_string));
    let provider = first_present(entry, &["provider", "type"])
        .map(text_of)
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
    let available = first_present(entry, &["available", "up", "ok"])
        .map(truthy)
        .unwrap_or(false);
    let latency_ms = entry.get("latency_ms").and_then(Value::as_f64);
    let host = first_present(entry, &["host"]).map(text_of);

    ModelStatusRecord {
        id,
        display_name,
        provider,
        available,
        latency_ms,
        host,
        raw_meta: key.map(|_| entry.clone()),
    }
}

/// First listed field that is present and not null
fn first_present<'a>(entry: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    fields
        .iter()
        .filter_map(|field| entry.get(*field))
        .find(|value| !value.is_null())
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// True iff at least one record is available
pub fn any_available(records: &[ModelStatusRecord]) -> bool {
    records.iter().any(|r| r.available)
}
