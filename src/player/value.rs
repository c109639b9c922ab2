//! Player property values
//!
//! mpv answers property reads with arbitrary JSON. Everything the bridge
//! handles is normalized into [`PropertyValue`], where `Absent` means the
//! read succeeded but there is no data (e.g. `sub-delay` with no subtitle).

use serde::Serialize;
use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One structured item of a list-valued property (playlist entry, track, chapter)
pub type Entry = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Queried successfully, no data. Serializes as `null`.
    #[default]
    Absent,
    Bool(bool),
    Number(Number),
    Text(String),
    List(Vec<Entry>),
    Map(BTreeMap<String, String>),
}

impl PropertyValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Text value that is present and non-empty
    pub fn non_empty_str(&self) -> Option<&str> {
        self.as_str().filter(|s| !s.is_empty())
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Absent,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::List(items.into_iter().map(entry_from_value).collect()),
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .filter_map(|(k, v)| scalar_text(&v).map(|text| (k, text)))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map(Self::Number).unwrap_or(Self::Absent)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", format_number(n)),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => write!(f, "[{} items]", items.len()),
            Self::Map(map) => write!(f, "{{{} entries}}", map.len()),
        }
    }
}

/// mpv reports doubles like `50.000000`; show integral values without a fraction.
fn format_number(n: &Number) -> String {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                return format!("{}", f as i64);
            }
        }
    }
    n.to_string()
}

fn entry_from_value(value: Value) -> Entry {
    match value {
        Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, PropertyValue::from(v)))
            .collect(),
        other => Entry::from([("value".to_string(), PropertyValue::from(other))]),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
