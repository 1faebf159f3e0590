use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};

/// A message value exchanged between server and clients.
///
/// The set of variants is closed: decoding can only ever produce scalars,
/// sequences and string-keyed mappings. Every node is written with an explicit
/// type tag (`{"t":"int","v":5}`) and a document carrying any other tag is
/// rejected while decoding.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase", deny_unknown_fields)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a mapping from `(key, value)` pairs.
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.get(key),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns `true` when every float in the tree is finite.
    pub fn is_finite(&self) -> bool {
        match self {
            Value::Float(value) => value.is_finite(),
            Value::Seq(items) => items.iter().all(Value::is_finite),
            Value::Map(entries) => entries.values().all(Value::is_finite),
            _ => true,
        }
    }

    /// True if some path from the root passes through more than `max`
    /// sequences or mappings. Iterative, so arbitrarily deep input is safe.
    pub fn nests_deeper_than(&self, max: usize) -> bool {
        let mut pending = vec![(self, 0usize)];
        while let Some((value, depth)) = pending.pop() {
            let children: Box<dyn Iterator<Item = &Value>> = match value {
                Value::Seq(items) => Box::new(items.iter()),
                Value::Map(entries) => Box::new(entries.values()),
                _ => continue,
            };
            let depth = depth + 1;
            if depth > max {
                return true;
            }
            pending.extend(children.map(|child| (child, depth)));
        }
        false
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Seq(items.into_iter().map(Into::into).collect())
    }
}

impl From<JsonValue> for Value {
    fn from(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(flag) => Value::Bool(flag),
            JsonValue::Number(number) => match number.as_i64() {
                Some(int) => Value::Int(int),
                None => Value::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(text) => Value::Str(text),
            JsonValue::Array(items) => Value::Seq(items.into_iter().map(Value::from).collect()),
            JsonValue::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

/// Non-finite floats have no JSON representation and become `null`.
impl From<Value> for JsonValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(flag) => JsonValue::Bool(flag),
            Value::Int(int) => JsonValue::Number(JsonNumber::from(int)),
            Value::Float(float) => JsonNumber::from_f64(float)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(text) => JsonValue::String(text),
            Value::Seq(items) => JsonValue::Array(items.into_iter().map(JsonValue::from).collect()),
            Value::Map(entries) => JsonValue::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, JsonValue::from(value)))
                    .collect::<JsonMap<String, JsonValue>>(),
            ),
        }
    }
}
