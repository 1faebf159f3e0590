//! String-keyed property bag shared by scenarios, provinces and nations.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PropertyError {
    #[error("property {key:?} has never been set")]
    Unknown { key: String },
    #[error("property {key:?} has an unexpected type: {source}")]
    InvalidType {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reading an absent key is an error; writes always overwrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PropertyStore {
    values: BTreeMap<String, JsonValue>,
}

impl PropertyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Result<&JsonValue, PropertyError> {
        self.values.get(key).ok_or_else(|| PropertyError::Unknown {
            key: key.to_string(),
        })
    }

    /// Typed read through serde.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, PropertyError> {
        let value = self.get(key)?;
        T::deserialize(value).map_err(|source| PropertyError::InvalidType {
            key: key.to_string(),
            source,
        })
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.values.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}
