//! External rule sets referenced by a scenario's `rules` property.
//!
//! A rules file is a JSON object. The only field the core interprets is the
//! `terrain.names` table, whose keys are written as strings and normalized to
//! integer terrain ids on load. Every other field is retained verbatim.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map as JsonMap, Value as JsonValue};
use thiserror::Error;

pub const TERRAIN_NAMES_KEY: &str = "terrain.names";

#[derive(Debug, Error)]
pub enum RulesError {
    #[error("failed to read rules from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse rules from {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("rules document must be a JSON object")]
    NotADocument,
    #[error("rules document has no {TERRAIN_NAMES_KEY:?} table")]
    MissingTerrainNames,
    #[error("terrain id {key:?} is not a non-negative integer")]
    InvalidTerrainKey { key: String },
    #[error("terrain {terrain} has a non-string name")]
    InvalidTerrainName { terrain: u32 },
    #[error("scenario has no `rules` property")]
    MissingRulesProperty,
    #[error("no rules are loaded")]
    NotLoaded,
    #[error("terrain {terrain} has no name in the loaded rules")]
    UnknownTerrain { terrain: u32 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rules {
    terrain_names: BTreeMap<u32, String>,
    extra: JsonMap<String, JsonValue>,
}

impl Rules {
    /// Read `dir/identifier` and normalize it.
    pub fn load(dir: &Path, identifier: &str) -> Result<Self, RulesError> {
        let path = dir.join(identifier);
        let contents = fs::read_to_string(&path).map_err(|source| RulesError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        let document: JsonValue =
            serde_json::from_str(&contents).map_err(|source| RulesError::Parse {
                path: path.clone(),
                source,
            })?;
        let rules = Self::from_document(document)?;
        tracing::info!(
            target: "imperia::rules",
            path = %path.display(),
            terrains = rules.terrain_names.len(),
            "rules.loaded"
        );
        Ok(rules)
    }

    pub fn from_document(document: JsonValue) -> Result<Self, RulesError> {
        let JsonValue::Object(mut fields) = document else {
            return Err(RulesError::NotADocument);
        };
        let Some(JsonValue::Object(raw_names)) = fields.remove(TERRAIN_NAMES_KEY) else {
            return Err(RulesError::MissingTerrainNames);
        };

        let mut terrain_names = BTreeMap::new();
        for (key, name) in raw_names {
            let terrain: u32 = key
                .trim()
                .parse()
                .map_err(|_| RulesError::InvalidTerrainKey { key: key.clone() })?;
            let JsonValue::String(name) = name else {
                return Err(RulesError::InvalidTerrainName { terrain });
            };
            terrain_names.insert(terrain, name);
        }

        Ok(Self {
            terrain_names,
            extra: fields,
        })
    }

    pub fn terrain_name(&self, terrain: u32) -> Result<&str, RulesError> {
        self.terrain_names
            .get(&terrain)
            .map(String::as_str)
            .ok_or(RulesError::UnknownTerrain { terrain })
    }

    pub fn terrain_names(&self) -> &BTreeMap<u32, String> {
        &self.terrain_names
    }

    /// Any rules field other than the terrain table.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.extra.get(key)
    }

    /// Normalized document: terrain ids are written back in canonical
    /// decimal form, everything else as loaded.
    pub fn to_document(&self) -> JsonValue {
        let names: JsonMap<String, JsonValue> = self
            .terrain_names
            .iter()
            .map(|(terrain, name)| (terrain.to_string(), JsonValue::from(name.as_str())))
            .collect();
        let mut document = self.extra.clone();
        document.insert(TERRAIN_NAMES_KEY.to_string(), JsonValue::Object(names));
        JsonValue::Object(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_keys_become_terrain_ids() {
        let rules = Rules::from_document(json!({
            "terrain.names": {"0": "Sea", "1": "Plain", "12": "Mountain"},
            "movement.cost": [1, 2, 3]
        }))
        .unwrap();
        assert_eq!(rules.terrain_name(12).unwrap(), "Mountain");
        assert_eq!(rules.terrain_name(0).unwrap(), "Sea");
        assert_eq!(rules.get("movement.cost"), Some(&json!([1, 2, 3])));
        assert!(rules.get(TERRAIN_NAMES_KEY).is_none());
    }

    #[test]
    fn document_uses_canonical_terrain_keys() {
        let rules = Rules::from_document(json!({
            "terrain.names": {"007": "Hills", " 2": "Desert"},
            "version": 3
        }))
        .unwrap();
        assert_eq!(
            rules.to_document(),
            json!({"terrain.names": {"2": "Desert", "7": "Hills"}, "version": 3})
        );
        assert_eq!(Rules::from_document(rules.to_document()).unwrap(), rules);
    }

    #[test]
    fn unknown_terrain_is_an_error() {
        let rules = Rules::from_document(json!({"terrain.names": {"0": "Sea"}})).unwrap();
        assert!(matches!(
            rules.terrain_name(3),
            Err(RulesError::UnknownTerrain { terrain: 3 })
        ));
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(matches!(
            Rules::from_document(json!([1, 2])),
            Err(RulesError::NotADocument)
        ));
        assert!(matches!(
            Rules::from_document(json!({"terrain": {}})),
            Err(RulesError::MissingTerrainNames)
        ));
        assert!(matches!(
            Rules::from_document(json!({"terrain.names": {"sea": "Sea"}})),
            Err(RulesError::InvalidTerrainKey { .. })
        ));
        assert!(matches!(
            Rules::from_document(json!({"terrain.names": {"-1": "Sea"}})),
            Err(RulesError::InvalidTerrainKey { .. })
        ));
        assert!(matches!(
            Rules::from_document(json!({"terrain.names": {"2": 7}})),
            Err(RulesError::InvalidTerrainName { terrain: 2 })
        ));
    }

    #[test]
    fn loads_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("default.rules"),
            r#"{"terrain.names": {"0": "Sea", "1": "Plain"}}"#,
        )
        .unwrap();
        let rules = Rules::load(dir.path(), "default.rules").unwrap();
        assert_eq!(rules.terrain_names().len(), 2);

        let missing = Rules::load(dir.path(), "absent.rules").unwrap_err();
        assert!(matches!(missing, RulesError::ReadFailed { .. }));

        fs::write(dir.path().join("broken.rules"), "{not json").unwrap();
        let broken = Rules::load(dir.path(), "broken.rules").unwrap_err();
        assert!(matches!(broken, RulesError::Parse { .. }));
    }
}
