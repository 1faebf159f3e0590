//! Authoritative state of one map: scenario maps and battle maps share this
//! container and differ only in a handful of property keys.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use crate::geometry::{self, TileDirection, TilePosition};
use crate::properties::{PropertyError, PropertyStore};
use crate::rules::{Rules, RulesError};
use crate::tile_map::TileMap;

pub const TITLE: &str = "title";
pub const BATTLE_TITLE: &str = "battle.title";
pub const DESCRIPTION: &str = "description";
pub const BATTLE_DESCRIPTION: &str = "battle.description";
pub const MAP_COLUMNS: &str = "map.columns";
pub const MAP_ROWS: &str = "map.rows";
pub const RIVERS: &str = "rivers";
pub const FORTIFICATION: &str = "fortification";
pub const RULES: &str = "rules";

pub const BATTLE_DEFAULT_TITLE: &str = "Battle";
pub const BATTLE_DEFAULT_COLUMNS: i32 = 40;
pub const BATTLE_DEFAULT_ROWS: i32 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MapKind {
    #[default]
    Scenario,
    Battle,
}

impl MapKind {
    /// Property holding the named tile lists (rivers or fortifications).
    pub fn feature_key(self) -> &'static str {
        match self {
            MapKind::Scenario => RIVERS,
            MapKind::Battle => FORTIFICATION,
        }
    }

    pub fn title_key(self) -> &'static str {
        match self {
            MapKind::Scenario => TITLE,
            MapKind::Battle => BATTLE_TITLE,
        }
    }

    pub fn description_key(self) -> &'static str {
        match self {
            MapKind::Scenario => DESCRIPTION,
            MapKind::Battle => BATTLE_DESCRIPTION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvinceId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NationId(pub u32);

impl fmt::Display for ProvinceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for NationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Province {
    pub tiles: Vec<TilePosition>,
    pub properties: PropertyStore,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Nation {
    pub properties: PropertyStore,
    pub provinces: Vec<ProvinceId>,
}

/// A river or fortification: a named run of tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub tiles: Vec<TilePosition>,
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("tile ({column}, {row}) is outside the {columns}x{rows} map")]
    OutOfBounds {
        column: i32,
        row: i32,
        columns: i32,
        rows: i32,
    },
    #[error("unknown property {key:?}")]
    UnknownProperty { key: String },
    #[error("property {key:?} has an unexpected type: {source}")]
    InvalidPropertyType {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unknown province {0}")]
    UnknownProvince(ProvinceId),
    #[error("unknown nation {0}")]
    UnknownNation(NationId),
    #[error("map dimensions must be positive, got {columns}x{rows}")]
    InvalidDimensions { columns: i32, rows: i32 },
    #[error(transparent)]
    Rules(#[from] RulesError),
}

impl From<PropertyError> for ScenarioError {
    fn from(err: PropertyError) -> Self {
        match err {
            PropertyError::Unknown { key } => ScenarioError::UnknownProperty { key },
            PropertyError::InvalidType { key, source } => {
                ScenarioError::InvalidPropertyType { key, source }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    kind: MapKind,
    properties: PropertyStore,
    map: TileMap,
    provinces: Vec<Province>,
    nations: Vec<Nation>,
    rules: Option<Rules>,
    /// Identifier the `rules` property held before the document replaced it.
    rules_source: Option<String>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self::new(MapKind::Scenario)
    }
}

impl Scenario {
    pub fn new(kind: MapKind) -> Self {
        let mut scenario = Self {
            kind,
            properties: PropertyStore::new(),
            map: TileMap::default(),
            provinces: Vec::new(),
            nations: Vec::new(),
            rules: None,
            rules_source: None,
        };
        scenario.reset();
        scenario
    }

    /// Battle map with the default title and a 40x17 map.
    pub fn new_battle() -> Self {
        let mut battle = Self::new(MapKind::Battle);
        battle.set_property(BATTLE_TITLE, BATTLE_DEFAULT_TITLE);
        battle.map = TileMap::new(BATTLE_DEFAULT_COLUMNS, BATTLE_DEFAULT_ROWS);
        battle.properties.set(MAP_COLUMNS, BATTLE_DEFAULT_COLUMNS);
        battle.properties.set(MAP_ROWS, BATTLE_DEFAULT_ROWS);
        battle
    }

    /// Assemble from already validated parts. Rules are not resolved.
    pub(crate) fn from_parts(
        kind: MapKind,
        properties: PropertyStore,
        map: TileMap,
        provinces: Vec<Province>,
        nations: Vec<Nation>,
    ) -> Self {
        Self {
            kind,
            properties,
            map,
            provinces,
            nations,
            rules: None,
            rules_source: None,
        }
    }

    pub fn kind(&self) -> MapKind {
        self.kind
    }

    /// Empty everything; only the feature list property survives, empty.
    pub fn reset(&mut self) {
        self.properties.clear();
        self.properties
            .set(self.kind.feature_key(), JsonValue::Array(Vec::new()));
        self.map = TileMap::default();
        self.provinces.clear();
        self.nations.clear();
        self.rules = None;
        self.rules_source = None;
    }

    /// Replace both map layers with zero-filled ones of the given size.
    pub fn create_map(&mut self, columns: i32, rows: i32) -> Result<(), ScenarioError> {
        if columns <= 0 || rows <= 0 {
            return Err(ScenarioError::InvalidDimensions { columns, rows });
        }
        self.properties.set(MAP_COLUMNS, columns);
        self.properties.set(MAP_ROWS, rows);
        self.map = TileMap::new(columns, rows);
        debug!(target: "imperia::scenario", columns, rows, "map.created");
        Ok(())
    }

    pub fn columns(&self) -> i32 {
        self.map.columns()
    }

    pub fn rows(&self) -> i32 {
        self.map.rows()
    }

    pub fn tile_map(&self) -> &TileMap {
        &self.map
    }

    fn checked_index(&self, column: i32, row: i32) -> Result<usize, ScenarioError> {
        self.map
            .index_of(TilePosition::new(column, row))
            .ok_or(ScenarioError::OutOfBounds {
                column,
                row,
                columns: self.map.columns(),
                rows: self.map.rows(),
            })
    }

    fn check_position(&self, position: TilePosition) -> Result<(), ScenarioError> {
        self.checked_index(position.column, position.row).map(|_| ())
    }

    pub fn map_index(&self, column: i32, row: i32) -> Result<usize, ScenarioError> {
        self.checked_index(column, row)
    }

    pub fn terrain_at(&self, column: i32, row: i32) -> Result<u32, ScenarioError> {
        let index = self.checked_index(column, row)?;
        Ok(self.map.terrain()[index])
    }

    pub fn set_terrain_at(
        &mut self,
        column: i32,
        row: i32,
        terrain: u32,
    ) -> Result<(), ScenarioError> {
        let index = self.checked_index(column, row)?;
        self.map.terrain_mut()[index] = terrain;
        Ok(())
    }

    pub fn resource_at(&self, column: i32, row: i32) -> Result<u32, ScenarioError> {
        let index = self.checked_index(column, row)?;
        Ok(self.map.resource()[index])
    }

    pub fn set_resource_at(
        &mut self,
        column: i32,
        row: i32,
        resource: u32,
    ) -> Result<(), ScenarioError> {
        let index = self.checked_index(column, row)?;
        self.map.resource_mut()[index] = resource;
        Ok(())
    }

    pub fn map_position(&self, x: f64, y: f64) -> TilePosition {
        geometry::map_position(x, y, self.columns(), self.rows())
    }

    pub fn scene_position(&self, column: i32, row: i32) -> Result<(f64, f64), ScenarioError> {
        self.checked_index(column, row)?;
        Ok(geometry::scene_position(column, row))
    }

    pub fn neighbors(&self, column: i32, row: i32) -> Result<Vec<TilePosition>, ScenarioError> {
        self.checked_index(column, row)?;
        Ok(geometry::neighbors(column, row, self.columns(), self.rows()))
    }

    pub fn neighbor(
        &self,
        column: i32,
        row: i32,
        direction: TileDirection,
    ) -> Result<Option<TilePosition>, ScenarioError> {
        self.checked_index(column, row)?;
        Ok(geometry::neighbor(
            column,
            row,
            direction,
            self.columns(),
            self.rows(),
        ))
    }

    pub fn get_property(&self, key: &str) -> Result<&JsonValue, ScenarioError> {
        Ok(self.properties.get(key)?)
    }

    pub fn get_property_as<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<T, ScenarioError> {
        Ok(self.properties.get_as(key)?)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.properties.set(key, value);
    }

    pub fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    /// Title under the key this map kind uses.
    pub fn title(&self) -> Result<String, ScenarioError> {
        self.get_property_as(self.kind.title_key())
    }

    pub fn description(&self) -> Result<String, ScenarioError> {
        self.get_property_as(self.kind.description_key())
    }

    pub fn features(&self) -> Result<Vec<Feature>, ScenarioError> {
        self.get_property_as(self.kind.feature_key())
    }

    /// Append a named tile list to this map's feature property.
    pub fn add_feature(
        &mut self,
        name: impl Into<String>,
        tiles: Vec<TilePosition>,
    ) -> Result<(), ScenarioError> {
        for &tile in &tiles {
            self.check_position(tile)?;
        }
        let key = self.kind.feature_key();
        let mut features = self.features()?;
        features.push(Feature {
            name: name.into(),
            tiles,
        });
        let value = serde_json::to_value(features).map_err(|source| {
            ScenarioError::InvalidPropertyType {
                key: key.to_string(),
                source,
            }
        })?;
        self.properties.set(key, value);
        Ok(())
    }

    pub fn add_river(
        &mut self,
        name: impl Into<String>,
        tiles: Vec<TilePosition>,
    ) -> Result<(), ScenarioError> {
        self.add_feature(name, tiles)
    }

    pub fn add_fortification(
        &mut self,
        name: impl Into<String>,
        tiles: Vec<TilePosition>,
    ) -> Result<(), ScenarioError> {
        self.add_feature(name, tiles)
    }

    pub fn new_province(&mut self) -> ProvinceId {
        let id = ProvinceId(self.provinces.len() as u32);
        self.provinces.push(Province::default());
        debug!(target: "imperia::scenario", province = id.0, "province.created");
        id
    }

    pub fn province(&self, province: ProvinceId) -> Result<&Province, ScenarioError> {
        self.provinces
            .get(province.0 as usize)
            .ok_or(ScenarioError::UnknownProvince(province))
    }

    fn province_mut(&mut self, province: ProvinceId) -> Result<&mut Province, ScenarioError> {
        self.provinces
            .get_mut(province.0 as usize)
            .ok_or(ScenarioError::UnknownProvince(province))
    }

    pub fn set_province_property(
        &mut self,
        province: ProvinceId,
        key: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Result<(), ScenarioError> {
        self.province_mut(province)?.properties.set(key, value);
        Ok(())
    }

    pub fn get_province_property(
        &self,
        province: ProvinceId,
        key: &str,
    ) -> Result<&JsonValue, ScenarioError> {
        Ok(self.province(province)?.properties.get(key)?)
    }

    pub fn add_province_tile(
        &mut self,
        province: ProvinceId,
        position: TilePosition,
    ) -> Result<(), ScenarioError> {
        self.check_position(position)?;
        self.province_mut(province)?.tiles.push(position);
        Ok(())
    }

    pub fn province_tiles(&self, province: ProvinceId) -> Result<&[TilePosition], ScenarioError> {
        Ok(&self.province(province)?.tiles)
    }

    pub fn all_provinces(&self) -> impl Iterator<Item = ProvinceId> + '_ {
        (0..self.provinces.len() as u32).map(ProvinceId)
    }

    pub fn provinces(&self) -> &[Province] {
        &self.provinces
    }

    /// First-created province whose tile list contains the position.
    pub fn get_province_at(&self, column: i32, row: i32) -> Option<ProvinceId> {
        let position = TilePosition::new(column, row);
        self.provinces
            .iter()
            .position(|province| province.tiles.contains(&position))
            .map(|index| ProvinceId(index as u32))
    }

    pub fn new_nation(&mut self) -> NationId {
        let id = NationId(self.nations.len() as u32);
        self.nations.push(Nation::default());
        debug!(target: "imperia::scenario", nation = id.0, "nation.created");
        id
    }

    pub fn nation(&self, nation: NationId) -> Result<&Nation, ScenarioError> {
        self.nations
            .get(nation.0 as usize)
            .ok_or(ScenarioError::UnknownNation(nation))
    }

    fn nation_mut(&mut self, nation: NationId) -> Result<&mut Nation, ScenarioError> {
        self.nations
            .get_mut(nation.0 as usize)
            .ok_or(ScenarioError::UnknownNation(nation))
    }

    pub fn set_nation_property(
        &mut self,
        nation: NationId,
        key: impl Into<String>,
        value: impl Into<JsonValue>,
    ) -> Result<(), ScenarioError> {
        self.nation_mut(nation)?.properties.set(key, value);
        Ok(())
    }

    pub fn get_nation_property(
        &self,
        nation: NationId,
        key: &str,
    ) -> Result<&JsonValue, ScenarioError> {
        Ok(self.nation(nation)?.properties.get(key)?)
    }

    pub fn provinces_of_nation(&self, nation: NationId) -> Result<&[ProvinceId], ScenarioError> {
        Ok(&self.nation(nation)?.provinces)
    }

    pub fn all_nations(&self) -> impl Iterator<Item = NationId> + '_ {
        (0..self.nations.len() as u32).map(NationId)
    }

    pub fn nations(&self) -> &[Nation] {
        &self.nations
    }

    /// Appends the province to the nation's list. A province may end up
    /// listed under several nations; nothing here prevents that.
    pub fn transfer_province_to_nation(
        &mut self,
        province: ProvinceId,
        nation: NationId,
    ) -> Result<(), ScenarioError> {
        self.province(province)?;
        self.nation_mut(nation)?.provinces.push(province);
        debug!(
            target: "imperia::scenario",
            province = province.0,
            nation = nation.0,
            "province.transferred"
        );
        Ok(())
    }

    /// Resolve the `rules` identifier against `dir` and merge the normalized
    /// rules document into the property store under `rules`.
    ///
    /// The identifier is remembered, so calling this again reloads the same
    /// file and saves write the identifier rather than the document. Setting
    /// `rules` to a new string selects a different file.
    pub fn load_rules(&mut self, dir: &Path) -> Result<(), ScenarioError> {
        let identifier = match self.properties.get(RULES) {
            Ok(JsonValue::String(identifier)) => identifier.clone(),
            Ok(_) => match &self.rules_source {
                Some(identifier) => identifier.clone(),
                None => return Err(RulesError::MissingRulesProperty.into()),
            },
            Err(_) => return Err(RulesError::MissingRulesProperty.into()),
        };
        let rules = Rules::load(dir, &identifier)?;
        self.properties.set(RULES, rules.to_document());
        self.rules = Some(rules);
        self.rules_source = Some(identifier);
        Ok(())
    }

    pub fn rules(&self) -> Option<&Rules> {
        self.rules.as_ref()
    }

    /// File the loaded rules came from.
    pub fn rules_source(&self) -> Option<&str> {
        self.rules_source.as_deref()
    }

    /// Properties as written to a save: a merged rules document is swapped
    /// back for the identifier it was loaded from.
    pub(crate) fn saved_properties(&self) -> PropertyStore {
        let mut properties = self.properties.clone();
        let merged = !matches!(properties.get(RULES), Ok(JsonValue::String(_)));
        if let Some(identifier) = self.rules_source.as_deref().filter(|_| merged) {
            properties.set(RULES, identifier);
        }
        properties
    }

    pub fn terrain_name(&self, terrain: u32) -> Result<&str, ScenarioError> {
        let rules = self.rules.as_ref().ok_or(RulesError::NotLoaded)?;
        Ok(rules.terrain_name(terrain)?)
    }
}
