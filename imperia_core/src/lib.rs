//! Authoritative scenario state for the Imperia server.
//!
//! A [`Scenario`] holds the staggered tile map, the property bag and the
//! province/nation registries. Saves go through [`archive`]; clients talk to
//! a [`ScenarioServer`] over the `imperia_net` transport.

pub mod archive;
pub mod config;
pub mod geometry;
mod properties;
pub mod rules;
pub mod scenario;
pub mod service;
mod tile_map;

pub use archive::{read_archive, write_archive, ArchiveError};
pub use config::{load_config_from_env, ConfigError, ImperiaConfig};
pub use geometry::{
    map_index, map_position, neighbor, neighbors, neighbors_by_direction, scene_position,
    TileDirection, TilePosition,
};
pub use properties::{PropertyError, PropertyStore};
pub use rules::{Rules, RulesError};
pub use scenario::{
    Feature, MapKind, Nation, NationId, Province, ProvinceId, Scenario, ScenarioError,
};
pub use service::{handle_message, parse_request, summary_message, Request, ScenarioServer};
pub use tile_map::{MapLayers, TileMap};
