//! Scenario save files.
//!
//! A save is a zip archive holding four JSON documents: `properties`, `map`,
//! `provinces` and `nations`. Province and nation documents are objects keyed
//! by the decimal id, so loading parses the keys back and insists they form
//! the dense range `0..n`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::properties::PropertyStore;
use crate::scenario::{
    MapKind, Nation, Province, ProvinceId, Scenario, ScenarioError, MAP_COLUMNS, MAP_ROWS, RULES,
};
use crate::tile_map::{MapLayers, TileMap};

pub const PROPERTIES_DOCUMENT: &str = "properties";
pub const MAP_DOCUMENT: &str = "map";
pub const PROVINCES_DOCUMENT: &str = "provinces";
pub const NATIONS_DOCUMENT: &str = "nations";

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("archive container is unreadable: {0}")]
    Zip(#[from] ZipError),
    #[error("archive has no {name:?} document")]
    MissingDocument { name: &'static str },
    #[error("archive document {name:?} is corrupt: {source}")]
    CorruptDocument {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode archive document {name:?}: {source}")]
    EncodeDocument {
        name: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("map layers do not match {columns}x{rows} (terrain {terrain}, resource {resource})")]
    MapSizeMismatch {
        columns: i32,
        rows: i32,
        terrain: usize,
        resource: usize,
    },
    #[error("{name:?} ids are not the dense range 0..n (offending key {key:?})")]
    NonDenseIds { name: &'static str, key: String },
    #[error("nation {nation} lists unknown province {province}")]
    DanglingProvince { nation: u32, province: ProvinceId },
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}

fn document_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn write_document<W, T>(
    zip: &mut ZipWriter<W>,
    name: &'static str,
    value: &T,
) -> Result<(), ArchiveError>
where
    W: Write + Seek,
    T: Serialize + ?Sized,
{
    let bytes = serde_json::to_vec(value)
        .map_err(|source| ArchiveError::EncodeDocument { name, source })?;
    zip.start_file(name, document_options())?;
    zip.write_all(&bytes)?;
    Ok(())
}

fn read_document<R, T>(zip: &mut ZipArchive<R>, name: &'static str) -> Result<T, ArchiveError>
where
    R: Read + Seek,
    T: DeserializeOwned,
{
    let mut entry = match zip.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Err(ArchiveError::MissingDocument { name }),
        Err(err) => return Err(err.into()),
    };
    let mut contents = Vec::new();
    entry.read_to_end(&mut contents)?;
    serde_json::from_slice(&contents)
        .map_err(|source| ArchiveError::CorruptDocument { name, source })
}

/// Id-keyed document back into a dense vector.
fn dense_records<T>(
    name: &'static str,
    keyed: BTreeMap<String, T>,
) -> Result<Vec<T>, ArchiveError> {
    let mut by_id = BTreeMap::new();
    for (key, record) in keyed {
        let id: u32 = key
            .parse()
            .map_err(|_| ArchiveError::NonDenseIds {
                name,
                key: key.clone(),
            })?;
        if by_id.insert(id, record).is_some() {
            return Err(ArchiveError::NonDenseIds { name, key });
        }
    }
    let mut records = Vec::with_capacity(by_id.len());
    for (expected, (id, record)) in by_id.into_iter().enumerate() {
        if id as usize != expected {
            return Err(ArchiveError::NonDenseIds {
                name,
                key: id.to_string(),
            });
        }
        records.push(record);
    }
    Ok(records)
}

fn keyed_records<T>(records: &[T]) -> BTreeMap<String, &T> {
    records
        .iter()
        .enumerate()
        .map(|(id, record)| (id.to_string(), record))
        .collect()
}

fn dimension(properties: &PropertyStore, key: &str) -> Result<i32, ArchiveError> {
    if !properties.contains(key) {
        return Ok(0);
    }
    let value = properties.get_as::<i32>(key).map_err(ScenarioError::from)?;
    Ok(value)
}

/// Write the four documents into a zip container.
pub fn write_archive<W: Write + Seek>(scenario: &Scenario, writer: W) -> Result<W, ArchiveError> {
    let mut zip = ZipWriter::new(writer);
    write_document(&mut zip, PROPERTIES_DOCUMENT, &scenario.saved_properties())?;
    write_document(&mut zip, MAP_DOCUMENT, scenario.tile_map().layers())?;
    write_document(&mut zip, PROVINCES_DOCUMENT, &keyed_records(scenario.provinces()))?;
    write_document(&mut zip, NATIONS_DOCUMENT, &keyed_records(scenario.nations()))?;
    Ok(zip.finish()?)
}

/// Read and validate a save. Rules are left unresolved.
pub fn read_archive<R: Read + Seek>(reader: R, kind: MapKind) -> Result<Scenario, ArchiveError> {
    let mut zip = ZipArchive::new(reader)?;
    let properties: PropertyStore = read_document(&mut zip, PROPERTIES_DOCUMENT)?;
    let layers: MapLayers = read_document(&mut zip, MAP_DOCUMENT)?;
    let provinces: BTreeMap<String, Province> = read_document(&mut zip, PROVINCES_DOCUMENT)?;
    let nations: BTreeMap<String, Nation> = read_document(&mut zip, NATIONS_DOCUMENT)?;

    let columns = dimension(&properties, MAP_COLUMNS)?;
    let rows = dimension(&properties, MAP_ROWS)?;
    let (terrain, resource) = (layers.terrain.len(), layers.resource.len());
    let map = TileMap::from_layers(columns, rows, layers).ok_or(ArchiveError::MapSizeMismatch {
        columns,
        rows,
        terrain,
        resource,
    })?;

    let provinces = dense_records(PROVINCES_DOCUMENT, provinces)?;
    let nations = dense_records(NATIONS_DOCUMENT, nations)?;

    for province in &provinces {
        if let Some(&tile) = province.tiles.iter().find(|tile| !map.contains(**tile)) {
            return Err(ScenarioError::OutOfBounds {
                column: tile.column,
                row: tile.row,
                columns,
                rows,
            }
            .into());
        }
    }
    for (nation, record) in nations.iter().enumerate() {
        if let Some(&province) = record
            .provinces
            .iter()
            .find(|province| province.0 as usize >= provinces.len())
        {
            return Err(ArchiveError::DanglingProvince {
                nation: nation as u32,
                province,
            });
        }
    }

    Ok(Scenario::from_parts(kind, properties, map, provinces, nations))
}

impl Scenario {
    pub fn save(&self, path: &Path) -> Result<(), ArchiveError> {
        let file = File::create(path)?;
        let mut writer = write_archive(self, BufWriter::new(file))?;
        writer.flush()?;
        info!(
            target: "imperia::archive",
            path = %path.display(),
            provinces = self.provinces().len(),
            nations = self.nations().len(),
            "scenario.saved"
        );
        Ok(())
    }

    /// Replace this scenario with the save at `path`, resolving its rules
    /// against `rules_dir`. On any failure `self` is left untouched.
    pub fn load(&mut self, path: &Path, rules_dir: &Path) -> Result<(), ArchiveError> {
        let result = File::open(path)
            .map_err(ArchiveError::from)
            .and_then(|file| read_archive(BufReader::new(file), self.kind()))
            .and_then(|mut staged| {
                if staged.properties().contains(RULES) {
                    staged.load_rules(rules_dir)?;
                }
                Ok(staged)
            });
        match result {
            Ok(staged) => {
                *self = staged;
                info!(
                    target: "imperia::archive",
                    path = %path.display(),
                    columns = self.columns(),
                    rows = self.rows(),
                    "scenario.loaded"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    target: "imperia::archive",
                    path = %path.display(),
                    error = %err,
                    "scenario.load_failed"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::TilePosition;
    use crate::scenario::{NationId, TITLE};
    use serde_json::json;
    use std::fs;
    use std::io::Cursor;

    fn sample() -> Scenario {
        let mut scenario = Scenario::default();
        scenario.set_property(TITLE, "Europe 1815");
        scenario.create_map(4, 3).unwrap();
        scenario.set_terrain_at(2, 1, 7).unwrap();
        scenario.set_resource_at(3, 2, 4).unwrap();
        scenario
            .add_river("Danube", vec![TilePosition::new(0, 0), TilePosition::new(1, 0)])
            .unwrap();
        let province = scenario.new_province();
        scenario
            .add_province_tile(province, TilePosition::new(2, 1))
            .unwrap();
        scenario
            .set_province_property(province, "name", "Bohemia")
            .unwrap();
        let nation = scenario.new_nation();
        scenario.set_nation_property(nation, "name", "Austria").unwrap();
        scenario.transfer_province_to_nation(province, nation).unwrap();
        scenario
    }

    fn raw_archive(documents: &[(&str, serde_json::Value)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, value) in documents {
            zip.start_file(*name, document_options()).unwrap();
            zip.write_all(value.to_string().as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn round_trip_in_memory() {
        let scenario = sample();
        let bytes = write_archive(&scenario, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        let loaded = read_archive(Cursor::new(bytes), MapKind::Scenario).unwrap();
        assert_eq!(loaded, scenario);
        assert_eq!(
            loaded.provinces_of_nation(NationId(0)).unwrap(),
            &[ProvinceId(0)]
        );
    }

    #[test]
    fn province_keys_are_strings_on_disk() {
        let scenario = sample();
        let bytes = write_archive(&scenario, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let provinces: serde_json::Value = read_document(&mut zip, PROVINCES_DOCUMENT).unwrap();
        assert_eq!(
            provinces,
            json!({"0": {"tiles": [[2, 1]], "properties": {"name": "Bohemia"}}})
        );
        let nations: serde_json::Value = read_document(&mut zip, NATIONS_DOCUMENT).unwrap();
        assert_eq!(nations["0"]["provinces"], json!([0]));
    }

    #[test]
    fn missing_document_is_reported() {
        let bytes = raw_archive(&[
            ("properties", json!({})),
            ("map", json!({"terrain": [], "resource": []})),
            ("provinces", json!({})),
        ]);
        let err = read_archive(Cursor::new(bytes), MapKind::Scenario).unwrap_err();
        assert!(matches!(err, ArchiveError::MissingDocument { name: "nations" }));
    }

    #[test]
    fn sparse_ids_are_rejected() {
        let bytes = raw_archive(&[
            ("properties", json!({})),
            ("map", json!({"terrain": [], "resource": []})),
            (
                "provinces",
                json!({"0": {"tiles": [], "properties": {}}, "2": {"tiles": [], "properties": {}}}),
            ),
            ("nations", json!({})),
        ]);
        let err = read_archive(Cursor::new(bytes), MapKind::Scenario).unwrap_err();
        assert!(matches!(err, ArchiveError::NonDenseIds { name: "provinces", .. }));

        let bytes = raw_archive(&[
            ("properties", json!({})),
            ("map", json!({"terrain": [], "resource": []})),
            ("provinces", json!({})),
            ("nations", json!({"first": {"properties": {}, "provinces": []}})),
        ]);
        let err = read_archive(Cursor::new(bytes), MapKind::Scenario).unwrap_err();
        assert!(matches!(err, ArchiveError::NonDenseIds { name: "nations", .. }));
    }

    #[test]
    fn map_layers_must_match_dimensions() {
        let bytes = raw_archive(&[
            ("properties", json!({"map.columns": 2, "map.rows": 2})),
            ("map", json!({"terrain": [0, 0, 0, 0], "resource": [0, 0, 0]})),
            ("provinces", json!({})),
            ("nations", json!({})),
        ]);
        let err = read_archive(Cursor::new(bytes), MapKind::Scenario).unwrap_err();
        assert!(matches!(err, ArchiveError::MapSizeMismatch { resource: 3, .. }));
    }

    #[test]
    fn dangling_nation_province_is_rejected() {
        let bytes = raw_archive(&[
            ("properties", json!({})),
            ("map", json!({"terrain": [], "resource": []})),
            ("provinces", json!({})),
            ("nations", json!({"0": {"properties": {}, "provinces": [3]}})),
        ]);
        let err = read_archive(Cursor::new(bytes), MapKind::Scenario).unwrap_err();
        assert!(matches!(err, ArchiveError::DanglingProvince { nation: 0, .. }));
    }

    #[test]
    fn garbage_document_is_corrupt() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("properties", document_options()).unwrap();
        zip.write_all(b"{{{").unwrap();
        let bytes = zip.finish().unwrap().into_inner();
        let err = read_archive(Cursor::new(bytes), MapKind::Scenario).unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptDocument { name: "properties", .. }));

        let err = read_archive(Cursor::new(b"not a zip".to_vec()), MapKind::Scenario).unwrap_err();
        assert!(matches!(err, ArchiveError::Zip(_)));
    }

    #[test]
    fn load_merges_rules_but_saves_identifier() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("europe.rules"),
            r#"{"terrain.names": {"0": "Sea", "7": "Hills"}}"#,
        )
        .unwrap();
        let mut scenario = sample();
        scenario.set_property(RULES, "europe.rules");
        let path = dir.path().join("europe.save");
        scenario.save(&path).unwrap();

        let mut loaded = Scenario::default();
        loaded.load(&path, dir.path()).unwrap();
        let terrain = loaded.terrain_at(2, 1).unwrap();
        assert_eq!(loaded.terrain_name(terrain).unwrap(), "Hills");
        assert_eq!(
            loaded.get_property(RULES).unwrap(),
            &json!({"terrain.names": {"0": "Sea", "7": "Hills"}})
        );
        assert_eq!(loaded.rules_source(), Some("europe.rules"));
        assert_eq!(loaded.tile_map(), scenario.tile_map());

        // Saving the loaded scenario writes the identifier, not the document.
        let bytes = write_archive(&loaded, Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let properties: PropertyStore = read_document(&mut zip, PROPERTIES_DOCUMENT).unwrap();
        assert_eq!(properties.get(RULES).unwrap(), &json!("europe.rules"));
        assert_eq!(
            loaded.get_property(RULES).unwrap()["terrain.names"]["7"],
            json!("Hills")
        );
    }

    #[test]
    fn failed_load_leaves_scenario_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let mut scenario = sample();
        scenario.set_property(RULES, "missing.rules");
        let path = dir.path().join("broken.save");
        scenario.save(&path).unwrap();

        let mut live = Scenario::new_battle();
        let before = live.clone();
        let err = live.load(&path, dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Scenario(ScenarioError::Rules(_))));
        assert_eq!(live, before);

        let err = live.load(&dir.path().join("absent.save"), dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::Io(_)));
        assert_eq!(live, before);
    }
}
