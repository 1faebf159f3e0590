use serde::{Deserialize, Serialize};

use crate::geometry::{map_index, TilePosition};

/// Parallel terrain and resource layers, both `columns * rows` long.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileMap {
    columns: i32,
    rows: i32,
    layers: MapLayers,
}

/// On-disk shape of the map document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapLayers {
    pub terrain: Vec<u32>,
    pub resource: Vec<u32>,
}

impl TileMap {
    /// Zero-filled map. Dimensions must already be validated as positive.
    pub fn new(columns: i32, rows: i32) -> Self {
        let tiles = (columns.max(0) as usize) * (rows.max(0) as usize);
        Self {
            columns,
            rows,
            layers: MapLayers {
                terrain: vec![0; tiles],
                resource: vec![0; tiles],
            },
        }
    }

    /// Rebuild from stored layers; `None` if either layer has the wrong length.
    pub fn from_layers(columns: i32, rows: i32, layers: MapLayers) -> Option<Self> {
        if columns < 0 || rows < 0 {
            return None;
        }
        let tiles = (columns as usize) * (rows as usize);
        if layers.terrain.len() != tiles || layers.resource.len() != tiles {
            return None;
        }
        Some(Self {
            columns,
            rows,
            layers,
        })
    }

    pub fn columns(&self) -> i32 {
        self.columns
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.layers.terrain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.terrain.is_empty()
    }

    pub fn contains(&self, position: TilePosition) -> bool {
        position.within(self.columns, self.rows)
    }

    /// Bounds-checked linear index.
    pub fn index_of(&self, position: TilePosition) -> Option<usize> {
        self.contains(position)
            .then(|| map_index(position.column, position.row, self.columns))
    }

    pub fn terrain(&self) -> &[u32] {
        &self.layers.terrain
    }

    pub fn resource(&self) -> &[u32] {
        &self.layers.resource
    }

    pub fn terrain_mut(&mut self) -> &mut [u32] {
        &mut self.layers.terrain
    }

    pub fn resource_mut(&mut self) -> &mut [u32] {
        &mut self.layers.resource
    }

    pub fn layers(&self) -> &MapLayers {
        &self.layers
    }
}
