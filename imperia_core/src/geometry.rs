//! Staggered-row tile geometry.
//!
//! Tiles are stored row-major. Every odd row is drawn shifted half a tile to
//! the right, so the diagonal neighbours of a tile depend on the parity of
//! its row. All functions here are pure and trust their caller to have
//! validated positions where noted.

use serde::{Deserialize, Serialize};

/// A `(column, row)` grid position. Serialized as a two-element list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "[i32; 2]", into = "[i32; 2]")]
pub struct TilePosition {
    pub column: i32,
    pub row: i32,
}

impl TilePosition {
    /// Returned by [`map_position`] when no tile lies under the point.
    pub const OFF_MAP: TilePosition = TilePosition {
        column: -1,
        row: -1,
    };

    pub const fn new(column: i32, row: i32) -> Self {
        Self { column, row }
    }

    pub fn is_off_map(self) -> bool {
        self == Self::OFF_MAP
    }

    pub fn within(self, columns: i32, rows: i32) -> bool {
        self.column >= 0 && self.column < columns && self.row >= 0 && self.row < rows
    }
}

impl From<[i32; 2]> for TilePosition {
    fn from([column, row]: [i32; 2]) -> Self {
        Self { column, row }
    }
}

impl From<TilePosition> for [i32; 2] {
    fn from(position: TilePosition) -> Self {
        [position.column, position.row]
    }
}

impl From<(i32, i32)> for TilePosition {
    fn from((column, row): (i32, i32)) -> Self {
        Self { column, row }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileDirection {
    West,
    NorthWest,
    NorthEast,
    East,
    SouthEast,
    SouthWest,
}

impl TileDirection {
    /// Fixed direction order used by [`neighbors`].
    pub const ALL: [TileDirection; 6] = [
        TileDirection::West,
        TileDirection::NorthWest,
        TileDirection::NorthEast,
        TileDirection::East,
        TileDirection::SouthEast,
        TileDirection::SouthWest,
    ];

    /// `(column, row)` step from a tile in an even or odd row.
    pub fn offset(self, odd_row: bool) -> (i32, i32) {
        match (self, odd_row) {
            (TileDirection::West, _) => (-1, 0),
            (TileDirection::East, _) => (1, 0),
            (TileDirection::NorthWest, false) => (-1, -1),
            (TileDirection::NorthWest, true) => (0, -1),
            (TileDirection::NorthEast, false) => (0, -1),
            (TileDirection::NorthEast, true) => (1, -1),
            (TileDirection::SouthEast, false) => (0, 1),
            (TileDirection::SouthEast, true) => (1, 1),
            (TileDirection::SouthWest, false) => (-1, 1),
            (TileDirection::SouthWest, true) => (0, 1),
        }
    }
}

fn is_odd(row: i32) -> bool {
    row.rem_euclid(2) == 1
}

/// Linear index of `(column, row)`. No bounds check.
pub fn map_index(column: i32, row: i32, columns: i32) -> usize {
    debug_assert!(column >= 0 && row >= 0, "map_index called with negative position");
    (row as usize) * (columns as usize) + column as usize
}

/// Continuous scene coordinates of the tile's origin.
pub fn scene_position(column: i32, row: i32) -> (f64, f64) {
    let x = if is_odd(row) {
        f64::from(column) + 0.5
    } else {
        f64::from(column)
    };
    (x, f64::from(row))
}

/// Tile under the scene point `(x, y)`, or [`TilePosition::OFF_MAP`].
pub fn map_position(x: f64, y: f64, columns: i32, rows: i32) -> TilePosition {
    if !x.is_finite() || !y.is_finite() {
        return TilePosition::OFF_MAP;
    }
    let row = y.floor();
    if row < 0.0 || row >= f64::from(rows) {
        return TilePosition::OFF_MAP;
    }
    let row = row as i32;
    let column = if is_odd(row) {
        (x - 0.5).floor()
    } else {
        x.floor()
    };
    if column < 0.0 || column >= f64::from(columns) {
        return TilePosition::OFF_MAP;
    }
    TilePosition::new(column as i32, row)
}

/// Neighbour of `(column, row)` in `direction`, if it lies on the map.
pub fn neighbor(
    column: i32,
    row: i32,
    direction: TileDirection,
    columns: i32,
    rows: i32,
) -> Option<TilePosition> {
    let (dc, dr) = direction.offset(is_odd(row));
    let position = TilePosition::new(column + dc, row + dr);
    position.within(columns, rows).then_some(position)
}

/// Neighbours indexed like [`TileDirection::ALL`].
pub fn neighbors_by_direction(
    column: i32,
    row: i32,
    columns: i32,
    rows: i32,
) -> [Option<TilePosition>; 6] {
    TileDirection::ALL.map(|direction| neighbor(column, row, direction, columns, rows))
}

/// On-map neighbours in direction order (west, NW, NE, east, SE, SW).
pub fn neighbors(column: i32, row: i32, columns: i32, rows: i32) -> Vec<TilePosition> {
    neighbors_by_direction(column, row, columns, rows)
        .into_iter()
        .flatten()
        .collect()
}
