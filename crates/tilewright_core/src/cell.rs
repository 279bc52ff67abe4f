//! A single tile-grid cell - tile reference plus flip flags

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to one tile of a tileset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRef {
    /// The id of the tileset owning the tile
    pub tileset: Uuid,
    /// 0-based local tile id within the tileset
    pub tile_id: u32,
}

/// One cell of a tile layer.
///
/// An empty cell carries no tile reference at all; it is distinct from a
/// reference to tile id 0. Flip flags participate in equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Cell {
    pub tile: Option<TileRef>,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
    /// Anti-diagonal flip, used for 90-degree tile rotation
    #[serde(default)]
    pub flip_anti_diagonal: bool,
}

impl Cell {
    /// The empty cell
    pub const EMPTY: Cell = Cell {
        tile: None,
        flip_horizontal: false,
        flip_vertical: false,
        flip_anti_diagonal: false,
    };

    /// Create an unflipped cell referring to a tile
    pub fn new(tileset: Uuid, tile_id: u32) -> Self {
        Cell {
            tile: Some(TileRef { tileset, tile_id }),
            ..Cell::EMPTY
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tile.is_none()
    }

    /// The id of the referenced tileset, if any
    pub fn tileset(&self) -> Option<Uuid> {
        self.tile.map(|t| t.tileset)
    }
}
