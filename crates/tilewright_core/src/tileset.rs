//! Tileset - a named collection of tile identities

use crate::Properties;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tileset owning tiles identified by 0-based local id.
///
/// Maps reference tilesets through an explicit ordered list; a map may keep
/// a tileset in that list even when no cell currently uses it, so the save
/// order stays stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tileset {
    pub id: Uuid,
    pub name: String,
    /// Tile size in pixels
    pub tile_width: u32,
    pub tile_height: u32,
    /// Number of tile columns in the source image
    pub columns: u32,
    pub tile_count: u32,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

impl Tileset {
    pub fn new(
        name: impl Into<String>,
        tile_width: u32,
        tile_height: u32,
        columns: u32,
        tile_count: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tile_width,
            tile_height,
            columns,
            tile_count,
            properties: Properties::new(),
        }
    }

    /// Check whether `tile_id` identifies a tile of this tileset
    pub fn contains_tile(&self, tile_id: u32) -> bool {
        tile_id < self.tile_count
    }
}
