//! Core data structures for tilewright
//!
//! This crate provides the fundamental types for representing layered tile
//! maps:
//! - `Map` - A complete map: layer tree, tileset registry, id allocators
//! - `Layer` - A single layer (tiles, objects, image, or group)
//! - `TileLayerData` - The dense cell grid of a tile layer
//! - `Cell` - A tile reference plus flip flags
//! - `Tileset` - A named collection of tile identities
//! - `MapObject` - A positioned object with a geometric shape
//! - `Rect` / `Region` - Integer grid geometry with region algebra
//! - `Properties` / `Value` - Typed string-keyed property bags

mod cell;
mod geometry;
mod layer;
mod map;
mod object;
mod properties;
mod tile_layer;
mod tileset;

pub use cell::{Cell, TileRef};
pub use geometry::{Rect, Region};
pub use layer::{
    DrawOrder, GroupLayerData, ImageLayerData, Layer, LayerData, LayerKind, ObjectGroupData,
};
pub use map::{global_index, layer_at_global_index, LayerIter, Map, Margins, Orientation};
pub use object::{MapObject, ObjectShape};
pub use properties::{Color, Properties, PropertyError, Value};
pub use tile_layer::TileLayerData;
pub use tileset::Tileset;
