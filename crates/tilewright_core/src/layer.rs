//! Layer types - tile, object, image, and group layers

use crate::{Color, MapObject, Properties, TileLayerData};
use serde::{Deserialize, Serialize};

/// The type of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerKind {
    Tiles,
    Objects,
    Image,
    Group,
}

/// Rendering order of objects within an object layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DrawOrder {
    /// Objects are drawn in insertion order
    #[default]
    Index,
    /// Objects are drawn sorted by their y position
    TopDown,
}

/// The data of an object layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ObjectGroupData {
    pub objects: Vec<MapObject>,
    #[serde(default)]
    pub draw_order: DrawOrder,
}

/// The data of an image layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImageLayerData {
    /// Path to the image file
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transparent_color: Option<Color>,
}

/// The data of a group layer: an ordered list of child layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GroupLayerData {
    pub layers: Vec<Layer>,
}

/// The payload distinguishing the layer types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerData {
    Tiles(TileLayerData),
    Objects(ObjectGroupData),
    Image(ImageLayerData),
    Group(GroupLayerData),
}

/// A map layer.
///
/// The id is unique within a map, assigned when the layer is inserted, and
/// stays the same when the layer is moved or renamed. Group layers own their
/// children by value; parent lookups and effective opacity/visibility/lock
/// queries go through the [`Map`](crate::Map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// Unique id within the map; 0 until the layer is inserted into a map
    pub id: u32,
    pub name: String,
    /// Position in tile units
    pub x: i32,
    pub y: i32,
    /// Drawing offset in pixels
    pub offset: [f32; 2],
    pub opacity: f32,
    pub visible: bool,
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    pub data: LayerData,
}

impl Layer {
    fn new(name: impl Into<String>, data: LayerData) -> Self {
        Self {
            id: 0,
            name: name.into(),
            x: 0,
            y: 0,
            offset: [0.0, 0.0],
            opacity: 1.0,
            visible: true,
            locked: false,
            properties: Properties::new(),
            data,
        }
    }

    /// Create a tile layer with an all-empty grid of the given size
    pub fn new_tile_layer(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self::new(name, LayerData::Tiles(TileLayerData::new(width, height)))
    }

    /// Create an object layer with no objects
    pub fn new_object_layer(name: impl Into<String>) -> Self {
        Self::new(name, LayerData::Objects(ObjectGroupData::default()))
    }

    /// Create an image layer
    pub fn new_image_layer(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self::new(
            name,
            LayerData::Image(ImageLayerData {
                source: source.into(),
                transparent_color: None,
            }),
        )
    }

    /// Create a group layer with no children
    pub fn new_group_layer(name: impl Into<String>) -> Self {
        Self::new(name, LayerData::Group(GroupLayerData::default()))
    }

    pub fn kind(&self) -> LayerKind {
        match &self.data {
            LayerData::Tiles(_) => LayerKind::Tiles,
            LayerData::Objects(_) => LayerKind::Objects,
            LayerData::Image(_) => LayerKind::Image,
            LayerData::Group(_) => LayerKind::Group,
        }
    }

    pub fn is_tile_layer(&self) -> bool {
        matches!(self.data, LayerData::Tiles(_))
    }

    pub fn is_object_group(&self) -> bool {
        matches!(self.data, LayerData::Objects(_))
    }

    pub fn is_group_layer(&self) -> bool {
        matches!(self.data, LayerData::Group(_))
    }

    /// The tile grid, when this is a tile layer
    pub fn as_tile_layer(&self) -> Option<&TileLayerData> {
        match &self.data {
            LayerData::Tiles(tiles) => Some(tiles),
            _ => None,
        }
    }

    pub fn as_tile_layer_mut(&mut self) -> Option<&mut TileLayerData> {
        match &mut self.data {
            LayerData::Tiles(tiles) => Some(tiles),
            _ => None,
        }
    }

    /// The object list, when this is an object layer
    pub fn as_object_group(&self) -> Option<&ObjectGroupData> {
        match &self.data {
            LayerData::Objects(objects) => Some(objects),
            _ => None,
        }
    }

    pub fn as_object_group_mut(&mut self) -> Option<&mut ObjectGroupData> {
        match &mut self.data {
            LayerData::Objects(objects) => Some(objects),
            _ => None,
        }
    }

    pub fn as_image_layer(&self) -> Option<&ImageLayerData> {
        match &self.data {
            LayerData::Image(image) => Some(image),
            _ => None,
        }
    }

    /// The child list, when this is a group layer
    pub fn as_group_layer(&self) -> Option<&GroupLayerData> {
        match &self.data {
            LayerData::Group(group) => Some(group),
            _ => None,
        }
    }

    pub fn as_group_layer_mut(&mut self) -> Option<&mut GroupLayerData> {
        match &mut self.data {
            LayerData::Group(group) => Some(group),
            _ => None,
        }
    }

    /// Check whether the layer carries no content
    pub fn is_empty(&self) -> bool {
        match &self.data {
            LayerData::Tiles(tiles) => tiles.is_empty(),
            LayerData::Objects(objects) => objects.objects.is_empty(),
            LayerData::Image(image) => image.source.is_empty(),
            LayerData::Group(group) => group.layers.is_empty(),
        }
    }
}
