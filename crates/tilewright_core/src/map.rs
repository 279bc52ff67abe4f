//! The map - layer tree, tileset registry, and id allocation

use crate::{Layer, LayerData, LayerKind, MapObject, Properties, Rect, Tileset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Tile-grid geometry of a map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Orientation {
    #[default]
    Orthogonal,
    Isometric,
    Staggered,
    Hexagonal,
}

/// Extra pixels needed around the tile grid when drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Margins {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// A layered tile map.
///
/// Owns an ordered list of top-level layers (group layers own their children,
/// forming a tree) and an ordered list of tilesets. Layer and object ids are
/// allocated by the map and unique within it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Map {
    pub orientation: Orientation,
    /// Map size in tiles
    pub width: u32,
    pub height: u32,
    /// Tile size in pixels
    pub tile_width: u32,
    pub tile_height: u32,
    pub layers: Vec<Layer>,
    pub tilesets: Vec<Tileset>,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
    next_layer_id: u32,
    next_object_id: u32,
}

impl Map {
    pub fn new(width: u32, height: u32, tile_width: u32, tile_height: u32) -> Self {
        Self {
            orientation: Orientation::Orthogonal,
            width,
            height,
            tile_width,
            tile_height,
            layers: Vec::new(),
            tilesets: Vec::new(),
            properties: Properties::new(),
            next_layer_id: 1,
            next_object_id: 1,
        }
    }

    /// The map bounds in tile coordinates
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    /// Allocate the next layer id
    pub fn take_next_layer_id(&mut self) -> u32 {
        let id = self.next_layer_id;
        self.next_layer_id += 1;
        id
    }

    /// Allocate the next object id
    pub fn take_next_object_id(&mut self) -> u32 {
        let id = self.next_object_id;
        self.next_object_id += 1;
        id
    }

    /// Append `layer` as the topmost layer of the map, assigning ids to it,
    /// to any nested children, and to any objects it carries. Returns the
    /// id given to the layer itself.
    pub fn add_layer(&mut self, mut layer: Layer) -> u32 {
        self.assign_ids(&mut layer);
        let id = layer.id;
        self.layers.push(layer);
        id
    }

    /// Append `layer` as the last child of the group layer `group_id`.
    /// Returns the new layer's id, or `None` when `group_id` does not name a
    /// group layer of this map.
    pub fn add_layer_to_group(&mut self, group_id: u32, mut layer: Layer) -> Option<u32> {
        self.layer(group_id)?.as_group_layer()?;
        self.assign_ids(&mut layer);
        let id = layer.id;
        let group = self.layer_mut(group_id)?.as_group_layer_mut()?;
        group.layers.push(layer);
        Some(id)
    }

    fn assign_ids(&mut self, layer: &mut Layer) {
        if layer.id == 0 {
            layer.id = self.take_next_layer_id();
        } else {
            self.next_layer_id = self.next_layer_id.max(layer.id + 1);
        }
        match &mut layer.data {
            LayerData::Group(group) => {
                for child in &mut group.layers {
                    self.assign_ids(child);
                }
            }
            LayerData::Objects(objects) => {
                for object in &mut objects.objects {
                    if object.id == 0 {
                        object.id = self.take_next_object_id();
                    } else {
                        self.next_object_id = self.next_object_id.max(object.id + 1);
                    }
                }
            }
            _ => {}
        }
    }

    /// Remove the layer with the given id from wherever it sits in the tree
    pub fn remove_layer(&mut self, id: u32) -> Option<Layer> {
        fn remove_from(layers: &mut Vec<Layer>, id: u32) -> Option<Layer> {
            if let Some(pos) = layers.iter().position(|l| l.id == id) {
                return Some(layers.remove(pos));
            }
            for layer in layers {
                if let LayerData::Group(group) = &mut layer.data {
                    if let Some(found) = remove_from(&mut group.layers, id) {
                        return Some(found);
                    }
                }
            }
            None
        }
        remove_from(&mut self.layers, id)
    }

    /// Find the layer with the given id anywhere in the tree
    pub fn layer(&self, id: u32) -> Option<&Layer> {
        fn find(layers: &[Layer], id: u32) -> Option<&Layer> {
            for layer in layers {
                if layer.id == id {
                    return Some(layer);
                }
                if let LayerData::Group(group) = &layer.data {
                    if let Some(found) = find(&group.layers, id) {
                        return Some(found);
                    }
                }
            }
            None
        }
        find(&self.layers, id)
    }

    pub fn layer_mut(&mut self, id: u32) -> Option<&mut Layer> {
        fn find(layers: &mut [Layer], id: u32) -> Option<&mut Layer> {
            for layer in layers {
                if layer.id == id {
                    return Some(layer);
                }
                if let LayerData::Group(group) = &mut layer.data {
                    if let Some(found) = find(&mut group.layers, id) {
                        return Some(found);
                    }
                }
            }
            None
        }
        find(&mut self.layers, id)
    }

    /// First layer in draw order with the given name and kind
    pub fn find_layer(&self, name: &str, kind: LayerKind) -> Option<&Layer> {
        self.iter_layers()
            .find(|l| l.kind() == kind && l.name == name)
    }

    /// The id of the group layer containing `id`, or `None` when the layer
    /// sits at the top level (or is not part of this map)
    pub fn parent_layer_id(&self, id: u32) -> Option<u32> {
        let path = self.path_to(id)?;
        if path.len() < 2 {
            return None;
        }
        Some(path[path.len() - 2].id)
    }

    /// The chain of layers from a top-level layer down to `id`, inclusive
    fn path_to(&self, id: u32) -> Option<Vec<&Layer>> {
        fn descend<'a>(layers: &'a [Layer], id: u32, path: &mut Vec<&'a Layer>) -> bool {
            for layer in layers {
                path.push(layer);
                if layer.id == id {
                    return true;
                }
                if let LayerData::Group(group) = &layer.data {
                    if descend(&group.layers, id, path) {
                        return true;
                    }
                }
                path.pop();
            }
            false
        }
        let mut path = Vec::new();
        if descend(&self.layers, id, &mut path) {
            Some(path)
        } else {
            None
        }
    }

    /// The layer's opacity multiplied by the opacity of all ancestors
    pub fn effective_opacity(&self, id: u32) -> Option<f32> {
        let path = self.path_to(id)?;
        Some(path.iter().map(|l| l.opacity).product())
    }

    /// Whether the layer or any ancestor is invisible
    pub fn is_effectively_hidden(&self, id: u32) -> Option<bool> {
        let path = self.path_to(id)?;
        Some(path.iter().any(|l| !l.visible))
    }

    /// Whether neither the layer nor any ancestor is locked
    pub fn is_effectively_unlocked(&self, id: u32) -> Option<bool> {
        let path = self.path_to(id)?;
        Some(path.iter().all(|l| !l.locked))
    }

    /// The layer's pixel offset plus the offsets of all ancestors
    pub fn total_offset(&self, id: u32) -> Option<[f32; 2]> {
        let path = self.path_to(id)?;
        let mut offset = [0.0, 0.0];
        for layer in path {
            offset[0] += layer.offset[0];
            offset[1] += layer.offset[1];
        }
        Some(offset)
    }

    /// Iterate all layers of the map in draw order, visiting a group layer
    /// after all of its descendants
    pub fn iter_layers(&self) -> LayerIter<'_> {
        LayerIter::new(&self.layers)
    }

    /// Iterate all layers in the exact inverse of [`Map::iter_layers`]
    pub fn iter_layers_reverse(&self) -> impl Iterator<Item = &Layer> {
        let forward: Vec<&Layer> = self.iter_layers().collect();
        forward.into_iter().rev()
    }

    /// Total number of layers in the tree
    pub fn layer_count(&self) -> usize {
        self.iter_layers().count()
    }

    /// Append a tileset to the registry
    pub fn add_tileset(&mut self, tileset: Tileset) {
        self.tilesets.push(tileset);
    }

    pub fn tileset(&self, id: Uuid) -> Option<&Tileset> {
        self.tilesets.iter().find(|t| t.id == id)
    }

    pub fn remove_tileset(&mut self, id: Uuid) -> Option<Tileset> {
        let pos = self.tilesets.iter().position(|t| t.id == id)?;
        Some(self.tilesets.remove(pos))
    }

    /// The ids of all tilesets referenced by any cell or tile object
    pub fn used_tilesets(&self) -> HashSet<Uuid> {
        let mut used = HashSet::new();
        for layer in self.iter_layers() {
            match &layer.data {
                LayerData::Tiles(tiles) => used.extend(tiles.used_tilesets()),
                LayerData::Objects(objects) => {
                    for object in &objects.objects {
                        if let crate::ObjectShape::Tile(cell) = &object.shape {
                            used.extend(cell.tileset());
                        }
                    }
                }
                _ => {}
            }
        }
        used
    }

    pub fn is_tileset_used(&self, id: Uuid) -> bool {
        self.used_tilesets().contains(&id)
    }

    /// Add an object to the object layer `layer_id`, assigning its id.
    /// Returns the object's id, or `None` when the layer is not an object
    /// layer of this map.
    pub fn add_object(&mut self, layer_id: u32, mut object: MapObject) -> Option<u32> {
        self.layer(layer_id)?.as_object_group()?;
        let id = self.take_next_object_id();
        object.id = id;
        let group = self.layer_mut(layer_id)?.as_object_group_mut()?;
        group.objects.push(object);
        Some(id)
    }

    /// Extra pixels to include around the tile grid when drawing, from
    /// tiles larger than the grid cell and from layer pixel offsets
    pub fn draw_margins(&self) -> Margins {
        let mut margins = Margins::default();
        for tileset in &self.tilesets {
            let extra_w = tileset.tile_width.saturating_sub(self.tile_width) as i32;
            let extra_h = tileset.tile_height.saturating_sub(self.tile_height) as i32;
            margins.right = margins.right.max(extra_w);
            margins.top = margins.top.max(extra_h);
        }
        for layer in self.iter_layers() {
            let offset = self.total_offset(layer.id).unwrap_or([0.0, 0.0]);
            margins.left = margins.left.max((-offset[0]).ceil() as i32);
            margins.right = margins.right.max(offset[0].ceil() as i32);
            margins.top = margins.top.max((-offset[1]).ceil() as i32);
            margins.bottom = margins.bottom.max(offset[1].ceil() as i32);
        }
        margins
    }
}

/// Draw-order layer iterator.
///
/// Yields every layer of the tree; a group layer is yielded after all of its
/// descendants. The borrow on the map prevents tree mutation while the
/// iterator is alive.
pub struct LayerIter<'a> {
    /// Stack of (sibling list, next index) frames, innermost last
    stack: Vec<(&'a [Layer], usize)>,
}

impl<'a> LayerIter<'a> {
    fn new(layers: &'a [Layer]) -> Self {
        Self {
            stack: vec![(layers, 0)],
        }
    }
}

impl<'a> Iterator for LayerIter<'a> {
    type Item = &'a Layer;

    fn next(&mut self) -> Option<&'a Layer> {
        loop {
            let (layers, index) = self.stack.last_mut()?;
            let layers: &'a [Layer] = *layers;
            if *index < layers.len() {
                let layer = &layers[*index];
                if let LayerData::Group(group) = &layer.data {
                    if !group.layers.is_empty() {
                        // Descend; the group itself is yielded when this
                        // frame is exhausted.
                        self.stack.push((&group.layers, 0));
                        continue;
                    }
                }
                *index += 1;
                return Some(layer);
            }
            self.stack.pop();
            match self.stack.last_mut() {
                Some((parent_layers, parent_index)) => {
                    let parent_layers: &'a [Layer] = *parent_layers;
                    let group = &parent_layers[*parent_index];
                    *parent_index += 1;
                    return Some(group);
                }
                None => return None,
            }
        }
    }
}

/// Position of the layer with id `layer_id` in the map's draw order
pub fn global_index(map: &Map, layer_id: u32) -> Option<usize> {
    map.iter_layers().position(|l| l.id == layer_id)
}

/// The layer at position `index` in the map's draw order
pub fn layer_at_global_index(map: &Map, index: usize) -> Option<&Layer> {
    map.iter_layers().nth(index)
}
