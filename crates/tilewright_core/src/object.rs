//! Positioned objects placed on object layers

use crate::{Cell, Properties};
use serde::{Deserialize, Serialize};

/// The geometry of a map object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectShape {
    Rectangle,
    Point,
    Ellipse,
    /// Closed polygon, points relative to the object position
    Polygon(Vec<[f64; 2]>),
    /// Open polyline, points relative to the object position
    Polyline(Vec<[f64; 2]>),
    /// A tile stamp placed as an object
    Tile(Cell),
}

/// An object placed on an object layer.
///
/// Position and size are in pixels. The id is unique within a map and
/// assigned when the object is added through the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapObject {
    pub id: u32,
    pub name: String,
    pub position: [f64; 2],
    pub size: [f64; 2],
    /// Rotation in degrees, clockwise
    pub rotation: f64,
    pub shape: ObjectShape,
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub properties: Properties,
}

impl MapObject {
    pub fn new(name: impl Into<String>, position: [f64; 2]) -> Self {
        Self {
            id: 0,
            name: name.into(),
            position,
            size: [0.0, 0.0],
            rotation: 0.0,
            shape: ObjectShape::Rectangle,
            visible: true,
            properties: Properties::new(),
        }
    }

    /// Axis-aligned bounds as (min, max) corners in pixels.
    ///
    /// Zero-sized shapes (points, unplaced tiles) cover just their position.
    pub fn bounds(&self) -> ([f64; 2], [f64; 2]) {
        let [x, y] = self.position;
        match &self.shape {
            ObjectShape::Polygon(points) | ObjectShape::Polyline(points) => {
                let mut min = [x, y];
                let mut max = [x, y];
                for p in points {
                    min[0] = min[0].min(x + p[0]);
                    min[1] = min[1].min(y + p[1]);
                    max[0] = max[0].max(x + p[0]);
                    max[1] = max[1].max(y + p[1]);
                }
                (min, max)
            }
            _ => ([x, y], [x + self.size[0], y + self.size[1]]),
        }
    }

    /// Check whether the object's bounds touch the given pixel rectangle
    pub fn intersects_pixel_rect(&self, min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> bool {
        let (min, max) = self.bounds();
        min[0] <= max_x && max[0] >= min_x && min[1] <= max_y && max[1] >= min_y
    }
}
