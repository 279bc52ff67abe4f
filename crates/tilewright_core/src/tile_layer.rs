//! Dense cell grid backing a tile layer

use crate::{Cell, Rect, Region};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// The cell grid of a tile layer.
///
/// A bounded rectangular grid stored row-major. Reading outside the bounds
/// yields the empty cell; writing outside the bounds is a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileLayerData {
    width: u32,
    height: u32,
    cells: Vec<Cell>,
}

impl TileLayerData {
    /// Create a grid of the given size with every cell empty
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cells: vec![Cell::EMPTY; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The grid bounds as a rectangle at the origin
    pub fn rect(&self) -> Rect {
        Rect::new(0, 0, self.width as i32, self.height as i32)
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32
    }

    fn index_of(&self, x: i32, y: i32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// The cell at (x, y); the empty cell when outside the bounds
    pub fn cell_at(&self, x: i32, y: i32) -> Cell {
        if self.contains(x, y) {
            self.cells[self.index_of(x, y)]
        } else {
            Cell::EMPTY
        }
    }

    /// Set the cell at (x, y). Returns false (leaving the grid unchanged)
    /// when the position is outside the bounds.
    pub fn set_cell(&mut self, x: i32, y: i32, cell: Cell) -> bool {
        if !self.contains(x, y) {
            return false;
        }
        let index = self.index_of(x, y);
        self.cells[index] = cell;
        true
    }

    /// Check whether every cell is empty
    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Cell::is_empty)
    }

    /// Set every cell inside `region` to the empty cell
    pub fn erase(&mut self, region: &Region) {
        for rect in region.rects() {
            let clipped = rect.intersected(&self.rect());
            for y in clipped.y..clipped.bottom() {
                for x in clipped.x..clipped.right() {
                    let index = self.index_of(x, y);
                    self.cells[index] = Cell::EMPTY;
                }
            }
        }
    }

    /// The region covered by non-empty cells
    pub fn used_region(&self) -> Region {
        let mut region = Region::new();
        for y in 0..self.height as i32 {
            let mut run_start: Option<i32> = None;
            for x in 0..=self.width as i32 {
                let filled = x < self.width as i32 && !self.cell_at(x, y).is_empty();
                match (filled, run_start) {
                    (true, None) => run_start = Some(x),
                    (false, Some(start)) => {
                        region.add_rect(&Rect::new(start, y, x - start, 1));
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }
        region
    }

    /// The ids of all tilesets referenced by non-empty cells
    pub fn used_tilesets(&self) -> HashSet<Uuid> {
        self.cells.iter().filter_map(Cell::tileset).collect()
    }
}
