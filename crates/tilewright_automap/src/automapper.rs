//! The automapping engine: matches one rule map against a working map.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rand::Rng;
use tilewright_core::{Cell, Layer, LayerData, LayerKind, Map, ObjectShape, Rect, Region};
use uuid::Uuid;

use crate::rule_map::{
    build_rules, partition_rule_layers, read_rule_map_options, OutputIndexGroup, Rule,
    RuleInputs, RuleMapOptions,
};
use crate::SetupError;

// ─── Resolved outputs ────────────────────────────────────────────────────────

/// A stamp layer resolved against the current working map.
#[derive(Debug, Clone)]
struct ResolvedOutput {
    /// Layer id within the rules map
    rules_layer_id: u32,
    /// Layer id within the working map
    work_layer_id: u32,
    target: String,
    kind: LayerKind,
}

/// One output index group with every stamp layer resolved.
#[derive(Debug, Clone, Default)]
struct ResolvedOutputGroup {
    entries: Vec<ResolvedOutput>,
}

// ─── AutoMapper ──────────────────────────────────────────────────────────────

/// Matches the rules of one rule map against a working map and stamps the
/// outputs of every match.
///
/// Construction interprets the rule map once; a construction failure leaves
/// the instance inert with the failure readable from
/// [`AutoMapper::error_string`]. Per pass,
/// call [`prepare_auto_map`](AutoMapper::prepare_auto_map),
/// [`auto_map`](AutoMapper::auto_map), then
/// [`clean_all`](AutoMapper::clean_all) - also after failures, so added
/// tilesets and layers that ended up unused are taken out again.
pub struct AutoMapper {
    rules_map: Map,
    rule_path: PathBuf,
    options: RuleMapOptions,
    inputs: RuleInputs,
    outputs: Vec<OutputIndexGroup>,
    rules: Vec<Rule>,
    /// Destination layers resolved by `prepare_auto_map`; cleared by
    /// `clean_all`
    resolved_outputs: Vec<ResolvedOutputGroup>,
    /// Tilesets added to the working map for this rule map's stamps
    added_tilesets: Vec<Uuid>,
    /// Layers added to the working map for this rule map's stamps
    added_layers: Vec<u32>,
    touched_tile_layers: BTreeSet<String>,
    touched_object_groups: BTreeSet<String>,
    load_failed: bool,
    error: String,
    warning: String,
}

impl AutoMapper {
    /// Interpret `rules_map` and build an automapper from it, taking
    /// ownership of the map. `rule_path` is only used in diagnostics.
    pub fn new(rules_map: Map, rule_path: impl Into<PathBuf>) -> Self {
        let rule_path = rule_path.into();
        let mut mapper = AutoMapper {
            rules_map,
            rule_path,
            options: RuleMapOptions::default(),
            inputs: RuleInputs::default(),
            outputs: Vec::new(),
            rules: Vec::new(),
            resolved_outputs: Vec::new(),
            added_tilesets: Vec::new(),
            added_layers: Vec::new(),
            touched_tile_layers: BTreeSet::new(),
            touched_object_groups: BTreeSet::new(),
            load_failed: false,
            error: String::new(),
            warning: String::new(),
        };
        if let Err(error) = mapper.setup_rules() {
            mapper.load_failed = true;
            let _ = writeln!(
                mapper.error,
                "error in rule map '{}': {}",
                mapper.rule_path.display(),
                error
            );
        }
        mapper
    }

    fn setup_rules(&mut self) -> Result<(), SetupError> {
        self.options = read_rule_map_options(&self.rules_map)?;

        let layout = partition_rule_layers(&self.rules_map)?;
        for warning in &layout.warnings {
            let _ = writeln!(
                self.warning,
                "rule map '{}': {}",
                self.rule_path.display(),
                warning
            );
        }

        let input_regions = layout
            .input_regions_layer
            .and_then(|id| self.rules_map.layer(id))
            .and_then(Layer::as_tile_layer)
            .ok_or(SetupError::MissingInputRegionsLayer)?;
        let output_regions = layout
            .output_regions_layer
            .and_then(|id| self.rules_map.layer(id))
            .and_then(Layer::as_tile_layer)
            .ok_or(SetupError::MissingOutputRegionsLayer)?;
        self.rules = build_rules(input_regions, output_regions)?;

        self.inputs = layout.inputs;
        self.outputs = layout.outputs;
        for group in &self.outputs {
            for output in &group.layers {
                match output.kind {
                    LayerKind::Tiles => {
                        self.touched_tile_layers.insert(output.target.clone());
                    }
                    LayerKind::Objects => {
                        self.touched_object_groups.insert(output.target.clone());
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Whether the rule map loaded cleanly; when false the automapper never
    /// mutates a working map.
    pub fn is_valid(&self) -> bool {
        !self.load_failed
    }

    /// The rule map path this automapper was built from
    pub fn rule_path(&self) -> &Path {
        &self.rule_path
    }

    /// Whether any pattern layer of this rule set reads from a working-map
    /// layer with the given name
    pub fn rule_layer_name_used(&self, name: &str) -> bool {
        self.inputs.names.contains(name)
    }

    /// Names of the working-map tile layers this rule set can write to
    pub fn touched_tile_layers(&self) -> impl Iterator<Item = &str> {
        self.touched_tile_layers.iter().map(String::as_str)
    }

    /// Names of the working-map object layers this rule set can write to
    pub fn touched_object_groups(&self) -> impl Iterator<Item = &str> {
        self.touched_object_groups.iter().map(String::as_str)
    }

    /// Accumulated errors; cleared by `prepare_auto_map` except for load
    /// failures, which persist
    pub fn error_string(&self) -> &str {
        &self.error
    }

    /// Accumulated warnings; cleared by `prepare_auto_map`
    pub fn warning_string(&self) -> &str {
        &self.warning
    }

    // ─── Per-pass setup ──────────────────────────────────────────────────────

    /// Resolve this rule set against the current state of the working map:
    /// missing tilesets and destination layers are added, destination names
    /// are bound to current layer ids. Must be called before every
    /// [`auto_map`](AutoMapper::auto_map), since layers shift between
    /// passes. Returns false when the automapper cannot run.
    pub fn prepare_auto_map(&mut self, map: &mut Map) -> bool {
        if self.load_failed {
            return false;
        }
        self.error.clear();
        self.warning.clear();
        self.setup_tilesets(map);
        self.setup_missing_layers(map);
        match self.setup_correct_indexes(map) {
            Ok(()) => true,
            Err(error) => {
                let _ = writeln!(
                    self.error,
                    "rule map '{}': {}",
                    self.rule_path.display(),
                    error
                );
                false
            }
        }
    }

    /// Add tilesets referenced by stamp layers to the working map when
    /// missing, remembering them for cleanup.
    fn setup_tilesets(&mut self, map: &mut Map) {
        // Ordered set: tilesets are appended to the working map in a
        // reproducible order.
        let mut referenced: BTreeSet<Uuid> = BTreeSet::new();
        for group in &self.outputs {
            for output in &group.layers {
                let Some(layer) = self.rules_map.layer(output.layer_id) else {
                    continue;
                };
                match &layer.data {
                    LayerData::Tiles(tiles) => referenced.extend(tiles.used_tilesets()),
                    LayerData::Objects(objects) => {
                        for object in &objects.objects {
                            if let ObjectShape::Tile(cell) = &object.shape {
                                referenced.extend(cell.tileset());
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        for tileset_id in referenced {
            if map.tileset(tileset_id).is_some() {
                continue;
            }
            match self.rules_map.tileset(tileset_id) {
                Some(tileset) => {
                    map.add_tileset(tileset.clone());
                    self.added_tilesets.push(tileset_id);
                }
                None => {
                    let _ = writeln!(
                        self.warning,
                        "rule map '{}' references a tileset missing from its own tileset list",
                        self.rule_path.display()
                    );
                }
            }
        }
    }

    /// Create destination layers the working map lacks, on top of the layer
    /// stack, remembering them for cleanup.
    fn setup_missing_layers(&mut self, map: &mut Map) {
        for group in &self.outputs {
            for output in &group.layers {
                if map.find_layer(&output.target, output.kind).is_some() {
                    continue;
                }
                let layer = match output.kind {
                    LayerKind::Tiles => {
                        Layer::new_tile_layer(output.target.clone(), map.width, map.height)
                    }
                    LayerKind::Objects => Layer::new_object_layer(output.target.clone()),
                    _ => continue,
                };
                let id = map.add_layer(layer);
                self.added_layers.push(id);
            }
        }
    }

    /// Bind every destination layer name to its current layer id.
    fn setup_correct_indexes(&mut self, map: &Map) -> Result<(), SetupError> {
        let mut resolved = Vec::with_capacity(self.outputs.len());
        for group in &self.outputs {
            let mut entries = Vec::with_capacity(group.layers.len());
            for output in &group.layers {
                let layer = map.find_layer(&output.target, output.kind).ok_or_else(|| {
                    SetupError::OutputLayerVanished {
                        name: output.target.clone(),
                    }
                })?;
                entries.push(ResolvedOutput {
                    rules_layer_id: output.layer_id,
                    work_layer_id: layer.id,
                    target: output.target.clone(),
                    kind: output.kind,
                });
            }
            resolved.push(ResolvedOutputGroup { entries });
        }
        self.resolved_outputs = resolved;
        Ok(())
    }

    // ─── The pass ────────────────────────────────────────────────────────────

    /// Run one automapping pass over `where_region`, then replace it with
    /// the union of the regions actually written so callers know what to
    /// re-render and where further rules may now apply.
    ///
    /// The scanned area is `where_region` grown by the automapping radius
    /// and clipped to the map bounds. Anchors are visited in row-major
    /// order; rules are tried in declaration order at each anchor.
    pub fn auto_map(&mut self, map: &mut Map, where_region: &mut Region, rng: &mut impl Rng) {
        if self.load_failed || self.resolved_outputs.is_empty() {
            *where_region = Region::new();
            return;
        }

        let scan = where_region
            .grown(self.options.automapping_radius)
            .intersected_rect(&map.bounds());

        if self.options.delete_tiles {
            let destinations: BTreeSet<u32> = self
                .resolved_outputs
                .iter()
                .flat_map(|group| &group.entries)
                .filter(|entry| entry.kind == LayerKind::Tiles)
                .map(|entry| entry.work_layer_id)
                .collect();
            for layer_id in destinations {
                if let Some(tiles) = map.layer_mut(layer_id).and_then(Layer::as_tile_layer_mut) {
                    tiles.erase(&scan);
                }
            }
        }

        // Working-map pattern layers, resolved once per pass. A missing
        // layer reads as all-empty.
        let resolved_inputs: BTreeMap<&str, Option<u32>> = self
            .inputs
            .names
            .iter()
            .map(|name| {
                (
                    name.as_str(),
                    map.find_layer(name, LayerKind::Tiles).map(|l| l.id),
                )
            })
            .collect();

        let mut written_total = Region::new();
        let mut match_counts = vec![0usize; self.rules.len()];
        let scan_bounds = scan.bounding_rect();

        // The anchor bounding rectangles, per rule: the pattern bounds (the
        // anchor maps to their top-left corner) and the overlap-guard
        // bounds covering pattern and stamp alike.
        let rule_bounds: Vec<(Rect, Rect)> = self
            .rules
            .iter()
            .map(|rule| {
                let input_bounds = rule.input_region.bounding_rect();
                let stamp_bounds = input_bounds.united(&rule.output_region.bounding_rect());
                (input_bounds, stamp_bounds)
            })
            .collect();

        for y in scan_bounds.y..scan_bounds.bottom() {
            for x in scan_bounds.x..scan_bounds.right() {
                if !scan.contains(x, y) {
                    continue;
                }
                for (rule_index, rule) in self.rules.iter().enumerate() {
                    let (input_bounds, stamp_bounds) = rule_bounds[rule_index];
                    let dx = x - input_bounds.x;
                    let dy = y - input_bounds.y;

                    if self.options.no_overlapping_rules
                        && written_total.intersects_rect(&stamp_bounds.translated(dx, dy))
                    {
                        continue;
                    }
                    if !self.rule_matches(map, rule, &resolved_inputs, dx, dy) {
                        continue;
                    }
                    match self.apply_outputs(map, rule, dx, dy, rng) {
                        Ok(written) => {
                            written_total.add(&written);
                            match_counts[rule_index] += 1;
                        }
                        Err(error) => {
                            let _ = writeln!(
                                self.error,
                                "rule map '{}': {}",
                                self.rule_path.display(),
                                error
                            );
                            *where_region = written_total;
                            return;
                        }
                    }
                }
            }
        }

        for (rule_index, count) in match_counts.iter().enumerate() {
            if *count == 0 {
                let _ = writeln!(
                    self.warning,
                    "rule map '{}': rule #{} matched nowhere",
                    self.rule_path.display(),
                    rule_index
                );
            }
        }

        *where_region = written_total;
    }

    /// Test one rule at the anchor offset (dx, dy): every pattern cell of
    /// every index group must agree with the working map.
    fn rule_matches(
        &self,
        map: &Map,
        rule: &Rule,
        resolved_inputs: &BTreeMap<&str, Option<u32>>,
        dx: i32,
        dy: i32,
    ) -> bool {
        for by_target in self.inputs.indexes.values() {
            for (target, conditions) in by_target {
                let work_grid = resolved_inputs
                    .get(target.as_str())
                    .copied()
                    .flatten()
                    .and_then(|id| map.layer(id))
                    .and_then(Layer::as_tile_layer);

                for (px, py) in rule.input_region.points() {
                    let work_cell = work_grid
                        .map(|grid| grid.cell_at(px + dx, py + dy))
                        .unwrap_or(Cell::EMPTY);

                    for input in &conditions.list_yes {
                        let rule_cell = self.rules_cell(input.layer_id, px, py);
                        if rule_cell.is_empty() {
                            // Empty pattern cell: don't-care, unless strict.
                            if input.strict_empty && !work_cell.is_empty() {
                                return false;
                            }
                        } else if work_cell != rule_cell {
                            return false;
                        }
                    }
                    for input in &conditions.list_no {
                        let rule_cell = self.rules_cell(input.layer_id, px, py);
                        if rule_cell.is_empty() {
                            if input.strict_empty && work_cell.is_empty() {
                                return false;
                            }
                        } else if work_cell == rule_cell {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    fn rules_cell(&self, layer_id: u32, x: i32, y: i32) -> Cell {
        self.rules_map
            .layer(layer_id)
            .and_then(Layer::as_tile_layer)
            .map(|grid| grid.cell_at(x, y))
            .unwrap_or(Cell::EMPTY)
    }

    /// Stamp one matched rule into the working map at offset (dx, dy) and
    /// return the region written. With several output indexes, one is
    /// picked uniformly with `rng`.
    fn apply_outputs(
        &self,
        map: &mut Map,
        rule: &Rule,
        dx: i32,
        dy: i32,
        rng: &mut impl Rng,
    ) -> Result<Region, SetupError> {
        let group = if self.resolved_outputs.len() == 1 {
            &self.resolved_outputs[0]
        } else {
            &self.resolved_outputs[rng.gen_range(0..self.resolved_outputs.len())]
        };

        for entry in &group.entries {
            match entry.kind {
                LayerKind::Tiles => self.copy_tile_region(map, rule, entry, dx, dy)?,
                LayerKind::Objects => self.copy_object_region(map, rule, entry, dx, dy)?,
                _ => {}
            }
        }

        Ok(rule
            .output_region
            .translated(dx, dy)
            .intersected_rect(&map.bounds()))
    }

    /// Copy the stamp cells of one tile layer. Empty stamp cells are not
    /// copied, leaving the destination untouched, so stamps can be sparse;
    /// non-empty cells overwrite unconditionally.
    fn copy_tile_region(
        &self,
        map: &mut Map,
        rule: &Rule,
        entry: &ResolvedOutput,
        dx: i32,
        dy: i32,
    ) -> Result<(), SetupError> {
        let Some(source) = self
            .rules_map
            .layer(entry.rules_layer_id)
            .and_then(Layer::as_tile_layer)
        else {
            return Ok(());
        };
        let cells: Vec<(i32, i32, Cell)> = rule
            .output_region
            .points()
            .map(|(px, py)| (px, py, source.cell_at(px, py)))
            .filter(|(_, _, cell)| !cell.is_empty())
            .collect();

        let destination = map
            .layer_mut(entry.work_layer_id)
            .and_then(Layer::as_tile_layer_mut)
            .ok_or_else(|| SetupError::OutputLayerVanished {
                name: entry.target.clone(),
            })?;
        for (px, py, cell) in cells {
            destination.set_cell(px + dx, py + dy, cell);
        }
        Ok(())
    }

    /// Clone the objects of one stamp layer whose bounds touch the output
    /// region, offset by the match offset in pixels, with fresh object ids.
    fn copy_object_region(
        &self,
        map: &mut Map,
        rule: &Rule,
        entry: &ResolvedOutput,
        dx: i32,
        dy: i32,
    ) -> Result<(), SetupError> {
        let Some(source) = self
            .rules_map
            .layer(entry.rules_layer_id)
            .and_then(Layer::as_object_group)
        else {
            return Ok(());
        };
        let tile_width = map.tile_width as f64;
        let tile_height = map.tile_height as f64;

        let mut clones = Vec::new();
        for object in &source.objects {
            let touches = rule.output_region.rects().iter().any(|rect| {
                object.intersects_pixel_rect(
                    rect.x as f64 * tile_width,
                    rect.y as f64 * tile_height,
                    rect.right() as f64 * tile_width,
                    rect.bottom() as f64 * tile_height,
                )
            });
            if touches {
                let mut clone = object.clone();
                clone.id = 0;
                clone.position[0] += dx as f64 * tile_width;
                clone.position[1] += dy as f64 * tile_height;
                clones.push(clone);
            }
        }
        for clone in clones {
            map.add_object(entry.work_layer_id, clone).ok_or_else(|| {
                SetupError::OutputLayerVanished {
                    name: entry.target.clone(),
                }
            })?;
        }
        Ok(())
    }

    // ─── Cleanup ─────────────────────────────────────────────────────────────

    /// Undo the additions of `prepare_auto_map` that ended up unused and
    /// reset per-pass state, readying the automapper for its next pass.
    /// Runs on error paths as well.
    pub fn clean_all(&mut self, map: &mut Map) {
        for layer_id in std::mem::take(&mut self.added_layers) {
            let still_empty = map.layer(layer_id).is_some_and(Layer::is_empty);
            if still_empty {
                map.remove_layer(layer_id);
            }
        }
        for tileset_id in std::mem::take(&mut self.added_tilesets) {
            if !map.is_tileset_used(tileset_id) {
                map.remove_tileset(tileset_id);
                let name = self
                    .rules_map
                    .tileset(tileset_id)
                    .map(|t| t.name.clone())
                    .unwrap_or_default();
                let _ = writeln!(
                    self.warning,
                    "rule map '{}': tileset '{}' was only needed while automapping and was \
                     removed again",
                    self.rule_path.display(),
                    name
                );
            }
        }
        self.resolved_outputs.clear();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use tilewright_core::{MapObject, Tileset};

    fn seeded_rng() -> SmallRng {
        SmallRng::seed_from_u64(0)
    }

    fn tileset() -> Tileset {
        Tileset::new("rules", 16, 16, 4, 16)
    }

    fn add_grid_layer(map: &mut Map, name: &str, cells: &[(i32, i32, Cell)]) -> u32 {
        let id = map.add_layer(Layer::new_tile_layer(name, map.width, map.height));
        let grid = map.layer_mut(id).unwrap().as_tile_layer_mut().unwrap();
        for (x, y, cell) in cells {
            grid.set_cell(*x, *y, *cell);
        }
        id
    }

    /// A rule map with one rule: tile A in layer `ground` becomes tile B.
    fn single_rule_map(ts: &Tileset, tile_a: Cell, tile_b: Cell) -> Map {
        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        let marker = Cell::new(ts.id, 15);
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker)]);
        add_grid_layer(&mut rules, "input_ground", &[(0, 0, tile_a)]);
        add_grid_layer(&mut rules, "output_ground", &[(0, 0, tile_b)]);
        rules
    }

    fn working_map(ts: &Tileset, width: u32, height: u32) -> Map {
        let mut map = Map::new(width, height, 16, 16);
        map.add_tileset(ts.clone());
        map
    }

    /// prepare + auto_map + clean_all over `region`, returning the written
    /// region.
    fn run(mapper: &mut AutoMapper, map: &mut Map, region: Region) -> Region {
        let mut where_region = region;
        assert!(mapper.prepare_auto_map(map), "{}", mapper.error_string());
        mapper.auto_map(map, &mut where_region, &mut seeded_rng());
        mapper.clean_all(map);
        where_region
    }

    fn cell_of(map: &Map, layer: &str, x: i32, y: i32) -> Cell {
        map.find_layer(layer, LayerKind::Tiles)
            .unwrap()
            .as_tile_layer()
            .unwrap()
            .cell_at(x, y)
    }

    #[test]
    fn matching_pattern_stamps_output_at_match_offset() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);
        let mut map = working_map(&ts, 3, 3);
        add_grid_layer(&mut map, "ground", &[(1, 1, tile_a)]);

        let mut mapper = AutoMapper::new(single_rule_map(&ts, tile_a, tile_b), "rules.tmx");
        assert!(mapper.is_valid(), "{}", mapper.error_string());

        let bounds = map.bounds();
        let written = run(&mut mapper, &mut map, Region::from_rect(bounds));

        assert_eq!(cell_of(&map, "ground", 1, 1), tile_b);
        for y in 0..3 {
            for x in 0..3 {
                if (x, y) != (1, 1) {
                    assert!(cell_of(&map, "ground", x, y).is_empty());
                }
            }
        }
        assert_eq!(written, Region::from_point(1, 1));
    }

    #[test]
    fn radius_zero_finds_anchor_inside_edited_region_only() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);

        // Edited region contains the anchor: match.
        let mut map = working_map(&ts, 3, 3);
        add_grid_layer(&mut map, "ground", &[(1, 1, tile_a)]);
        let mut mapper = AutoMapper::new(single_rule_map(&ts, tile_a, tile_b), "rules.tmx");
        let written = run(&mut mapper, &mut map, Region::from_point(1, 1));
        assert_eq!(cell_of(&map, "ground", 1, 1), tile_b);
        assert_eq!(written, Region::from_point(1, 1));

        // Edited region away from the anchor: no match, nothing written.
        let mut map = working_map(&ts, 3, 3);
        add_grid_layer(&mut map, "ground", &[(1, 1, tile_a)]);
        let mut mapper = AutoMapper::new(single_rule_map(&ts, tile_a, tile_b), "rules.tmx");
        let written = run(&mut mapper, &mut map, Region::from_point(0, 0));
        assert_eq!(cell_of(&map, "ground", 1, 1), tile_a);
        assert!(written.is_empty());
    }

    #[test]
    fn radius_one_reaches_anchor_next_to_edited_region() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);
        let mut rules = single_rule_map(&ts, tile_a, tile_b);
        rules.properties.set("AutomappingRadius", 1i64);

        let mut map = working_map(&ts, 3, 3);
        add_grid_layer(&mut map, "ground", &[(1, 1, tile_a)]);
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        let written = run(&mut mapper, &mut map, Region::from_point(0, 0));
        assert_eq!(cell_of(&map, "ground", 1, 1), tile_b);
        assert_eq!(written, Region::from_point(1, 1));
    }

    #[test]
    fn empty_stamp_cells_leave_destination_untouched() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);
        let tile_c = Cell::new(ts.id, 3);
        let marker = Cell::new(ts.id, 15);

        // Rule covering two cells; only the first stamp cell carries a tile.
        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker), (1, 0, marker)]);
        add_grid_layer(&mut rules, "input_ground", &[(0, 0, tile_a)]);
        add_grid_layer(&mut rules, "output_ground", &[(0, 0, tile_b)]);

        let mut map = working_map(&ts, 4, 1);
        add_grid_layer(&mut map, "ground", &[(0, 0, tile_a), (1, 0, tile_c)]);

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        run(&mut mapper, &mut map, Region::from_rect(bounds));

        assert_eq!(cell_of(&map, "ground", 0, 0), tile_b);
        // The empty stamp cell at (1,0) must not erase the existing tile.
        assert_eq!(cell_of(&map, "ground", 1, 0), tile_c);
    }

    #[test]
    fn identical_inputs_produce_identical_maps() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);

        let build = || {
            let mut map = working_map(&ts, 3, 3);
            add_grid_layer(&mut map, "ground", &[(0, 0, tile_a), (1, 1, tile_a)]);
            map
        };
        let mut first = build();
        let mut second = build();
        assert_eq!(first, second);

        let bounds = first.bounds();
        let mut mapper = AutoMapper::new(single_rule_map(&ts, tile_a, tile_b), "rules.tmx");
        run(&mut mapper, &mut first, Region::from_rect(bounds));
        let mut mapper = AutoMapper::new(single_rule_map(&ts, tile_a, tile_b), "rules.tmx");
        run(&mut mapper, &mut second, Region::from_rect(bounds));

        assert_eq!(first, second);
    }

    #[test]
    fn no_overlapping_rules_keeps_stamps_disjoint() {
        let ts = tileset();
        let tile_b = Cell::new(ts.id, 2);
        let marker = Cell::new(ts.id, 15);

        // Don't-care 2-cell pattern; the stamp only fills its second cell.
        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        rules.properties.set("NoOverlappingRules", true);
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker), (1, 0, marker)]);
        add_grid_layer(&mut rules, "input_ground", &[]);
        add_grid_layer(&mut rules, "output_ground", &[(1, 0, tile_b)]);

        let mut map = working_map(&ts, 4, 1);
        add_grid_layer(&mut map, "ground", &[]);

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        run(&mut mapper, &mut map, Region::from_rect(bounds));

        // Anchors 0 and 2 fire; anchors 1 and 3 overlap prior stamps.
        assert!(cell_of(&map, "ground", 0, 0).is_empty());
        assert_eq!(cell_of(&map, "ground", 1, 0), tile_b);
        assert!(cell_of(&map, "ground", 2, 0).is_empty());
        assert_eq!(cell_of(&map, "ground", 3, 0), tile_b);
    }

    #[test]
    fn overlapping_rules_allowed_by_default() {
        let ts = tileset();
        let tile_b = Cell::new(ts.id, 2);
        let marker = Cell::new(ts.id, 15);

        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker), (1, 0, marker)]);
        add_grid_layer(&mut rules, "input_ground", &[]);
        add_grid_layer(&mut rules, "output_ground", &[(1, 0, tile_b)]);

        let mut map = working_map(&ts, 4, 1);
        add_grid_layer(&mut map, "ground", &[]);

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        run(&mut mapper, &mut map, Region::from_rect(bounds));

        // Every anchor fires; stamps at x = 1..4.
        assert!(cell_of(&map, "ground", 0, 0).is_empty());
        assert_eq!(cell_of(&map, "ground", 1, 0), tile_b);
        assert_eq!(cell_of(&map, "ground", 2, 0), tile_b);
        assert_eq!(cell_of(&map, "ground", 3, 0), tile_b);
    }

    #[test]
    fn delete_tiles_clears_destinations_before_matching() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);
        let tile_c = Cell::new(ts.id, 3);
        let marker = Cell::new(ts.id, 15);

        // Pattern reads `marks`, stamp writes `ground`.
        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        rules.properties.set("DeleteTiles", true);
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker)]);
        add_grid_layer(&mut rules, "input_marks", &[(0, 0, tile_a)]);
        add_grid_layer(&mut rules, "output_ground", &[(0, 0, tile_b)]);

        let mut map = working_map(&ts, 3, 3);
        add_grid_layer(&mut map, "marks", &[(1, 1, tile_a)]);
        add_grid_layer(
            &mut map,
            "ground",
            &[(0, 0, tile_c), (1, 1, tile_c), (2, 2, tile_c)],
        );

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        run(&mut mapper, &mut map, Region::from_rect(bounds));

        // The whole scanned region of `ground` was erased first; only the
        // match at (1,1) stamped a tile back.
        assert!(cell_of(&map, "ground", 0, 0).is_empty());
        assert!(cell_of(&map, "ground", 2, 2).is_empty());
        assert_eq!(cell_of(&map, "ground", 1, 1), tile_b);
        // The pattern layer is not a destination and keeps its tiles.
        assert_eq!(cell_of(&map, "marks", 1, 1), tile_a);
    }

    #[test]
    fn strict_empty_requires_exactly_empty_cells() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);
        let tile_c = Cell::new(ts.id, 3);
        let marker = Cell::new(ts.id, 15);

        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker), (1, 0, marker)]);
        let input_id = add_grid_layer(&mut rules, "input_ground", &[(0, 0, tile_a)]);
        rules
            .layer_mut(input_id)
            .unwrap()
            .properties
            .set("StrictEmpty", true);
        add_grid_layer(&mut rules, "output_ground", &[(0, 0, tile_b)]);

        let mut map = working_map(&ts, 4, 1);
        // Anchor 0: A followed by C - the strict-empty cell fails.
        // Anchor 2: A followed by emptiness - matches.
        add_grid_layer(
            &mut map,
            "ground",
            &[(0, 0, tile_a), (1, 0, tile_c), (2, 0, tile_a)],
        );

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        run(&mut mapper, &mut map, Region::from_rect(bounds));

        assert_eq!(cell_of(&map, "ground", 0, 0), tile_a);
        assert_eq!(cell_of(&map, "ground", 2, 0), tile_b);
    }

    #[test]
    fn inputnot_matches_where_pattern_fails() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);
        let tile_c = Cell::new(ts.id, 3);
        let marker = Cell::new(ts.id, 15);

        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker)]);
        add_grid_layer(&mut rules, "inputnot_ground", &[(0, 0, tile_a)]);
        add_grid_layer(&mut rules, "output_ground", &[(0, 0, tile_b)]);

        let mut map = working_map(&ts, 3, 1);
        add_grid_layer(&mut map, "ground", &[(0, 0, tile_a), (1, 0, tile_c)]);

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        run(&mut mapper, &mut map, Region::from_rect(bounds));

        // (0,0) holds tile A and must not fire; everything else does.
        assert_eq!(cell_of(&map, "ground", 0, 0), tile_a);
        assert_eq!(cell_of(&map, "ground", 1, 0), tile_b);
        assert_eq!(cell_of(&map, "ground", 2, 0), tile_b);
    }

    #[test]
    fn missing_output_regions_layer_fails_setup_without_touching_map() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);
        let marker = Cell::new(ts.id, 15);

        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        add_grid_layer(&mut rules, "regions_input", &[(0, 0, marker)]);
        add_grid_layer(&mut rules, "input_ground", &[(0, 0, tile_a)]);
        add_grid_layer(&mut rules, "output_ground", &[(0, 0, tile_b)]);

        let mut map = working_map(&ts, 3, 3);
        add_grid_layer(&mut map, "ground", &[(1, 1, tile_a)]);
        let untouched = map.clone();

        let mut mapper = AutoMapper::new(rules, "broken.tmx");
        assert!(!mapper.is_valid());
        assert!(!mapper.error_string().is_empty());

        assert!(!mapper.prepare_auto_map(&mut map));
        let mut where_region = Region::from_rect(untouched.bounds());
        mapper.auto_map(&mut map, &mut where_region, &mut seeded_rng());
        mapper.clean_all(&mut map);

        assert_eq!(map, untouched);
        assert!(where_region.is_empty());
    }

    #[test]
    fn objects_are_cloned_with_fresh_ids_and_offset() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let marker = Cell::new(ts.id, 15);

        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker)]);
        add_grid_layer(&mut rules, "input_ground", &[(0, 0, tile_a)]);
        let object_layer = rules.add_layer(Layer::new_object_layer("output_things"));
        let mut spawn = MapObject::new("spawn", [4.0, 4.0]);
        spawn.size = [8.0, 8.0];
        rules.add_object(object_layer, spawn);

        let mut map = working_map(&ts, 4, 4);
        add_grid_layer(&mut map, "ground", &[(2, 1, tile_a)]);

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        run(&mut mapper, &mut map, Region::from_rect(bounds));

        // The destination object layer was created on demand and kept,
        // since it ended up non-empty.
        let things = map
            .find_layer("things", LayerKind::Objects)
            .expect("object layer created for the stamp")
            .as_object_group()
            .unwrap();
        assert_eq!(things.objects.len(), 1);
        let clone = &things.objects[0];
        assert_eq!(clone.position, [4.0 + 2.0 * 16.0, 4.0 + 16.0]);
        assert_ne!(clone.id, 0);
    }

    #[test]
    fn unused_added_layers_and_tilesets_are_cleaned_up() {
        let ts = tileset();
        let stamp_tileset = Tileset::new("stamps", 16, 16, 4, 16);
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(stamp_tileset.id, 0);
        let marker = Cell::new(ts.id, 15);

        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        rules.add_tileset(stamp_tileset.clone());
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker)]);
        add_grid_layer(&mut rules, "input_ground", &[(0, 0, tile_a)]);
        add_grid_layer(&mut rules, "output_walls", &[(0, 0, tile_b)]);

        // No tile A anywhere: the rule cannot match.
        let mut map = working_map(&ts, 3, 3);
        add_grid_layer(&mut map, "ground", &[]);

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        let written = run(&mut mapper, &mut map, Region::from_rect(bounds));

        assert!(written.is_empty());
        // The `walls` layer and the stamp tileset were added for the pass
        // and removed again, since nothing used them.
        assert!(map.find_layer("walls", LayerKind::Tiles).is_none());
        assert!(map.tileset(stamp_tileset.id).is_none());
        assert!(mapper.warning_string().contains("matched nowhere"));
    }

    #[test]
    fn output_index_alternatives_pick_one_stamp() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b1 = Cell::new(ts.id, 2);
        let tile_b2 = Cell::new(ts.id, 3);
        let marker = Cell::new(ts.id, 15);

        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker)]);
        add_grid_layer(&mut rules, "input_ground", &[(0, 0, tile_a)]);
        add_grid_layer(&mut rules, "output1_ground", &[(0, 0, tile_b1)]);
        add_grid_layer(&mut rules, "output2_ground", &[(0, 0, tile_b2)]);

        let mut map = working_map(&ts, 3, 3);
        add_grid_layer(&mut map, "ground", &[(1, 1, tile_a)]);

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        run(&mut mapper, &mut map, Region::from_rect(bounds));

        let result = cell_of(&map, "ground", 1, 1);
        assert!(result == tile_b1 || result == tile_b2);
    }

    #[test]
    fn rule_layer_name_used_reflects_pattern_layers() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);
        let mapper = AutoMapper::new(single_rule_map(&ts, tile_a, tile_b), "rules.tmx");
        assert!(mapper.rule_layer_name_used("ground"));
        assert!(!mapper.rule_layer_name_used("walls"));
        assert_eq!(mapper.touched_tile_layers().collect::<Vec<_>>(), ["ground"]);
    }

    #[test]
    fn two_rules_apply_in_declaration_order() {
        let ts = tileset();
        let tile_a = Cell::new(ts.id, 1);
        let tile_b = Cell::new(ts.id, 2);
        let tile_c = Cell::new(ts.id, 3);
        let marker = Cell::new(ts.id, 15);

        // Rule 1 at x=0: A -> B. Rule 2 at x=2: B -> C. Rules run in
        // declaration order at each anchor, so rule 2 sees rule 1's stamp.
        let mut rules = Map::new(4, 4, 16, 16);
        rules.add_tileset(ts.clone());
        add_grid_layer(&mut rules, "regions", &[(0, 0, marker), (2, 0, marker)]);
        add_grid_layer(&mut rules, "input_ground", &[(0, 0, tile_a), (2, 0, tile_b)]);
        add_grid_layer(&mut rules, "output_ground", &[(0, 0, tile_b), (2, 0, tile_c)]);

        let mut map = working_map(&ts, 2, 1);
        add_grid_layer(&mut map, "ground", &[(0, 0, tile_a)]);

        let bounds = map.bounds();
        let mut mapper = AutoMapper::new(rules, "rules.tmx");
        run(&mut mapper, &mut map, Region::from_rect(bounds));

        // A became B (rule 1), then B became C (rule 2).
        assert_eq!(cell_of(&map, "ground", 0, 0), tile_c);
    }
}
