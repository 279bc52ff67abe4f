//! Interpreting a rules map: layer naming conventions, map properties, and
//! rule-region detection.
//!
//! A rules map is an ordinary map whose tile layers follow a naming
//! convention:
//!
//! - `regions`, `regions_input`, `regions_output` - marker layers whose
//!   coherent cell regions delimit the rules (a plain `regions` layer serves
//!   as both input and output marker);
//! - `input<index>_<name>` / `inputnot<index>_<name>` - pattern layers that
//!   must match (or must not match) the working-map layer called `<name>`;
//!   layers sharing an index are combined;
//! - `output<index>_<name>` - stamp layers copied into the working-map layer
//!   called `<name>` when a rule fires; distinct indexes are alternatives,
//!   one of which is picked per match.
//!
//! Map properties `DeleteTiles`, `AutomappingRadius` and
//! `NoOverlappingRules` (case-insensitive) configure a rule map; pattern
//! layers additionally understand `StrictEmpty`.

use std::collections::{BTreeMap, BTreeSet};

use tilewright_core::{LayerKind, Map, Rect, Region, TileLayerData};

use crate::SetupError;

// ─── Options ─────────────────────────────────────────────────────────────────

/// Behavior switches read from the rule map's own properties.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RuleMapOptions {
    /// Erase the scanned region of every destination tile layer before
    /// matching, making a pass destructive-then-additive.
    pub delete_tiles: bool,
    /// Tiles by which an edited region grows before rescanning.
    pub automapping_radius: i32,
    /// Skip anchors that would stamp over a region already written this
    /// pass.
    pub no_overlapping_rules: bool,
}

/// Read the automapping options, falling back to defaults for absent keys.
pub(crate) fn read_rule_map_options(map: &Map) -> Result<RuleMapOptions, SetupError> {
    Ok(RuleMapOptions {
        delete_tiles: map.properties.bool_value("DeleteTiles")?.unwrap_or(false),
        automapping_radius: map
            .properties
            .int_value("AutomappingRadius")?
            .unwrap_or(0) as i32,
        no_overlapping_rules: map
            .properties
            .bool_value("NoOverlappingRules")?
            .unwrap_or(false),
    })
}

// ─── Layer naming ────────────────────────────────────────────────────────────

/// The role a rules-map layer plays, decoded from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RuleLayerRole {
    Regions { input: bool, output: bool },
    Input {
        index: String,
        target: String,
        negate: bool,
    },
    Output { index: String, target: String },
}

/// Decode a layer name into its role, or `None` when the name follows no
/// convention. Prefixes are matched ignoring ASCII case; the index is the
/// (possibly empty) text between the prefix and the first underscore.
pub(crate) fn parse_rule_layer_name(name: &str) -> Option<RuleLayerRole> {
    let lower = name.to_ascii_lowercase();
    match lower.as_str() {
        "regions" => {
            return Some(RuleLayerRole::Regions {
                input: true,
                output: true,
            })
        }
        "regions_input" => {
            return Some(RuleLayerRole::Regions {
                input: true,
                output: false,
            })
        }
        "regions_output" => {
            return Some(RuleLayerRole::Regions {
                input: false,
                output: true,
            })
        }
        _ => {}
    }
    // "inputnot" must be tried before "input".
    if let Some(rest) = lower.strip_prefix("inputnot") {
        let (index, target) = split_index_target(name, name.len() - rest.len())?;
        return Some(RuleLayerRole::Input {
            index,
            target,
            negate: true,
        });
    }
    if let Some(rest) = lower.strip_prefix("input") {
        let (index, target) = split_index_target(name, name.len() - rest.len())?;
        return Some(RuleLayerRole::Input {
            index,
            target,
            negate: false,
        });
    }
    if let Some(rest) = lower.strip_prefix("output") {
        let (index, target) = split_index_target(name, name.len() - rest.len())?;
        return Some(RuleLayerRole::Output { index, target });
    }
    None
}

/// Split `name[prefix_len..]` at the first underscore into (index, target).
/// The target must be non-empty.
fn split_index_target(name: &str, prefix_len: usize) -> Option<(String, String)> {
    let rest = &name[prefix_len..];
    let underscore = rest.find('_')?;
    let target = &rest[underscore + 1..];
    if target.is_empty() {
        return None;
    }
    Some((rest[..underscore].to_string(), target.to_string()))
}

// ─── Partitioned layers ──────────────────────────────────────────────────────

/// A pattern layer of the rules map together with its strict-empty flag.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InputLayerRef {
    /// Layer id within the rules map
    pub layer_id: u32,
    /// When set, an empty pattern cell only matches an empty working cell
    /// (instead of matching anything).
    pub strict_empty: bool,
}

/// The positive and negative pattern layers for one target layer name.
#[derive(Debug, Clone, Default)]
pub(crate) struct InputConditions {
    /// "input" layers - all of these must match
    pub list_yes: Vec<InputLayerRef>,
    /// "inputnot" layers - all of these must fail to match
    pub list_no: Vec<InputLayerRef>,
}

/// All pattern layers, grouped by index, then by target layer name.
#[derive(Debug, Clone, Default)]
pub(crate) struct RuleInputs {
    pub indexes: BTreeMap<String, BTreeMap<String, InputConditions>>,
    /// Every target layer name referenced by any pattern layer
    pub names: BTreeSet<String>,
}

/// One stamp layer of the rules map and the working-map layer it writes to.
#[derive(Debug, Clone)]
pub(crate) struct OutputLayerRef {
    /// Layer id within the rules map
    pub layer_id: u32,
    /// Name of the destination layer in the working map
    pub target: String,
    pub kind: LayerKind,
}

/// The stamp layers sharing one output index. Distinct indexes are
/// alternatives; one is selected per match.
#[derive(Debug, Clone)]
pub(crate) struct OutputIndexGroup {
    pub index: String,
    pub layers: Vec<OutputLayerRef>,
}

/// One rule: the pattern region to look for and the stamp region to apply.
/// Both are in rules-map coordinates and paired by discovery order.
#[derive(Debug, Clone)]
pub(crate) struct Rule {
    pub input_region: Region,
    pub output_region: Region,
}

/// The result of partitioning a rule map's layers by role.
#[derive(Debug, Default)]
pub(crate) struct RuleMapLayout {
    pub input_regions_layer: Option<u32>,
    pub output_regions_layer: Option<u32>,
    pub inputs: RuleInputs,
    pub outputs: Vec<OutputIndexGroup>,
    /// Non-fatal irregularities found while partitioning
    pub warnings: Vec<String>,
}

/// Partition the rule map's layers into regions, pattern, and stamp layers.
pub(crate) fn partition_rule_layers(map: &Map) -> Result<RuleMapLayout, SetupError> {
    let mut layout = RuleMapLayout::default();

    for layer in map.iter_layers() {
        if layer.is_group_layer() {
            continue;
        }
        let Some(role) = parse_rule_layer_name(&layer.name) else {
            layout.warnings.push(format!(
                "layer '{}' matches no rule naming convention and was ignored",
                layer.name
            ));
            continue;
        };
        match role {
            RuleLayerRole::Regions { input, output } => {
                if !layer.is_tile_layer() {
                    return Err(SetupError::NotATileLayer {
                        name: layer.name.clone(),
                    });
                }
                if input {
                    if layout.input_regions_layer.is_some() {
                        return Err(SetupError::DuplicateRegionsLayer {
                            name: layer.name.clone(),
                        });
                    }
                    layout.input_regions_layer = Some(layer.id);
                }
                if output {
                    if layout.output_regions_layer.is_some() {
                        return Err(SetupError::DuplicateRegionsLayer {
                            name: layer.name.clone(),
                        });
                    }
                    layout.output_regions_layer = Some(layer.id);
                }
            }
            RuleLayerRole::Input {
                index,
                target,
                negate,
            } => {
                if !layer.is_tile_layer() {
                    return Err(SetupError::NotATileLayer {
                        name: layer.name.clone(),
                    });
                }
                let strict_empty = layer
                    .properties
                    .bool_value("StrictEmpty")?
                    .unwrap_or(false);
                let reference = InputLayerRef {
                    layer_id: layer.id,
                    strict_empty,
                };
                let conditions = layout
                    .inputs
                    .indexes
                    .entry(index)
                    .or_default()
                    .entry(target.clone())
                    .or_default();
                if negate {
                    conditions.list_no.push(reference);
                } else {
                    conditions.list_yes.push(reference);
                }
                layout.inputs.names.insert(target);
            }
            RuleLayerRole::Output { index, target } => {
                let kind = layer.kind();
                if kind != LayerKind::Tiles && kind != LayerKind::Objects {
                    layout.warnings.push(format!(
                        "output layer '{}' is neither a tile nor an object layer and was ignored",
                        layer.name
                    ));
                    continue;
                }
                let reference = OutputLayerRef {
                    layer_id: layer.id,
                    target,
                    kind,
                };
                match layout.outputs.iter_mut().find(|g| g.index == index) {
                    Some(group) => group.layers.push(reference),
                    None => layout.outputs.push(OutputIndexGroup {
                        index,
                        layers: vec![reference],
                    }),
                }
            }
        }
    }

    if layout.input_regions_layer.is_none() {
        return Err(SetupError::MissingInputRegionsLayer);
    }
    if layout.output_regions_layer.is_none() {
        return Err(SetupError::MissingOutputRegionsLayer);
    }
    if layout.inputs.indexes.is_empty() {
        return Err(SetupError::NoInputLayers);
    }
    if layout.outputs.is_empty() {
        return Err(SetupError::NoOutputLayers);
    }
    Ok(layout)
}

// ─── Rule-region detection ───────────────────────────────────────────────────

/// Find the maximal 4-connected regions of non-empty cells sharing the same
/// cell value, in row-major discovery order.
///
/// Uses an explicit worklist instead of recursion so large rule maps cannot
/// exhaust the stack.
pub(crate) fn coherent_regions(grid: &TileLayerData) -> Vec<Region> {
    let width = grid.width() as i32;
    let height = grid.height() as i32;
    let mut visited = vec![false; (width * height) as usize];
    let mut regions = Vec::new();

    for start_y in 0..height {
        for start_x in 0..width {
            let start_index = (start_y * width + start_x) as usize;
            if visited[start_index] || grid.cell_at(start_x, start_y).is_empty() {
                continue;
            }
            let wanted = grid.cell_at(start_x, start_y);
            let mut points = Vec::new();
            let mut worklist = vec![(start_x, start_y)];
            visited[start_index] = true;
            while let Some((x, y)) = worklist.pop() {
                points.push((x, y));
                for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
                    if nx < 0 || ny < 0 || nx >= width || ny >= height {
                        continue;
                    }
                    let index = (ny * width + nx) as usize;
                    if !visited[index] && grid.cell_at(nx, ny) == wanted {
                        visited[index] = true;
                        worklist.push((nx, ny));
                    }
                }
            }
            regions.push(region_from_points(points));
        }
    }
    regions
}

/// Build a region from a set of points, merging horizontal runs.
fn region_from_points(mut points: Vec<(i32, i32)>) -> Region {
    points.sort_by_key(|&(x, y)| (y, x));
    let mut region = Region::new();
    let mut run: Option<(i32, i32, i32)> = None; // (y, start x, end x exclusive)
    for (x, y) in points {
        run = match run {
            Some((run_y, start, end)) if run_y == y && x == end => Some((run_y, start, end + 1)),
            Some((run_y, start, end)) => {
                region.add_rect(&Rect::new(start, run_y, end - start, 1));
                Some((y, x, x + 1))
            }
            None => Some((y, x, x + 1)),
        };
    }
    if let Some((run_y, start, end)) = run {
        region.add_rect(&Rect::new(start, run_y, end - start, 1));
    }
    region
}

/// Pair the coherent regions of the two marker layers into rules, by index.
pub(crate) fn build_rules(
    input_regions: &TileLayerData,
    output_regions: &TileLayerData,
) -> Result<Vec<Rule>, SetupError> {
    let inputs = coherent_regions(input_regions);
    let outputs = coherent_regions(output_regions);
    if inputs.len() != outputs.len() {
        return Err(SetupError::RegionCountMismatch {
            inputs: inputs.len(),
            outputs: outputs.len(),
        });
    }
    Ok(inputs
        .into_iter()
        .zip(outputs)
        .map(|(input_region, output_region)| Rule {
            input_region,
            output_region,
        })
        .collect())
}
