//! Orchestrates several rule maps against one working map.

use std::collections::{BTreeSet, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rand::Rng;
use thiserror::Error;
use tilewright_core::{Map, Region};

use crate::{AutoMapper, MAX_AUTOMAP_CASCADES};

/// Loads rule maps on behalf of the manager.
///
/// Map file I/O lives outside this crate; the editing application passes in
/// whatever loader it uses for regular maps.
pub trait RuleMapProvider {
    fn load_map(&self, path: &Path) -> Result<Map, RulesFileError>;
}

/// Errors around the rules file and the rule maps it lists
#[derive(Debug, Error)]
pub enum RulesFileError {
    #[error("failed to read rules file '{path}': {message}")]
    Read { path: PathBuf, message: String },
    #[error("rules file include cycle at '{path}'")]
    IncludeCycle { path: PathBuf },
    #[error("failed to load rule map '{path}': {message}")]
    Map { path: PathBuf, message: String },
}

/// Applies every loaded rule map to a working map, either on demand over a
/// selection or incrementally in response to edit notifications.
///
/// Rule maps are listed in a rules file (one path per line, `#` and `//`
/// comments, nested `.txt` includes) and loaded lazily on first use through
/// the [`RuleMapProvider`]. Call [`invalidate`](AutomappingManager::invalidate)
/// when the rules file may have changed.
#[derive(Default)]
pub struct AutomappingManager {
    rules_file: Option<PathBuf>,
    auto_mappers: Vec<AutoMapper>,
    loaded: bool,
    error: String,
    warning: String,
}

impl AutomappingManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point the manager at a rules file, dropping any loaded rule maps
    pub fn set_rules_file(&mut self, path: impl Into<PathBuf>) {
        self.rules_file = Some(path.into());
        self.invalidate();
    }

    pub fn rules_file(&self) -> Option<&Path> {
        self.rules_file.as_deref()
    }

    /// Drop the loaded rule maps; they are reloaded on the next run
    pub fn invalidate(&mut self) {
        self.auto_mappers.clear();
        self.loaded = false;
    }

    /// Errors accumulated since the rule maps were loaded
    pub fn error_string(&self) -> &str {
        &self.error
    }

    /// Warnings accumulated since the rule maps were loaded
    pub fn warning_string(&self) -> &str {
        &self.warning
    }

    /// Apply all rule maps to `selection`, or to the whole map when there
    /// is no selection.
    pub fn auto_map(
        &mut self,
        map: &mut Map,
        selection: Option<Region>,
        provider: &dyn RuleMapProvider,
        rng: &mut impl Rng,
    ) {
        let region = selection.unwrap_or_else(|| Region::from_rect(map.bounds()));
        self.auto_map_internal(map, region, None, provider, rng);
    }

    /// React to a committed edit of `region` on the layer named
    /// `touched_layer`: only rule maps reading from a layer of that name
    /// run.
    pub fn on_region_edited(
        &mut self,
        map: &mut Map,
        region: Region,
        touched_layer: &str,
        provider: &dyn RuleMapProvider,
        rng: &mut impl Rng,
    ) {
        self.auto_map_internal(map, region, Some(touched_layer.to_string()), provider, rng);
    }

    /// The shared automapping loop: a bounded breadth-first queue of
    /// (region, layer) work items, seeded with the triggering edit. Stamps
    /// written into a layer some rule map reads from are queued again, so
    /// chained rules resolve without unbounded recursion.
    fn auto_map_internal(
        &mut self,
        map: &mut Map,
        region: Region,
        touched_layer: Option<String>,
        provider: &dyn RuleMapProvider,
        rng: &mut impl Rng,
    ) {
        self.ensure_loaded(provider);
        if self.auto_mappers.is_empty() {
            return;
        }

        let mut queue = VecDeque::new();
        queue.push_back((region, touched_layer));
        let mut passes = 0u32;

        while let Some((region, layer_name)) = queue.pop_front() {
            if passes >= MAX_AUTOMAP_CASCADES {
                let _ = writeln!(
                    self.warning,
                    "automapping cascade stopped after {} passes; \
                     some rules may keep retriggering each other",
                    MAX_AUTOMAP_CASCADES
                );
                break;
            }
            passes += 1;

            let mut errors = String::new();
            let mut warnings = String::new();
            let mut stamped: Vec<(Region, String)> = Vec::new();

            for mapper in &mut self.auto_mappers {
                let relevant = layer_name
                    .as_deref()
                    .map_or(true, |name| mapper.rule_layer_name_used(name));
                if !relevant {
                    continue;
                }
                let mut where_region = region.clone();
                if mapper.prepare_auto_map(map) {
                    mapper.auto_map(map, &mut where_region, rng);
                    if !where_region.is_empty() {
                        for touched in mapper.touched_tile_layers() {
                            stamped.push((where_region.clone(), touched.to_string()));
                        }
                    }
                }
                mapper.clean_all(map);
                errors.push_str(mapper.error_string());
                warnings.push_str(mapper.warning_string());
            }

            self.error.push_str(&errors);
            self.warning.push_str(&warnings);

            for (written, layer) in stamped {
                if self.auto_mappers.iter().any(|m| m.rule_layer_name_used(&layer)) {
                    queue.push_back((written, Some(layer)));
                }
            }
        }
    }

    /// Parse the rules file and build one automapper per listed rule map.
    /// Load failures surface through the error string; valid rule maps
    /// still run.
    fn ensure_loaded(&mut self, provider: &dyn RuleMapProvider) {
        if self.loaded {
            return;
        }
        self.loaded = true;
        self.error.clear();
        self.warning.clear();
        self.auto_mappers.clear();

        let Some(rules_file) = self.rules_file.clone() else {
            return;
        };
        let mut paths = Vec::new();
        let mut visited = BTreeSet::new();
        if let Err(error) = collect_rule_map_paths(&rules_file, &mut visited, &mut paths) {
            let _ = writeln!(self.error, "{}", error);
            return;
        }

        for path in paths {
            match provider.load_map(&path) {
                Ok(rules_map) => {
                    let mapper = AutoMapper::new(rules_map, &path);
                    self.warning.push_str(mapper.warning_string());
                    if mapper.is_valid() {
                        self.auto_mappers.push(mapper);
                    } else {
                        self.error.push_str(mapper.error_string());
                    }
                }
                Err(error) => {
                    let _ = writeln!(self.error, "{}", error);
                }
            }
        }
    }
}

/// Collect the rule map paths listed in the rules file at `path`, following
/// nested `.txt` includes. Relative entries resolve against the listing
/// file's directory.
fn collect_rule_map_paths(
    path: &Path,
    visited: &mut BTreeSet<PathBuf>,
    out: &mut Vec<PathBuf>,
) -> Result<(), RulesFileError> {
    if !visited.insert(path.to_path_buf()) {
        return Err(RulesFileError::IncludeCycle {
            path: path.to_path_buf(),
        });
    }
    let text = std::fs::read_to_string(path).map_err(|error| RulesFileError::Read {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let entry = base.join(line);
        if line.to_ascii_lowercase().ends_with(".txt") {
            collect_rule_map_paths(&entry, visited, out)?;
        } else {
            out.push(entry);
        }
    }
    Ok(())
}
