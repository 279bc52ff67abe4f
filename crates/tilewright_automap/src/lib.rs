//! Rule-based automapping engine for tilewright.
//!
//! An [`AutoMapper`] is built from a *rules map* - an ordinary
//! [`Map`](tilewright_core::Map) whose layer names (`regions`,
//! `input<index>_<name>`, `inputnot<index>_<name>`, `output<index>_<name>`)
//! and properties (`DeleteTiles`, `AutomappingRadius`, `NoOverlappingRules`,
//! `StrictEmpty`) declare the rules - and applies those rules to a working
//! map with [`AutoMapper::auto_map`]. The [`AutomappingManager`]
//! orchestrates several rule maps against one working map in response to
//! edits.
//!
//! This crate never touches map files itself; rule maps are loaded through
//! the caller-supplied [`RuleMapProvider`].

mod automapper;
mod manager;
mod rule_map;

pub use automapper::AutoMapper;
pub use manager::{AutomappingManager, RuleMapProvider, RulesFileError};

use thiserror::Error;
use tilewright_core::PropertyError;

/// Maximum number of automapping passes triggered by a single edit before
/// the cascade is cut off.
///
/// A pass that stamps tiles into a layer used as an input by some rule set
/// schedules a follow-up pass over the stamped region. A rule whose output
/// re-satisfies its own input never converges; the cap guarantees
/// termination and is reported through the manager's warning string when it
/// is hit.
pub const MAX_AUTOMAP_CASCADES: u32 = 16;

/// Errors detected while interpreting a rules map.
///
/// These are fatal to the [`AutoMapper`] instance being set up: the instance
/// reports them through its error string and refuses to map anything.
#[derive(Debug, Error, PartialEq)]
pub enum SetupError {
    #[error(transparent)]
    Property(#[from] PropertyError),
    #[error("no input-regions layer found (expected 'regions' or 'regions_input')")]
    MissingInputRegionsLayer,
    #[error("no output-regions layer found (expected 'regions' or 'regions_output')")]
    MissingOutputRegionsLayer,
    #[error("duplicate regions layer '{name}'")]
    DuplicateRegionsLayer { name: String },
    #[error("layer '{name}' must be a tile layer")]
    NotATileLayer { name: String },
    #[error("no input layers found (expected 'input*' or 'inputnot*')")]
    NoInputLayers,
    #[error("no output layers found (expected 'output*')")]
    NoOutputLayers,
    #[error("found {inputs} input region(s) but {outputs} output region(s); every rule needs one of each")]
    RegionCountMismatch { inputs: usize, outputs: usize },
    #[error("output layer '{name}' disappeared from the working map")]
    OutputLayerVanished { name: String },
}
