//! # quadgrid-types
//!
//! Plain data shared by the quadgrid crates: grid coordinates, logical button
//! events, LED colors, scale tables and the controller state record.

pub mod color;
pub mod controller;
pub mod event;
pub mod grid;
pub mod rng;
pub mod scale;

pub use color::{ColorCapability, LedColor, LedComponents};
pub use controller::{ControllerState, DirtyRegions, ModeId, Region, ToggleId};
pub use event::{ButtonEvent, Generation, LedTarget, LogicalEvent, CONTROL_COUNT};
pub use grid::{GridPosition, GRID_CELLS, GRID_SIZE};
pub use scale::{note_name, ScaleDegreeSet, ScaleError, NOTE_NAMES};
