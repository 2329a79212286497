//! Shared primitive types used across the entire save system.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque handle the host world hands out for a live entity.
/// Handles are never reused within one world instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// The type descriptor ("class") of an entity or object.
pub type TypeName = String;

/// Name of a level inside a world.
pub type LevelName = String;

/// Name of a world (map) in the host simulation.
pub type WorldName = String;

/// Name of a save slot.
pub type SlotName = String;

/// Identifies the user doing the saving. Slots are keyed by (name, user).
pub type UserIndex = u32;
