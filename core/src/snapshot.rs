//! Snapshot data model: records, per-level sets, and the save slot.
//!
//! A save slot holds two scopes side by side:
//!   - flat scope:   one SnapshotSet for the active level plus named
//!                   world-less objects
//!   - world scope:  world name -> level name -> SnapshotSet
//! and, shared by both, the list of explicit-key records for singletons.
//!
//! Every save rewrites the full slot. Nothing here is incremental.

use crate::{
    error::{SaveError, SaveResult},
    identity::IdentityKey,
    transform::Transform,
    types::{LevelName, TypeName, WorldName},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Bumped whenever the slot layout changes incompatibly.
pub const SLOT_FORMAT_VERSION: u32 = 1;

/// One entity's identity, type, transform and persisted field stream.
/// Two records are the same logical entity iff their keys are equal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub key:       IdentityKey,
    pub type_name: TypeName,
    pub transform: Transform,
    /// Opaque field stream, see `field`.
    pub data:      Vec<u8>,
}

impl PartialEq for SnapshotRecord {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl SnapshotRecord {
    pub fn is_valid(&self) -> bool {
        !self.key.is_empty()
    }
}

/// A world-less object, addressed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub name:      String,
    pub type_name: TypeName,
    pub data:      Vec<u8>,
}

impl PartialEq for ObjectRecord {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// All records for one level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotSet {
    pub placed:  BTreeMap<String, SnapshotRecord>,
    pub runtime: Vec<SnapshotRecord>,
}

impl SnapshotSet {
    /// Add or replace by key. Invalid and explicit-key records are refused:
    /// explicit records live on the slot, not in a level.
    pub fn insert(&mut self, record: SnapshotRecord) -> bool {
        if !record.is_valid() {
            return false;
        }
        match &record.key {
            IdentityKey::Placed(name) => {
                self.placed.insert(name.clone(), record);
                true
            }
            IdentityKey::Runtime(_) => {
                self.runtime.retain(|r| r.key != record.key);
                self.runtime.push(record);
                true
            }
            IdentityKey::Explicit(_) => false,
        }
    }

    pub fn find(&self, key: &IdentityKey) -> Option<&SnapshotRecord> {
        match key {
            IdentityKey::Placed(name) => self.placed.get(name),
            IdentityKey::Runtime(_) => self.runtime.iter().find(|r| &r.key == key),
            IdentityKey::Explicit(_) => None,
        }
    }

    pub fn remove(&mut self, key: &IdentityKey) -> Option<SnapshotRecord> {
        match key {
            IdentityKey::Placed(name) => self.placed.remove(name),
            IdentityKey::Runtime(_) => {
                let index = self.runtime.iter().position(|r| &r.key == key)?;
                Some(self.runtime.remove(index))
            }
            IdentityKey::Explicit(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.placed.len() + self.runtime.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placed.is_empty() && self.runtime.is_empty()
    }

    /// Placed records in name order, then runtime records in save order.
    pub fn records(&self) -> impl Iterator<Item = &SnapshotRecord> {
        self.placed.values().chain(self.runtime.iter())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub name:   WorldName,
    pub levels: BTreeMap<LevelName, SnapshotSet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlotMeta {
    pub name:           String,
    pub created_at:     DateTime<Utc>,
    pub last_saved:     DateTime<Utc>,
    pub format_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveSlot {
    pub meta:           SlotMeta,
    /// Flat scope. `None` until a level has been saved into this slot.
    #[serde(default)]
    pub level_entities: Option<SnapshotSet>,
    #[serde(default)]
    pub objects:        Vec<ObjectRecord>,
    #[serde(default)]
    pub worlds:         BTreeMap<WorldName, WorldSnapshot>,
    #[serde(default)]
    pub explicit:       Vec<SnapshotRecord>,
}

#[derive(Deserialize)]
struct VersionProbe {
    meta: MetaProbe,
}

#[derive(Deserialize)]
struct MetaProbe {
    format_version: u32,
}

impl SaveSlot {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            meta: SlotMeta {
                name:           name.to_string(),
                created_at:     now,
                last_saved:     now,
                format_version: SLOT_FORMAT_VERSION,
            },
            level_entities: None,
            objects:        Vec::new(),
            worlds:         BTreeMap::new(),
            explicit:       Vec::new(),
        }
    }

    /// Stamp the last-saved time.
    pub fn touch(&mut self) {
        self.meta.last_saved = Utc::now();
    }

    /// Remove-then-add by key: the newest record wins, nothing is merged.
    pub fn upsert_explicit(&mut self, record: SnapshotRecord) {
        self.explicit.retain(|r| r.key != record.key);
        self.explicit.push(record);
    }

    pub fn find_explicit(&self, key: Uuid) -> Option<&SnapshotRecord> {
        let key = IdentityKey::Explicit(key);
        self.explicit.iter().find(|r| r.key == key)
    }

    /// Remove-then-add by name.
    pub fn upsert_object(&mut self, record: ObjectRecord) {
        self.objects.retain(|r| r.name != record.name);
        self.objects.push(record);
    }

    pub fn find_object(&self, name: &str) -> Option<&ObjectRecord> {
        self.objects.iter().find(|r| r.name == name)
    }

    /// Returns whether there was anything to delete.
    pub fn delete_world_data(&mut self, world: &str) -> bool {
        self.worlds.remove(world).is_some()
    }

    pub fn level_set(&self, world: &str, level: &str) -> Option<&SnapshotSet> {
        self.worlds.get(world)?.levels.get(level)
    }

    pub fn to_bytes(&self) -> SaveResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a slot, refusing formats newer than `max_version` before
    /// attempting to read the body.
    pub fn from_bytes(bytes: &[u8], max_version: u32) -> SaveResult<Self> {
        let probe: VersionProbe = serde_json::from_slice(bytes)?;
        if probe.meta.format_version > max_version {
            return Err(SaveError::UnsupportedVersion {
                found:     probe.meta.format_version,
                supported: max_version,
            });
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}
