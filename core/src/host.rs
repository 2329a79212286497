//! Traits at the seam between the save system and its collaborators.
//!
//! RULE: The save system never reaches into host internals.
//! Everything it knows about live entities comes through HostWorld,
//! and everything it knows about durable storage comes through SlotStore.
//! Capability filtering happens once, in persistable_entities();
//! nothing downstream re-checks it.

use crate::{
    error::SaveResult,
    field::PersistFields,
    transform::Transform,
    types::{EntityId, LevelName, UserIndex},
};
use std::any::Any;

/// The persistable capability. Hooks default to no-ops.
pub trait Savable: PersistFields {
    /// Called before fields are captured.
    fn pre_save(&mut self) {}

    /// Called after the record has been built.
    fn post_save(&mut self) {}

    /// Called after fields (and, for entities, components) were restored.
    fn post_load(&mut self) {}
}

/// A persistable entity, optionally carrying persistable components.
pub trait SavableEntity: Savable {
    /// Attached persistable components, in a stable order.
    /// The order is part of the stored format: component sections are
    /// replayed in exactly this order.
    fn components(&self) -> Vec<&dyn Savable> {
        Vec::new()
    }

    fn components_mut(&mut self) -> Vec<&mut dyn Savable> {
        Vec::new()
    }

    /// For downcasting in tests and tooling only.
    /// The save system never uses this.
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// How an entity came to exist in its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOrigin {
    /// Part of the level's authored layout; re-created on every level load.
    Placed,
    /// Created while the simulation was running.
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityStatus {
    Live,
    /// Template object entities are instantiated from. Never persisted.
    Prototype,
    /// Destruction has begun. Never persisted.
    PendingDestroy,
}

/// Host-side facts about an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInfo {
    pub id:          EntityId,
    pub level:       LevelName,
    pub type_name:   String,
    /// Authoring-time name. Unique within its level for placed entities.
    pub stable_name: String,
    pub origin:      EntityOrigin,
    pub status:      EntityStatus,
    pub transform:   Transform,
}

/// The live simulation world.
pub trait HostWorld {
    fn world_name(&self) -> &str;

    /// Loaded levels in a stable order.
    fn levels(&self) -> Vec<LevelName>;

    /// The level flat-scope operations act on.
    fn active_level(&self) -> Option<LevelName>;

    /// Every entity of `level` implementing the persistable capability, in
    /// ascending id order.
    fn persistable_entities(&self, level: &str) -> Vec<EntityId>;

    fn info(&self, id: EntityId) -> Option<EntityInfo>;

    fn level_of(&self, id: EntityId) -> Option<LevelName> {
        self.info(id).map(|info| info.level)
    }

    fn entity(&self, id: EntityId) -> Option<&(dyn SavableEntity + 'static)>;

    fn entity_mut(&mut self, id: EntityId) -> Option<&mut (dyn SavableEntity + 'static)>;

    fn set_transform(&mut self, id: EntityId, transform: Transform) -> bool;

    /// Whether `spawn` knows how to build this type.
    fn can_spawn(&self, type_name: &str) -> bool;

    /// Spawn a runtime entity. `None` when the type is unknown or the host
    /// refused the spawn.
    fn spawn(&mut self, level: &str, type_name: &str, transform: Transform) -> Option<EntityId>;

    fn destroy(&mut self, id: EntityId) -> bool;
}

/// Durable slot storage. Calls are blocking; there is no retry policy.
pub trait SlotStore {
    fn exists(&self, slot: &str, user: UserIndex) -> SaveResult<bool>;

    fn write(&mut self, slot: &str, user: UserIndex, bytes: &[u8]) -> SaveResult<()>;

    fn read(&self, slot: &str, user: UserIndex) -> SaveResult<Option<Vec<u8>>>;

    /// Returns false when there was nothing to delete.
    fn delete(&mut self, slot: &str, user: UserIndex) -> SaveResult<bool>;
}
