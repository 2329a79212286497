//! In-memory host world for tests and the runner.
//!
//! Levels keep their authored layout (placements) separately from the live
//! entities, so `reload_level` can re-create exactly what a fresh level
//! load would: every placement, with new entity ids and default fields.

use crate::{
    host::{EntityInfo, EntityOrigin, EntityStatus, HostWorld, SavableEntity},
    transform::Transform,
    types::{EntityId, LevelName},
};
use std::collections::{BTreeMap, HashSet};

pub type EntityFactory = Box<dyn Fn() -> Box<dyn SavableEntity>>;

/// Type name used for the non-persistable entities of a level.
pub const INERT_TYPE: &str = "StaticMesh";

struct RegisteredType {
    factory:   EntityFactory,
    /// Whether the host may spawn this type at runtime. Fixed types can
    /// only exist through placement.
    spawnable: bool,
}

#[derive(Default)]
pub struct TypeRegistry {
    types: BTreeMap<String, RegisteredType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type that can be placed and spawned.
    pub fn register<T: SavableEntity + Default + 'static>(&mut self) -> &mut Self {
        self.insert::<T>(true)
    }

    /// Register a type that can be placed but never spawned.
    pub fn register_fixed<T: SavableEntity + Default + 'static>(&mut self) -> &mut Self {
        self.insert::<T>(false)
    }

    pub fn register_with(
        &mut self,
        type_name: &str,
        spawnable: bool,
        factory: impl Fn() -> Box<dyn SavableEntity> + 'static,
    ) -> &mut Self {
        self.types.insert(
            type_name.to_string(),
            RegisteredType { factory: Box::new(factory), spawnable },
        );
        self
    }

    fn insert<T: SavableEntity + Default + 'static>(&mut self, spawnable: bool) -> &mut Self {
        let type_name = T::default().type_name();
        self.register_with(type_name, spawnable, || Box::new(T::default()) as Box<dyn SavableEntity>)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn is_spawnable(&self, type_name: &str) -> bool {
        self.types.get(type_name).is_some_and(|t| t.spawnable)
    }

    pub fn build(&self, type_name: &str) -> Option<Box<dyn SavableEntity>> {
        self.types.get(type_name).map(|t| (t.factory)())
    }
}

#[derive(Debug, Clone)]
struct Placement {
    name:      String,
    type_name: String,
    transform: Transform,
}

struct LiveEntity {
    info: EntityInfo,
    /// `None` for entities without the persistable capability.
    body: Option<Box<dyn SavableEntity>>,
}

pub struct SandboxWorld {
    name:          String,
    registry:      TypeRegistry,
    levels:        Vec<LevelName>,
    layouts:       BTreeMap<LevelName, Vec<Placement>>,
    active:        Option<LevelName>,
    entities:      BTreeMap<EntityId, LiveEntity>,
    next_id:       u64,
    refused_types: HashSet<String>,
}

impl SandboxWorld {
    pub fn new(name: &str, registry: TypeRegistry) -> Self {
        Self {
            name: name.to_string(),
            registry,
            levels: Vec::new(),
            layouts: BTreeMap::new(),
            active: None,
            entities: BTreeMap::new(),
            next_id: 1,
            refused_types: HashSet::new(),
        }
    }

    /// Add a level. The first level added becomes the active one.
    pub fn add_level(&mut self, level: &str) -> &mut Self {
        if !self.levels.iter().any(|l| l == level) {
            self.levels.push(level.to_string());
            self.layouts.entry(level.to_string()).or_default();
        }
        if self.active.is_none() {
            self.active = Some(level.to_string());
        }
        self
    }

    pub fn set_active_level(&mut self, level: &str) -> bool {
        if !self.levels.iter().any(|l| l == level) {
            return false;
        }
        self.active = Some(level.to_string());
        true
    }

    /// Author a placed entity into `level` and instantiate it. Placing a
    /// persistable type that is not registered is refused.
    pub fn place(&mut self, level: &str, name: &str, type_name: &str, transform: Transform) -> Option<EntityId> {
        if !self.layouts.contains_key(level) {
            log::warn!("cannot place '{name}': unknown level '{level}'");
            return None;
        }
        if type_name != INERT_TYPE && !self.registry.contains(type_name) {
            log::warn!("cannot place '{name}': type '{type_name}' is not registered");
            return None;
        }
        let placement = Placement {
            name:      name.to_string(),
            type_name: type_name.to_string(),
            transform,
        };
        let id = self.instantiate(level, &placement);
        self.layouts.entry(level.to_string()).or_default().push(placement);
        Some(id)
    }

    /// Author a non-persistable entity into `level`.
    pub fn place_inert(&mut self, level: &str, name: &str, transform: Transform) -> Option<EntityId> {
        self.place(level, name, INERT_TYPE, transform)
    }

    /// Create an entity as gameplay would. Unlike `HostWorld::spawn` this
    /// also accepts fixed types.
    pub fn spawn_runtime(&mut self, level: &str, type_name: &str, transform: Transform) -> Option<EntityId> {
        if !self.layouts.contains_key(level) {
            return None;
        }
        let body = self.registry.build(type_name)?;
        Some(self.insert(level, "", type_name, EntityOrigin::Runtime, transform, Some(body)))
    }

    /// Discard every entity of `level` and re-create its authored layout
    /// with fresh ids, as a level load after a restart does.
    pub fn reload_level(&mut self, level: &str) -> Vec<EntityId> {
        self.entities.retain(|_, slot| slot.info.level != level);
        let placements = self.layouts.get(level).cloned().unwrap_or_default();
        placements.iter().map(|p| self.instantiate(level, p)).collect()
    }

    /// Make the host refuse every spawn of `type_name`.
    pub fn refuse_spawns_of(&mut self, type_name: &str) {
        self.refused_types.insert(type_name.to_string());
    }

    pub fn mark_prototype(&mut self, id: EntityId) -> bool {
        self.set_status(id, EntityStatus::Prototype)
    }

    pub fn mark_pending_destroy(&mut self, id: EntityId) -> bool {
        self.set_status(id, EntityStatus::PendingDestroy)
    }

    pub fn find_by_name(&self, level: &str, name: &str) -> Option<EntityId> {
        self.entities
            .values()
            .find(|s| s.info.level == level && s.info.stable_name == name)
            .map(|s| s.info.id)
    }

    /// All entities of `level`, persistable or not, in ascending id order.
    pub fn entities_in(&self, level: &str) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|s| s.info.level == level)
            .map(|s| s.info.id)
            .collect()
    }

    pub fn of_type(&self, level: &str, type_name: &str) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|s| s.info.level == level && s.info.type_name == type_name)
            .map(|s| s.info.id)
            .collect()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get<T: 'static>(&self, id: EntityId) -> Option<&T> {
        self.entities.get(&id)?.body.as_ref()?.as_any().downcast_ref::<T>()
    }

    pub fn get_mut<T: 'static>(&mut self, id: EntityId) -> Option<&mut T> {
        self.entities.get_mut(&id)?.body.as_mut()?.as_any_mut().downcast_mut::<T>()
    }

    fn set_status(&mut self, id: EntityId, status: EntityStatus) -> bool {
        match self.entities.get_mut(&id) {
            Some(slot) => {
                slot.info.status = status;
                true
            }
            None => false,
        }
    }

    fn instantiate(&mut self, level: &str, placement: &Placement) -> EntityId {
        let body = self.registry.build(&placement.type_name);
        self.insert(
            level,
            &placement.name,
            &placement.type_name,
            EntityOrigin::Placed,
            placement.transform,
            body,
        )
    }

    fn insert(
        &mut self,
        level: &str,
        name: &str,
        type_name: &str,
        origin: EntityOrigin,
        transform: Transform,
        body: Option<Box<dyn SavableEntity>>,
    ) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        let info = EntityInfo {
            id,
            level: level.to_string(),
            type_name: type_name.to_string(),
            stable_name: name.to_string(),
            origin,
            status: EntityStatus::Live,
            transform,
        };
        self.entities.insert(id, LiveEntity { info, body });
        id
    }
}

impl HostWorld for SandboxWorld {
    fn world_name(&self) -> &str {
        &self.name
    }

    fn levels(&self) -> Vec<LevelName> {
        self.levels.clone()
    }

    fn active_level(&self) -> Option<LevelName> {
        self.active.clone()
    }

    fn persistable_entities(&self, level: &str) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|s| s.info.level == level && s.body.is_some())
            .map(|s| s.info.id)
            .collect()
    }

    fn info(&self, id: EntityId) -> Option<EntityInfo> {
        self.entities.get(&id).map(|s| s.info.clone())
    }

    fn entity(&self, id: EntityId) -> Option<&(dyn SavableEntity + 'static)> {
        self.entities.get(&id)?.body.as_deref()
    }

    fn entity_mut(&mut self, id: EntityId) -> Option<&mut (dyn SavableEntity + 'static)> {
        self.entities.get_mut(&id)?.body.as_deref_mut()
    }

    fn set_transform(&mut self, id: EntityId, transform: Transform) -> bool {
        match self.entities.get_mut(&id) {
            Some(slot) => {
                slot.info.transform = transform;
                true
            }
            None => false,
        }
    }

    fn can_spawn(&self, type_name: &str) -> bool {
        self.registry.is_spawnable(type_name)
    }

    fn spawn(&mut self, level: &str, type_name: &str, transform: Transform) -> Option<EntityId> {
        if !self.can_spawn(type_name) || self.refused_types.contains(type_name) {
            return None;
        }
        self.spawn_runtime(level, type_name, transform)
    }

    fn destroy(&mut self, id: EntityId) -> bool {
        self.entities.remove(&id).is_some()
    }
}
