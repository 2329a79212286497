//! The save system: the public surface other code calls.
//!
//! Every operation comes in two forms:
//!   - `op(...)`     returns bool / Option and logs the failure
//!   - `try_op(...)` returns the typed `SaveResult`
//!
//! RULES:
//!   - Every save reads the whole slot (creating it on first save), mutates
//!     it, stamps last_saved and writes it back. A failed write is a failed
//!     save; there is no retry.
//!   - Loads never write the slot.
//!   - A failure on one entity never aborts its siblings.
//!   - Not reentrant: one caller per slot at a time.

use crate::{
    config::SaveConfig,
    error::{SaveError, SaveResult},
    extract::{apply_object, apply_record, extract_object, extract_record},
    field::{ApplyReport, FieldReader},
    host::{HostWorld, Savable, SlotStore},
    identity::{IdentityKey, IdentityResolver, KeyGenerator},
    reconcile::{ReconcileMode, ReconcileReport, Reconciler},
    snapshot::{SaveSlot, SlotMeta, SnapshotSet, WorldSnapshot},
    types::{EntityId, UserIndex},
};
use std::collections::BTreeMap;

/// Outcome of loading a whole world: one report per level that had data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldLoadReport {
    pub world:  String,
    pub levels: Vec<ReconcileReport>,
}

pub struct SaveSystem<S: SlotStore> {
    config:   SaveConfig,
    resolver: IdentityResolver,
    store:    S,
}

impl<S: SlotStore> SaveSystem<S> {
    pub fn new(config: SaveConfig, store: S) -> Self {
        let resolver = IdentityResolver::new(KeyGenerator::from_config(config.key_seed));
        Self { config, resolver, store }
    }

    pub fn config(&self) -> &SaveConfig {
        &self.config
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    /// For attaching explicit keys to singleton entities.
    pub fn resolver_mut(&mut self) -> &mut IdentityResolver {
        &mut self.resolver
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    // ── Flat scope: active level ───────────────────────────────

    pub fn save_level_entities<W: HostWorld + ?Sized>(&mut self, world: &mut W, slot: &str, user: UserIndex) -> bool {
        reported("save_level_entities", slot, self.try_save_level_entities(world, slot, user)).is_some()
    }

    /// Capture every persistable entity of the active level, replacing the
    /// slot's flat set. Returns the number of records written.
    pub fn try_save_level_entities<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        slot: &str,
        user: UserIndex,
    ) -> SaveResult<usize> {
        let level = active_level(world)?;
        let mut data = self.read_or_create(slot, user)?;
        let previous = data.level_entities.take();
        let (set, saved) = self.capture_level(world, &level, &mut data, previous.as_ref());
        data.level_entities = Some(set);
        self.write_slot(&mut data, user)?;
        log::info!("slot '{slot}': saved {saved} record(s) of level '{level}'");
        Ok(saved)
    }

    pub fn load_level_entities<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        slot: &str,
        user: UserIndex,
        full_rebuild: bool,
    ) -> Option<ReconcileReport> {
        reported("load_level_entities", slot, self.try_load_level_entities(world, slot, user, full_rebuild)).flatten()
    }

    /// Reconcile the active level with the slot's flat set. `Ok(None)` when
    /// there is nothing stored; the level is then left untouched.
    pub fn try_load_level_entities<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        slot: &str,
        user: UserIndex,
        full_rebuild: bool,
    ) -> SaveResult<Option<ReconcileReport>> {
        let level = active_level(world)?;
        let Some(data) = self.read_slot(slot, user)? else {
            log::info!("slot '{slot}' does not exist, level '{level}' left as loaded");
            return Ok(None);
        };
        let Some(set) = data.level_entities.as_ref() else {
            log::info!("slot '{slot}' holds no level entities, level '{level}' left as loaded");
            return Ok(None);
        };
        let mode = if full_rebuild { ReconcileMode::FullRebuild } else { ReconcileMode::Incremental };
        let report = Reconciler::new(&self.config).reconcile(world, &mut self.resolver, &level, set, &data.explicit, mode);
        Ok(Some(report))
    }

    // ── Single entities ────────────────────────────────────────

    pub fn save_entity<W: HostWorld + ?Sized>(&mut self, world: &mut W, id: EntityId, slot: &str, user: UserIndex) -> bool {
        reported("save_entity", slot, self.try_save_entity(world, id, slot, user)).is_some()
    }

    /// Capture one entity into the flat set (or the explicit list for an
    /// explicit-key entity). Returns the key it was stored under.
    pub fn try_save_entity<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        id: EntityId,
        slot: &str,
        user: UserIndex,
    ) -> SaveResult<IdentityKey> {
        let mut data = self.read_or_create(slot, user)?;
        let record = extract_record(world, &mut self.resolver, id)?;
        if !record.is_valid() {
            return Err(SaveError::precondition(format!("{id} is a prototype or being destroyed")));
        }
        let key = record.key.clone();
        if key.is_explicit() {
            data.upsert_explicit(record);
        } else {
            data.level_entities.get_or_insert_with(SnapshotSet::default).insert(record);
        }
        self.write_slot(&mut data, user)?;
        log::info!("slot '{slot}': saved {id} as {key}");
        Ok(key)
    }

    pub fn load_entity<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        id: EntityId,
        slot: &str,
        user: UserIndex,
        full_rebuild: bool,
    ) -> Option<EntityId> {
        reported("load_entity", slot, self.try_load_entity(world, id, slot, user, full_rebuild)).flatten()
    }

    /// Restore one entity from its stored record. In full-rebuild mode the
    /// live entity is destroyed and a replacement spawned from the record;
    /// the returned id is then the replacement's, and on any failure the
    /// live entity is left as it was. `Ok(None)` when there is no record
    /// for it.
    pub fn try_load_entity<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        id: EntityId,
        slot: &str,
        user: UserIndex,
        full_rebuild: bool,
    ) -> SaveResult<Option<EntityId>> {
        let info = world
            .info(id)
            .ok_or_else(|| SaveError::precondition(format!("entity {id} is not in the world")))?;
        let Some(data) = self.read_slot(slot, user)? else {
            return Ok(None);
        };
        let Some(key) = self.resolver.peek(&*world, id)? else {
            log::debug!("{id} has never been saved");
            return Ok(None);
        };
        let record = match &key {
            IdentityKey::Explicit(guid) => data.find_explicit(*guid),
            other => data.level_entities.as_ref().and_then(|set| set.find(other)),
        };
        let Some(record) = record else {
            log::debug!("slot '{slot}': no record for {key}");
            return Ok(None);
        };

        if !full_rebuild {
            let fields = apply_record(world, id, record)?;
            self.resolver.adopt(id, key.clone());
            log::info!("slot '{slot}': loaded {key} into {id} ({} field(s) applied)", fields.applied);
            return Ok(Some(id));
        }

        // The live entity goes only once its replacement is fully restored.
        FieldReader::open(&record.data)?;
        if !world.can_spawn(&record.type_name) {
            return Err(SaveError::precondition(format!("{} cannot be spawned for {key}", record.type_name)));
        }
        let replacement = world.spawn(&info.level, &record.type_name, record.transform).ok_or_else(|| {
            SaveError::precondition(format!("host refused to spawn {} for {key}", record.type_name))
        })?;
        let fields = match apply_record(world, replacement, record) {
            Ok(fields) => fields,
            Err(e) => {
                world.destroy(replacement);
                return Err(e);
            }
        };
        if !world.destroy(id) {
            world.destroy(replacement);
            return Err(SaveError::precondition(format!("host refused to destroy {id}")));
        }
        self.resolver.forget(id);
        self.resolver.adopt(replacement, key.clone());
        log::info!("slot '{slot}': rebuilt {key} as {replacement} ({} field(s) applied)", fields.applied);
        Ok(Some(replacement))
    }

    // ── World-less objects ─────────────────────────────────────

    pub fn save_object<T: Savable + ?Sized>(&mut self, name: &str, object: &mut T, slot: &str, user: UserIndex) -> bool {
        reported("save_object", slot, self.try_save_object(name, object, slot, user)).is_some()
    }

    /// Last write wins by object name.
    pub fn try_save_object<T: Savable + ?Sized>(
        &mut self,
        name: &str,
        object: &mut T,
        slot: &str,
        user: UserIndex,
    ) -> SaveResult<()> {
        if name.is_empty() {
            return Err(SaveError::precondition("object name is empty"));
        }
        let mut data = self.read_or_create(slot, user)?;
        data.upsert_object(extract_object(name, object)?);
        self.write_slot(&mut data, user)?;
        log::info!("slot '{slot}': saved object '{name}'");
        Ok(())
    }

    /// True when a record was found and applied.
    pub fn load_object<T: Savable + ?Sized>(&mut self, name: &str, object: &mut T, slot: &str, user: UserIndex) -> bool {
        matches!(reported("load_object", slot, self.try_load_object(name, object, slot, user)), Some(Some(_)))
    }

    pub fn try_load_object<T: Savable + ?Sized>(
        &mut self,
        name: &str,
        object: &mut T,
        slot: &str,
        user: UserIndex,
    ) -> SaveResult<Option<ApplyReport>> {
        let Some(data) = self.read_slot(slot, user)? else {
            return Ok(None);
        };
        let Some(record) = data.find_object(name) else {
            log::debug!("slot '{slot}': no object '{name}'");
            return Ok(None);
        };
        Ok(Some(apply_object(object, record)?))
    }

    // ── World scope: every level ───────────────────────────────

    pub fn save_world<W: HostWorld + ?Sized>(&mut self, world: &mut W, slot: &str, user: UserIndex) -> bool {
        reported("save_world", slot, self.try_save_world(world, slot, user)).is_some()
    }

    /// Replace this world's data with a capture of every level, and refresh
    /// the explicit records of explicit-key entities.
    pub fn try_save_world<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        slot: &str,
        user: UserIndex,
    ) -> SaveResult<usize> {
        let mut data = self.read_or_create(slot, user)?;
        let name = world.world_name().to_string();
        let previous = data.worlds.get(&name).cloned();
        data.delete_world_data(&name);

        let mut levels = BTreeMap::new();
        let mut saved = 0;
        for level in world.levels() {
            let kept = previous.as_ref().and_then(|w| w.levels.get(&level));
            let (set, count) = self.capture_level(world, &level, &mut data, kept);
            saved += count;
            levels.insert(level, set);
        }
        data.worlds.insert(name.clone(), WorldSnapshot { name: name.clone(), levels });
        self.write_slot(&mut data, user)?;
        log::info!("slot '{slot}': saved world '{name}' ({saved} record(s))");
        Ok(saved)
    }

    /// Reconcile every level with the mode from the configuration.
    pub fn load_world<W: HostWorld + ?Sized>(&mut self, world: &mut W, slot: &str, user: UserIndex) -> bool {
        let mode = self.config.default_mode;
        self.load_world_with(world, slot, user, mode)
    }

    pub fn load_world_with<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        slot: &str,
        user: UserIndex,
        mode: ReconcileMode,
    ) -> bool {
        matches!(reported("load_world", slot, self.try_load_world(world, slot, user, mode)), Some(Some(_)))
    }

    /// `Ok(None)` when the slot holds nothing for this world. Levels without
    /// stored data are left as loaded.
    pub fn try_load_world<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        slot: &str,
        user: UserIndex,
        mode: ReconcileMode,
    ) -> SaveResult<Option<WorldLoadReport>> {
        let data = self.require_slot(slot, user)?;
        let name = world.world_name().to_string();
        if !data.worlds.contains_key(&name) {
            log::info!("slot '{slot}' holds no data for world '{name}'");
            return Ok(None);
        }

        let reconciler = Reconciler::new(&self.config);
        let mut report = WorldLoadReport { world: name.clone(), levels: Vec::new() };
        for level in world.levels() {
            let Some(set) = data.level_set(&name, &level) else {
                log::debug!("world '{name}': no stored data for level '{level}'");
                continue;
            };
            report.levels.push(reconciler.reconcile(world, &mut self.resolver, &level, set, &data.explicit, mode));
        }
        log::info!("slot '{slot}': loaded world '{name}' ({} level(s))", report.levels.len());
        Ok(Some(report))
    }

    // ── Explicit-key singletons ────────────────────────────────

    pub fn save_global<W: HostWorld + ?Sized>(&mut self, world: &mut W, id: EntityId, slot: &str, user: UserIndex) -> bool {
        reported("save_global", slot, self.try_save_global(world, id, slot, user)).is_some()
    }

    /// Store the record of an explicit-key entity, replacing any record with
    /// the same key.
    pub fn try_save_global<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        id: EntityId,
        slot: &str,
        user: UserIndex,
    ) -> SaveResult<IdentityKey> {
        let key = self.explicit_key(&*world, id)?;
        let mut data = self.read_or_create(slot, user)?;
        let record = extract_record(world, &mut self.resolver, id)?;
        if !record.is_valid() {
            return Err(SaveError::precondition(format!("{id} is a prototype or being destroyed")));
        }
        data.upsert_explicit(record);
        self.write_slot(&mut data, user)?;
        log::info!("slot '{slot}': saved global {key}");
        Ok(key)
    }

    /// True when a record was found and applied.
    pub fn load_global<W: HostWorld + ?Sized>(&mut self, world: &mut W, id: EntityId, slot: &str, user: UserIndex) -> bool {
        reported("load_global", slot, self.try_load_global(world, id, slot, user)).unwrap_or(false)
    }

    /// `Ok(false)` when nothing is stored under the entity's key.
    pub fn try_load_global<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        id: EntityId,
        slot: &str,
        user: UserIndex,
    ) -> SaveResult<bool> {
        let key = self.explicit_key(&*world, id)?;
        let Some(data) = self.read_slot(slot, user)? else {
            return Ok(false);
        };
        let IdentityKey::Explicit(guid) = &key else {
            return Ok(false);
        };
        let Some(record) = data.find_explicit(*guid) else {
            log::debug!("slot '{slot}': no global record for {key}");
            return Ok(false);
        };
        apply_record(world, id, record)?;
        log::info!("slot '{slot}': loaded global {key} into {id}");
        Ok(true)
    }

    // ── Slot management ────────────────────────────────────────

    pub fn delete_save(&mut self, slot: &str, user: UserIndex) -> bool {
        reported("delete_save", slot, self.try_delete_save(slot, user)).is_some()
    }

    /// Fails with `SlotNotFound` when there was nothing to delete.
    pub fn try_delete_save(&mut self, slot: &str, user: UserIndex) -> SaveResult<()> {
        check_slot_name(slot)?;
        if !self.store.delete(slot, user)? {
            return Err(SaveError::SlotNotFound { slot: slot.to_string(), user });
        }
        log::info!("slot '{slot}' (user {user}) deleted");
        Ok(())
    }

    pub fn slot_meta(&self, slot: &str, user: UserIndex) -> Option<SlotMeta> {
        reported("slot_meta", slot, self.try_slot_meta(slot, user)).flatten()
    }

    pub fn try_slot_meta(&self, slot: &str, user: UserIndex) -> SaveResult<Option<SlotMeta>> {
        Ok(self.read_slot(slot, user)?.map(|data| data.meta))
    }

    // ── Internals ──────────────────────────────────────────────

    /// Capture one level. Explicit-key records go to the slot's explicit
    /// list, everything else into the returned set. An entity that fails
    /// to capture keeps its record from `previous`, if it had one.
    fn capture_level<W: HostWorld + ?Sized>(
        &mut self,
        world: &mut W,
        level: &str,
        data: &mut SaveSlot,
        previous: Option<&SnapshotSet>,
    ) -> (SnapshotSet, usize) {
        let mut set = SnapshotSet::default();
        let mut saved = 0;
        for id in world.persistable_entities(level) {
            match extract_record(world, &mut self.resolver, id) {
                Ok(record) if !record.is_valid() => {}
                Ok(record) if record.key.is_explicit() => {
                    data.upsert_explicit(record);
                    saved += 1;
                }
                Ok(record) => {
                    if set.insert(record) {
                        saved += 1;
                    }
                }
                Err(e) => {
                    log::warn!("{level}: {id} not saved ({:?}): {e}", e.category());
                    let kept = self
                        .resolver
                        .peek(&*world, id)
                        .ok()
                        .flatten()
                        .and_then(|key| previous.and_then(|p| p.find(&key)));
                    if let Some(record) = kept {
                        log::debug!("{level}: {id} keeps its previous record {}", record.key);
                        set.insert(record.clone());
                    }
                }
            }
        }
        (set, saved)
    }

    /// The entity's explicit key, or an identity failure.
    fn explicit_key<W: HostWorld + ?Sized>(&self, world: &W, id: EntityId) -> SaveResult<IdentityKey> {
        match self.resolver.peek(world, id)? {
            Some(key @ IdentityKey::Explicit(_)) => Ok(key),
            _ => Err(SaveError::Identity {
                entity: id,
                reason: "global objects need an explicit key".into(),
            }),
        }
    }

    fn read_slot(&self, slot: &str, user: UserIndex) -> SaveResult<Option<SaveSlot>> {
        check_slot_name(slot)?;
        match self.store.read(slot, user)? {
            Some(bytes) => Ok(Some(SaveSlot::from_bytes(&bytes, self.config.max_format_version)?)),
            None => Ok(None),
        }
    }

    fn require_slot(&self, slot: &str, user: UserIndex) -> SaveResult<SaveSlot> {
        self.read_slot(slot, user)?
            .ok_or_else(|| SaveError::SlotNotFound { slot: slot.to_string(), user })
    }

    fn read_or_create(&self, slot: &str, user: UserIndex) -> SaveResult<SaveSlot> {
        match self.read_slot(slot, user)? {
            Some(data) => Ok(data),
            None => {
                log::debug!("slot '{slot}' (user {user}) does not exist, creating it");
                Ok(SaveSlot::new(slot))
            }
        }
    }

    fn write_slot(&mut self, data: &mut SaveSlot, user: UserIndex) -> SaveResult<()> {
        data.touch();
        let bytes = data.to_bytes()?;
        self.store.write(&data.meta.name, user, &bytes)
    }
}

fn check_slot_name(slot: &str) -> SaveResult<()> {
    if slot.trim().is_empty() {
        return Err(SaveError::precondition("slot name is empty"));
    }
    Ok(())
}

fn active_level<W: HostWorld + ?Sized>(world: &W) -> SaveResult<String> {
    world
        .active_level()
        .ok_or_else(|| SaveError::precondition(format!("world '{}' has no active level", world.world_name())))
}

/// Log a failed operation and turn it into `None`.
fn reported<T>(op: &str, slot: &str, result: SaveResult<T>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("{op} on slot '{slot}' failed ({:?}): {e}", e.category());
            None
        }
    }
}
