//! Shared fixtures: a small set of persistable types and a world builder.
//!
//! Not every test file uses every fixture.
#![allow(dead_code)]

use snapkeep_core::{
    config::SaveConfig,
    host::{Savable, SavableEntity},
    persist_fields,
    sandbox::{SandboxWorld, TypeRegistry},
    store::MemorySlotStore,
    system::SaveSystem,
    transform::Transform,
};
use std::any::Any;

pub const LEVEL: &str = "Courtyard";
pub const SLOT: &str = "slot-a";
pub const USER: u32 = 0;

/// Explicit key used for the player singleton.
pub const PLAYER_KEY: &str = "6f9619ff-8b86-d011-b42d-00c04fc964ff";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ── Entity types ───────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Door {
    pub open:   bool,
    pub health: f64,
}
persist_fields!(Door { open: Bool, health: Float });

impl Savable for Door {}

impl SavableEntity for Door {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

/// Records every hook call, in order. The log itself is not persisted.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Crate {
    pub contents: String,
    pub weight:   f64,
    pub hooks:    Vec<&'static str>,
}
persist_fields!(Crate { contents: Text, weight: Float });

impl Savable for Crate {
    fn pre_save(&mut self)  { self.hooks.push("pre_save"); }
    fn post_save(&mut self) { self.hooks.push("post_save"); }
    fn post_load(&mut self) { self.hooks.push("post_load"); }
}

impl SavableEntity for Crate {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Health {
    pub current: f64,
    pub max:     f64,
    pub loaded:  bool,
}
persist_fields!(Health { current: Float, max: Float });

impl Savable for Health {
    fn post_load(&mut self) { self.loaded = true; }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Inventory {
    pub gold:  i64,
    pub items: String,
}
persist_fields!(Inventory { gold: Int, items: Text });

impl Savable for Inventory {}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Player {
    pub name:      String,
    pub score:     i64,
    pub health:    Health,
    pub inventory: Inventory,
}
persist_fields!(Player { name: Text, score: Int });

impl Savable for Player {}

impl SavableEntity for Player {
    fn components(&self) -> Vec<&dyn Savable> {
        vec![&self.health, &self.inventory]
    }

    fn components_mut(&mut self) -> Vec<&mut dyn Savable> {
        vec![&mut self.health, &mut self.inventory]
    }

    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

/// Session singleton; excluded from respawn by the default configuration.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct GameMode {
    pub round: i64,
}
persist_fields!(GameMode { round: Int });

impl Savable for GameMode {}

impl SavableEntity for GameMode {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

/// Placed-only type: the host cannot spawn it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Beacon {
    pub lit: bool,
}
persist_fields!(Beacon { lit: Bool });

impl Savable for Beacon {}

impl SavableEntity for Beacon {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

/// World-less object saved by name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Settings {
    pub volume:     f64,
    pub difficulty: String,
    pub loaded:     bool,
}
persist_fields!(Settings { volume: Float, difficulty: Text });

impl Savable for Settings {
    fn post_load(&mut self) { self.loaded = true; }
}

// ── Builders ───────────────────────────────────────────────────

pub fn registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .register::<Door>()
        .register::<Crate>()
        .register::<Player>()
        .register::<GameMode>()
        .register_fixed::<Beacon>();
    registry
}

/// An empty world with the single level `LEVEL`.
pub fn empty_world() -> SandboxWorld {
    let mut world = SandboxWorld::new("Overworld", registry());
    world.add_level(LEVEL);
    world
}

/// `LEVEL` with two doors, one crate and one non-persistable mesh.
pub fn courtyard() -> SandboxWorld {
    let mut world = empty_world();
    world.place(LEVEL, "Door_1", "Door", Transform::at(0.0, 0.0, 0.0)).expect("place Door_1");
    world.place(LEVEL, "Door_2", "Door", Transform::at(5.0, 0.0, 0.0)).expect("place Door_2");
    world.place(LEVEL, "Crate_1", "Crate", Transform::at(2.0, 1.0, 0.0)).expect("place Crate_1");
    world.place_inert(LEVEL, "Fountain", Transform::at(9.0, 9.0, 0.0)).expect("place Fountain");
    world
}

pub fn system() -> SaveSystem<MemorySlotStore> {
    init_logging();
    SaveSystem::new(SaveConfig::default_test(), MemorySlotStore::new())
}

pub fn id_of(world: &SandboxWorld, name: &str) -> snapkeep_core::EntityId {
    world.find_by_name(LEVEL, name).unwrap_or_else(|| panic!("{name} should be live"))
}
