//! Demo entity types and the courtyard level the runner plays with.

use snapkeep_core::{
    host::{Savable, SavableEntity},
    persist_fields,
    sandbox::{SandboxWorld, TypeRegistry},
    transform::Transform,
};
use std::any::Any;

pub const LEVEL: &str = "Courtyard";

#[derive(Debug, Default)]
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

#[derive(Debug, Default)]
pub struct Crate {
    pub contents: String,
    pub weight:   f64,
}
persist_fields!(Crate { contents: Text, weight: Float });

impl Savable for Crate {
    fn post_load(&mut self) {
        log::debug!("crate restored with '{}'", self.contents);
    }
}

impl SavableEntity for Crate {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

#[derive(Debug, Default)]
pub struct GameMode {
    pub round: i64,
}
persist_fields!(GameMode { round: Int });

impl Savable for GameMode {}

impl SavableEntity for GameMode {
    fn as_any(&self) -> &dyn Any { self }
    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}

pub fn build_world() -> SandboxWorld {
    let mut registry = TypeRegistry::new();
    registry.register::<Door>().register::<Crate>().register::<GameMode>();

    let mut world = SandboxWorld::new("DemoWorld", registry);
    world.add_level(LEVEL);
    let layout = [
        ("Door_1", "Door", Transform::at(0.0, 0.0, 0.0)),
        ("Door_2", "Door", Transform::at(5.0, 0.0, 0.0)),
        ("Crate_1", "Crate", Transform::at(2.0, 1.0, 0.0)),
        ("GM", "GameMode", Transform::IDENTITY),
    ];
    for (name, type_name, transform) in layout {
        world.place(LEVEL, name, type_name, transform);
    }
    world.place_inert(LEVEL, "Fountain", Transform::at(9.0, 9.0, 0.0));
    world
}
