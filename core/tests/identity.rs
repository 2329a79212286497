//! Identity keys: runtime key stability, explicit-key singletons and the
//! global-object path.

mod common;

use common::*;
use snapkeep_core::{
    error::FailureCategory,
    host::{HostWorld, SlotStore},
    identity::IdentityKey,
    snapshot::{SaveSlot, SLOT_FORMAT_VERSION},
    transform::Transform,
};

fn place_hero(world: &mut snapkeep_core::sandbox::SandboxWorld) -> snapkeep_core::EntityId {
    let hero = world.place(LEVEL, "Hero", "Player", Transform::at(1.0, 2.0, 3.0)).expect("place hero");
    let player = world.get_mut::<Player>(hero).expect("player");
    player.name = "Ada".into();
    player.score = 42;
    player.health = Health { current: 55.0, max: 100.0, loaded: false };
    player.inventory = Inventory { gold: 9, items: "rope,lamp".into() };
    hero
}

#[test]
fn runtime_key_is_generated_once_and_kept() {
    let mut world = empty_world();
    let mut saves = system();
    let crate_id = world.spawn_runtime(LEVEL, "Crate", Transform::at(4.0, 0.0, 0.0)).expect("spawn");

    let first = saves.try_save_entity(&mut world, crate_id, SLOT, USER).expect("first save");
    let second = saves.try_save_entity(&mut world, crate_id, SLOT, USER).expect("second save");

    assert!(first.is_runtime());
    assert!(!first.is_empty());
    assert_eq!(first, second, "saving twice must not regenerate the key");
}

#[test]
fn level_saves_keep_runtime_keys_stable() {
    let mut world = courtyard();
    let mut saves = system();
    world.spawn_runtime(LEVEL, "Crate", Transform::at(7.0, 7.0, 0.0)).expect("spawn");

    let read_keys = |saves: &snapkeep_core::SaveSystem<snapkeep_core::store::MemorySlotStore>| {
        let bytes = saves.store().read(SLOT, USER).expect("read").expect("slot");
        let slot = SaveSlot::from_bytes(&bytes, SLOT_FORMAT_VERSION).expect("decode");
        slot.level_entities.expect("flat set").runtime.into_iter().map(|r| r.key).collect::<Vec<_>>()
    };

    assert!(saves.save_level_entities(&mut world, SLOT, USER));
    let first = read_keys(&saves);
    assert!(saves.save_level_entities(&mut world, SLOT, USER));
    let second = read_keys(&saves);

    assert_eq!(first.len(), 1);
    assert_eq!(first, second);
}

#[test]
fn explicit_entity_is_restored_through_the_shared_list() {
    let mut world = courtyard();
    let mut saves = system();
    let hero = place_hero(&mut world);
    saves.resolver_mut().attach_explicit(hero, PLAYER_KEY);

    let saved = saves.try_save_level_entities(&mut world, SLOT, USER).expect("save");
    assert_eq!(saved, 4);

    let bytes = saves.store().read(SLOT, USER).expect("read").expect("slot");
    let slot = SaveSlot::from_bytes(&bytes, SLOT_FORMAT_VERSION).expect("decode");
    assert_eq!(slot.explicit.len(), 1, "the hero goes to the explicit list");
    assert!(slot.level_entities.expect("flat set").find(&IdentityKey::Placed("Hero".into())).is_none());

    // After a restart the host re-attaches the configured key.
    world.reload_level(LEVEL);
    let hero = world.find_by_name(LEVEL, "Hero").expect("hero re-created");
    saves.resolver_mut().attach_explicit(hero, PLAYER_KEY);

    let report = saves.load_level_entities(&mut world, SLOT, USER, false).expect("stored set");
    assert_eq!(report.explicit_applied(), 1);
    assert_eq!(report.destroyed(), 0);

    let player = world.get::<Player>(hero).expect("player");
    assert_eq!(player.name, "Ada");
    assert_eq!(player.score, 42);
    assert_eq!(player.health.current, 55.0);
    assert!(player.health.loaded, "component post_load ran");
    assert_eq!(player.inventory.gold, 9);
    assert_eq!(player.inventory.items, "rope,lamp");
}

#[test]
fn invalid_explicit_key_fails_only_that_entity() {
    let mut world = courtyard();
    let mut saves = system();
    let door = id_of(&world, "Door_1");
    saves.resolver_mut().attach_explicit(door, "not-a-guid");

    let saved = saves.try_save_level_entities(&mut world, SLOT, USER).expect("siblings still save");
    assert_eq!(saved, 2, "Door_2 and Crate_1");

    let err = saves.try_save_entity(&mut world, door, SLOT, USER).expect_err("no usable identity");
    assert_eq!(err.category(), FailureCategory::IdentityFailure);
    assert!(!saves.save_global(&mut world, door, SLOT, USER));

    saves.resolver_mut().attach_explicit(door, "");
    let err = saves.try_save_global(&mut world, door, SLOT, USER).expect_err("empty key");
    assert_eq!(err.category(), FailureCategory::IdentityFailure);
}

#[test]
fn global_save_is_last_write_wins() {
    let mut world = empty_world();
    let mut saves = system();
    let hero = place_hero(&mut world);
    saves.resolver_mut().attach_explicit(hero, PLAYER_KEY);

    assert!(saves.save_global(&mut world, hero, SLOT, USER));
    world.get_mut::<Player>(hero).expect("player").score = 99;
    assert!(saves.save_global(&mut world, hero, SLOT, USER));

    world.get_mut::<Player>(hero).expect("player").score = 0;
    assert!(world.set_transform(hero, Transform::at(50.0, 0.0, 0.0)));
    assert!(saves.load_global(&mut world, hero, SLOT, USER));

    assert_eq!(world.get::<Player>(hero).expect("player").score, 99, "newest record wins");
    let transform = world.info(hero).expect("info").transform;
    assert!(transform.approx_eq(&Transform::at(1.0, 2.0, 3.0), 1e-9));

    let bytes = saves.store().read(SLOT, USER).expect("read").expect("slot");
    let slot = SaveSlot::from_bytes(&bytes, SLOT_FORMAT_VERSION).expect("decode");
    assert_eq!(slot.explicit.len(), 1, "replaced, not appended");
}

#[test]
fn global_load_without_record_is_a_no_op() {
    let mut world = empty_world();
    let mut saves = system();
    let hero = place_hero(&mut world);
    saves.resolver_mut().attach_explicit(hero, PLAYER_KEY);
    assert!(saves.save_global(&mut world, hero, SLOT, USER));

    let twin = world.spawn_runtime(LEVEL, "Player", Transform::IDENTITY).expect("spawn");
    world.get_mut::<Player>(twin).expect("player").score = 7;
    saves.resolver_mut().attach_explicit(twin, "0b1d8f6e-3c4a-4f2e-9a51-7d2c6e8f0a13");

    assert!(!saves.load_global(&mut world, twin, SLOT, USER));
    assert!(!saves.try_load_global(&mut world, twin, SLOT, USER).expect("not an error"));
    assert_eq!(world.get::<Player>(twin).expect("player").score, 7, "left untouched");
}

#[test]
fn global_path_requires_an_explicit_key() {
    let mut world = courtyard();
    let mut saves = system();
    let door = id_of(&world, "Door_1");

    assert!(!saves.save_global(&mut world, door, SLOT, USER));
    assert!(!saves.load_global(&mut world, door, SLOT, USER));
    let err = saves.try_save_global(&mut world, door, SLOT, USER).expect_err("placed entity");
    assert_eq!(err.category(), FailureCategory::IdentityFailure);
    assert!(!saves.store().exists(SLOT, USER).expect("exists"), "nothing written");
}
