//! Single entities and world-less objects: capture, restore, hooks and
//! the entities that are never captured.

mod common;

use common::*;
use snapkeep_core::{
    error::FailureCategory,
    extract::{apply_record, extract_record},
    host::{HostWorld, SlotStore},
    identity::{IdentityKey, IdentityResolver},
    snapshot::{SaveSlot, SLOT_FORMAT_VERSION},
    store::MemorySlotStore,
    system::SaveSystem,
    transform::Transform,
};

/// Replace the stored data of one flat-scope record with bytes that do not
/// decode.
fn corrupt_stored_record(saves: &mut SaveSystem<MemorySlotStore>, key: &IdentityKey) {
    let bytes = saves.store().read(SLOT, USER).expect("read").expect("slot exists");
    let mut slot = SaveSlot::from_bytes(&bytes, SLOT_FORMAT_VERSION).expect("decode");
    let set = slot.level_entities.as_mut().expect("flat set");
    let mut record = set.find(key).expect("stored record").clone();
    record.data = b"{ truncated".to_vec();
    set.insert(record);
    let bytes = slot.to_bytes().expect("encode");
    saves.store_mut().write(SLOT, USER, &bytes).expect("write");
}

#[test]
fn entity_with_components_round_trips() {
    let mut world = empty_world();
    let mut saves = system();
    let hero = world.place(LEVEL, "Hero", "Player", Transform::at(1.0, 2.0, 3.0)).expect("place");
    {
        let player = world.get_mut::<Player>(hero).expect("player");
        player.name = "Ada".into();
        player.score = 1200;
        player.health.current = 12.5;
        player.health.max = 80.0;
        player.inventory.gold = 31;
    }
    assert!(saves.save_entity(&mut world, hero, SLOT, USER));

    *world.get_mut::<Player>(hero).expect("player") = Player::default();
    assert!(world.set_transform(hero, Transform::at(-4.0, 0.0, 0.0)));

    assert_eq!(saves.load_entity(&mut world, hero, SLOT, USER, false), Some(hero));
    let player = world.get::<Player>(hero).expect("player");
    assert_eq!(player.name, "Ada");
    assert_eq!(player.score, 1200);
    assert_eq!(player.health.current, 12.5);
    assert_eq!(player.health.max, 80.0);
    assert_eq!(player.inventory.gold, 31);
    assert!(player.health.loaded);
    let transform = world.info(hero).expect("info").transform;
    assert!(transform.approx_eq(&Transform::at(1.0, 2.0, 3.0), 1e-9));
}

#[test]
fn full_rebuild_load_replaces_the_entity() {
    let mut world = courtyard();
    let mut saves = system();
    let door = id_of(&world, "Door_1");
    world.get_mut::<Door>(door).expect("door").health = 33.0;
    assert!(saves.save_entity(&mut world, door, SLOT, USER));

    let replacement = saves.load_entity(&mut world, door, SLOT, USER, true).expect("replacement");
    assert_ne!(replacement, door);
    assert!(!world.contains(door), "the old entity is destroyed");
    assert_eq!(world.get::<Door>(replacement).expect("door").health, 33.0);

    // The replacement answers to the same record from now on.
    world.get_mut::<Door>(replacement).expect("door").health = 1.0;
    assert_eq!(saves.load_entity(&mut world, replacement, SLOT, USER, false), Some(replacement));
    assert_eq!(world.get::<Door>(replacement).expect("door").health, 33.0);
}

#[test]
fn failed_full_rebuild_load_keeps_the_live_entity() {
    let mut world = courtyard();
    let mut saves = system();
    let door = id_of(&world, "Door_1");
    assert!(saves.save_entity(&mut world, door, SLOT, USER));
    world.get_mut::<Door>(door).expect("door").health = 5.0;
    let doors = world.of_type(LEVEL, "Door");

    corrupt_stored_record(&mut saves, &IdentityKey::Placed("Door_1".into()));
    let err = saves.try_load_entity(&mut world, door, SLOT, USER, true).expect_err("undecodable record");
    assert_eq!(err.category(), FailureCategory::SchemaDrift);
    assert_eq!(world.of_type(LEVEL, "Door"), doors, "no replacement is left behind");
    assert_eq!(world.get::<Door>(door).expect("original still live").health, 5.0);

    assert!(saves.save_entity(&mut world, door, SLOT, USER));
    world.refuse_spawns_of("Door");
    assert_eq!(saves.load_entity(&mut world, door, SLOT, USER, true), None);
    assert_eq!(world.of_type(LEVEL, "Door"), doors, "a refused spawn destroys nothing");
}

#[test]
fn non_finite_field_fails_only_that_entity() {
    let mut world = courtyard();
    let mut saves = system();
    let door = id_of(&world, "Door_1");
    {
        let d = world.get_mut::<Door>(door).expect("door");
        d.open = true;
        d.health = 50.0;
    }
    assert!(saves.save_level_entities(&mut world, SLOT, USER));

    world.get_mut::<Door>(door).expect("door").health = f64::INFINITY;
    let err = saves.try_save_entity(&mut world, door, SLOT, USER).expect_err("infinite health");
    assert_eq!(err.category(), FailureCategory::PreconditionFailure);
    let saved = saves.try_save_level_entities(&mut world, SLOT, USER).expect("siblings still save");
    assert_eq!(saved, 2, "Door_2 and Crate_1");

    world.reload_level(LEVEL);
    let report = saves.load_level_entities(&mut world, SLOT, USER, false).expect("stored set");
    assert_eq!(report.failures(), 0);
    assert_eq!(report.destroyed(), 0, "Door_1 keeps its earlier record");
    let restored = world.get::<Door>(id_of(&world, "Door_1")).expect("door");
    assert!(restored.open);
    assert_eq!(restored.health, 50.0);
}

#[test]
fn non_finite_transform_never_reaches_the_slot() {
    let mut world = courtyard();
    let mut saves = system();
    let stray = world.spawn_runtime(LEVEL, "Crate", Transform::at(f64::NAN, 0.0, 0.0)).expect("spawn");

    assert!(saves.save_level_entities(&mut world, SLOT, USER), "siblings are saved");
    let err = saves.try_save_entity(&mut world, stray, SLOT, USER).expect_err("NaN transform");
    assert_eq!(err.category(), FailureCategory::PreconditionFailure);

    world.reload_level(LEVEL);
    let report = saves
        .try_load_level_entities(&mut world, SLOT, USER, false)
        .expect("slot stays readable")
        .expect("stored set");
    assert_eq!(report.updated(), 3);
    assert_eq!(report.respawned(), 0);
    assert!(saves.save_level_entities(&mut world, SLOT, USER), "later saves still work");
}

#[test]
fn loading_an_unsaved_entity_finds_nothing() {
    let mut world = courtyard();
    let mut saves = system();
    let door_1 = id_of(&world, "Door_1");
    let door_2 = id_of(&world, "Door_2");
    assert!(saves.save_entity(&mut world, door_1, SLOT, USER));

    assert_eq!(saves.load_entity(&mut world, door_2, SLOT, USER, false), None);
    let fresh = world.spawn_runtime(LEVEL, "Door", Transform::IDENTITY).expect("spawn");
    assert_eq!(saves.load_entity(&mut world, fresh, SLOT, USER, true), None);
    assert!(world.contains(fresh), "no record, so no rebuild");
}

#[test]
fn hooks_run_around_capture_and_restore() {
    let mut world = courtyard();
    let mut saves = system();
    let crate_id = id_of(&world, "Crate_1");
    world.get_mut::<Crate>(crate_id).expect("crate").contents = "apples".into();

    assert!(saves.save_entity(&mut world, crate_id, SLOT, USER));
    assert_eq!(world.get::<Crate>(crate_id).expect("crate").hooks, vec!["pre_save", "post_save"]);

    world.get_mut::<Crate>(crate_id).expect("crate").contents.clear();
    assert!(saves.load_entity(&mut world, crate_id, SLOT, USER, false).is_some());
    let restored = world.get::<Crate>(crate_id).expect("crate");
    assert_eq!(restored.contents, "apples");
    assert_eq!(restored.hooks, vec!["pre_save", "post_save", "post_load"]);
}

#[test]
fn prototypes_and_dying_entities_are_never_captured() {
    let mut world = courtyard();
    let mut saves = system();
    assert!(world.mark_prototype(id_of(&world, "Door_1")));
    assert!(world.mark_pending_destroy(id_of(&world, "Door_2")));

    let (prototype, dying) = (id_of(&world, "Door_1"), id_of(&world, "Door_2"));

    let mut resolver = IdentityResolver::default();
    let record = extract_record(&mut world, &mut resolver, prototype).expect("no error");
    assert!(!record.is_valid());

    let err = saves.try_save_entity(&mut world, dying, SLOT, USER).expect_err("dying");
    assert_eq!(err.category(), FailureCategory::PreconditionFailure);

    let saved = saves.try_save_level_entities(&mut world, SLOT, USER).expect("save");
    assert_eq!(saved, 1, "only Crate_1");
}

#[test]
fn undecodable_record_leaves_the_entity_untouched() {
    let mut world = courtyard();
    let mut resolver = IdentityResolver::default();
    let door = id_of(&world, "Door_1");
    world.get_mut::<Door>(door).expect("door").health = 70.0;
    let mut record = extract_record(&mut world, &mut resolver, door).expect("extract");
    record.data = b"{ truncated".to_vec();
    record.transform = Transform::at(30.0, 0.0, 0.0);

    let err = apply_record(&mut world, door, &record).expect_err("codec error");
    assert_eq!(err.category(), FailureCategory::SchemaDrift);
    assert_eq!(world.get::<Door>(door).expect("door").health, 70.0);
    assert!(world.info(door).expect("info").transform.approx_eq(&Transform::IDENTITY, 1e-9));
}

#[test]
fn objects_round_trip_by_name() {
    let mut saves = system();
    let mut settings = Settings { volume: 0.4, difficulty: "hard".into(), loaded: false };
    assert!(saves.save_object("settings", &mut settings, SLOT, USER));
    settings.volume = 0.9;
    assert!(saves.save_object("settings", &mut settings, SLOT, USER));

    let mut fresh = Settings::default();
    assert!(saves.load_object("settings", &mut fresh, SLOT, USER));
    assert_eq!(fresh.volume, 0.9, "last write wins");
    assert_eq!(fresh.difficulty, "hard");
    assert!(fresh.loaded);

    let mut other = Settings::default();
    assert!(!saves.load_object("keybinds", &mut other, SLOT, USER));
    assert!(!other.loaded, "not found is a no-op");
    assert!(!saves.save_object("", &mut other, SLOT, USER));
}
