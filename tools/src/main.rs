//! slot-runner: headless driver for the save system.
//!
//! Usage:
//!   slot-runner --db saves.db --slot autosave
//!   slot-runner --seed 12345 --ipc-mode
//!   slot-runner --config save.json --user 1

mod demo;

use anyhow::Result;
use snapkeep_core::{
    config::SaveConfig,
    event::event_type_name,
    host::HostWorld,
    reconcile::{ReconcileMode, ReconcileReport},
    sandbox::SandboxWorld,
    snapshot::SlotMeta,
    store::SqliteSlotStore,
    system::SaveSystem,
    transform::Transform,
    types::{EntityId, UserIndex},
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    SaveLevel,
    LoadLevel {
        #[serde(default)]
        full_rebuild: bool,
    },
    SaveWorld,
    LoadWorld {
        mode: Option<ReconcileMode>,
    },
    Spawn {
        type_name: String,
        #[serde(default)]
        at: [f64; 3],
    },
    Destroy {
        entity: u64,
    },
    ReloadLevel,
    DeleteSave,
    Quit,
}

#[derive(serde::Serialize)]
struct EntityView {
    id:        EntityId,
    type_name: String,
    name:      String,
    origin:    String,
    at:        [f64; 3],
}

#[derive(serde::Serialize)]
struct UiState {
    level:       String,
    entities:    Vec<EntityView>,
    slot:        Option<SlotMeta>,
    last_ok:     bool,
    last_report: Option<ReconcileReport>,
}

struct Session {
    world:       SandboxWorld,
    saves:       SaveSystem<SqliteSlotStore>,
    slot:        String,
    user:        UserIndex,
    last_ok:     bool,
    last_report: Option<ReconcileReport>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let user = parse_arg(&args, "--user", 0u32);
    let seed = args
        .windows(2)
        .find(|w| w[0] == "--seed")
        .and_then(|w| w[1].parse::<u64>().ok());
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let slot = string_arg(&args, "--slot").unwrap_or("autosave");

    let mut config = match string_arg(&args, "--config") {
        Some(path) => SaveConfig::load(path)?,
        None => SaveConfig::default(),
    };
    if seed.is_some() {
        config.key_seed = seed;
    }

    if !ipc_mode {
        println!("slot-runner");
        println!("  db:    {db}");
        println!("  slot:  {slot}");
        println!("  user:  {user}");
        println!("  mode:  {:?}", config.default_mode);
        println!();
    }

    let db_effective = if db == ":memory:" {
        format!("file:slots_{}?mode=memory&cache=shared", chrono::Utc::now().timestamp())
    } else {
        db.to_string()
    };
    let store = SqliteSlotStore::open(&db_effective)?;
    store.migrate()?;

    let mut session = Session {
        world: demo::build_world(),
        saves: SaveSystem::new(config, store),
        slot: slot.to_string(),
        user,
        last_ok: true,
        last_report: None,
    };

    if ipc_mode {
        run_ipc_loop(&mut session)?;
    } else {
        run_demo(&mut session)?;
    }
    Ok(())
}

fn run_ipc_loop(session: &mut Session) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        if matches!(cmd, IpcCommand::Quit) {
            break;
        }
        handle_command(session, cmd);
        let state = build_ui_state(session);
        writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn handle_command(session: &mut Session, cmd: IpcCommand) {
    let Session { world, saves, slot, user, .. } = session;
    let level = world.active_level().unwrap_or_else(|| demo::LEVEL.to_string());

    let (ok, report) = match cmd {
        IpcCommand::GetState | IpcCommand::Quit => (true, None),
        IpcCommand::SaveLevel => (saves.save_level_entities(world, slot, *user), None),
        IpcCommand::LoadLevel { full_rebuild } => {
            let report = saves.load_level_entities(world, slot, *user, full_rebuild);
            (report.is_some(), report)
        }
        IpcCommand::SaveWorld => (saves.save_world(world, slot, *user), None),
        IpcCommand::LoadWorld { mode } => {
            let mode = mode.unwrap_or(saves.config().default_mode);
            (saves.load_world_with(world, slot, *user, mode), None)
        }
        IpcCommand::Spawn { type_name, at } => {
            let [x, y, z] = at;
            let spawned = world.spawn(&level, &type_name, Transform::at(x, y, z));
            if spawned.is_none() {
                log::warn!("cannot spawn '{type_name}'");
            }
            (spawned.is_some(), None)
        }
        IpcCommand::Destroy { entity } => (world.destroy(EntityId(entity)), None),
        IpcCommand::ReloadLevel => {
            world.reload_level(&level);
            (true, None)
        }
        IpcCommand::DeleteSave => (saves.delete_save(slot, *user), None),
    };

    session.last_ok = ok;
    if report.is_some() {
        session.last_report = report;
    }
}

fn build_ui_state(session: &Session) -> UiState {
    let level = session.world.active_level().unwrap_or_default();
    let entities = session
        .world
        .entities_in(&level)
        .into_iter()
        .filter_map(|id| session.world.info(id))
        .map(|info| EntityView {
            id:        info.id,
            type_name: info.type_name,
            name:      info.stable_name,
            origin:    format!("{:?}", info.origin).to_lowercase(),
            at:        info.transform.translation,
        })
        .collect();

    UiState {
        level,
        entities,
        slot: session.saves.slot_meta(&session.slot, session.user),
        last_ok: session.last_ok,
        last_report: session.last_report.clone(),
    }
}

/// Save, mutate the level, simulate a restart, load, and print what the
/// reconciler did.
fn run_demo(session: &mut Session) -> Result<()> {
    let Session { world, saves, slot, user, .. } = session;
    let level = demo::LEVEL;

    if let Some(door) = world.find_by_name(level, "Door_1") {
        if let Some(d) = world.get_mut::<demo::Door>(door) {
            d.open = true;
        }
    }
    if let Some(loot) = world.spawn(level, "Crate", Transform::at(7.0, 7.0, 0.0)) {
        if let Some(c) = world.get_mut::<demo::Crate>(loot) {
            c.contents = "loot".into();
        }
    }
    if let Some(door) = world.find_by_name(level, "Door_2") {
        world.destroy(door);
    }

    saves.try_save_level_entities(world, slot, *user)?;
    world.reload_level(level);
    let report = saves
        .try_load_level_entities(world, slot, *user, false)?
        .ok_or_else(|| anyhow::anyhow!("slot '{slot}' holds no level entities"))?;

    print_summary(world, &report);
    Ok(())
}

fn print_summary(world: &SandboxWorld, report: &ReconcileReport) {
    println!("=== RECONCILE: {} ({:?}) ===", report.level, report.mode);
    println!("  updated:    {}", report.updated());
    println!("  respawned:  {}", report.respawned());
    println!("  destroyed:  {}", report.destroyed());
    println!("  explicit:   {}", report.explicit_applied());
    println!("  failures:   {}", report.failures());
    println!("  fields:     {} applied, {} skipped", report.fields.applied, report.fields.unknown + report.fields.mismatched);

    println!();
    println!("=== EVENTS ===");
    for event in &report.events {
        println!("  {:<16} {}", event_type_name(event), serde_json::to_string(event).unwrap_or_default());
    }

    println!();
    println!("=== LIVE ENTITIES ===");
    for id in world.entities_in(&report.level) {
        if let Some(info) = world.info(id) {
            println!("  {id:<5} {:<10} {:<10} {:?}", info.type_name, info.stable_name, info.origin);
        }
    }
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
