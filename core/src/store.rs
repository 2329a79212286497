//! Slot persistence backends.
//!
//! RULE: Only store.rs talks to the database.
//! The save system hands over whole encoded slots; it never executes SQL.

use crate::{
    error::SaveResult,
    host::SlotStore,
    types::UserIndex,
};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS save_slot (
    slot_name  TEXT    NOT NULL,
    user_index INTEGER NOT NULL,
    payload    BLOB    NOT NULL,
    updated_at TEXT    NOT NULL,
    PRIMARY KEY (slot_name, user_index)
);
";

pub struct SqliteSlotStore {
    conn: Connection,
}

impl SqliteSlotStore {
    /// Open (or create) the slot database at `path`. URIs are accepted, so
    /// `file:name?mode=memory&cache=shared` works.
    pub fn open(path: &str) -> SaveResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode: better concurrent read performance. Memory databases
        // cannot use it.
        if !is_memory_path(path) {
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        }
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SaveResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> SaveResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Slot names stored for `user`, sorted.
    pub fn slot_names(&self, user: UserIndex) -> SaveResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT slot_name FROM save_slot WHERE user_index = ?1 ORDER BY slot_name ASC",
        )?;
        let names = stmt
            .query_map(params![user as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

impl SlotStore for SqliteSlotStore {
    fn exists(&self, slot: &str, user: UserIndex) -> SaveResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM save_slot WHERE slot_name = ?1 AND user_index = ?2",
                params![slot, user as i64],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn write(&mut self, slot: &str, user: UserIndex, bytes: &[u8]) -> SaveResult<()> {
        self.conn.execute(
            "INSERT INTO save_slot (slot_name, user_index, payload, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (slot_name, user_index)
             DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![slot, user as i64, bytes, Utc::now().to_rfc3339()],
        )?;
        log::trace!("slot '{slot}' (user {user}): wrote {} bytes", bytes.len());
        Ok(())
    }

    fn read(&self, slot: &str, user: UserIndex) -> SaveResult<Option<Vec<u8>>> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM save_slot WHERE slot_name = ?1 AND user_index = ?2",
                params![slot, user as i64],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn delete(&mut self, slot: &str, user: UserIndex) -> SaveResult<bool> {
        let rows = self.conn.execute(
            "DELETE FROM save_slot WHERE slot_name = ?1 AND user_index = ?2",
            params![slot, user as i64],
        )?;
        Ok(rows > 0)
    }
}

fn is_memory_path(path: &str) -> bool {
    path == ":memory:" || (path.starts_with("file:") && path.contains("mode=memory"))
}

/// Process-local store. Nothing survives the process.
#[derive(Debug, Default, Clone)]
pub struct MemorySlotStore {
    slots: HashMap<(String, UserIndex), Vec<u8>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl SlotStore for MemorySlotStore {
    fn exists(&self, slot: &str, user: UserIndex) -> SaveResult<bool> {
        Ok(self.slots.contains_key(&(slot.to_string(), user)))
    }

    fn write(&mut self, slot: &str, user: UserIndex, bytes: &[u8]) -> SaveResult<()> {
        self.slots.insert((slot.to_string(), user), bytes.to_vec());
        Ok(())
    }

    fn read(&self, slot: &str, user: UserIndex) -> SaveResult<Option<Vec<u8>>> {
        Ok(self.slots.get(&(slot.to_string(), user)).cloned())
    }

    fn delete(&mut self, slot: &str, user: UserIndex) -> SaveResult<bool> {
        Ok(self.slots.remove(&(slot.to_string(), user)).is_some())
    }
}
