//! Reconciliation journal: one event per action taken on the live world.
//!
//! RULE: The reconciler reports what it did ONLY through these events.
//! Counters on ReconcileReport are derived from the journal, never kept
//! separately.

use crate::{identity::IdentityKey, types::EntityId};
use serde::{Deserialize, Serialize};

/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconcileEvent {
    /// A live entity was matched to a stored record and restored in place.
    Updated {
        entity: EntityId,
        key:    IdentityKey,
        /// Matched by type + transform instead of by key.
        soft:   bool,
    },
    /// An explicit-key entity was restored from the shared explicit list.
    ExplicitApplied {
        entity: EntityId,
        key:    IdentityKey,
    },
    /// A stored record had no live counterpart and was spawned.
    Respawned {
        entity:    EntityId,
        key:       IdentityKey,
        type_name: String,
    },
    /// The host refused to spawn a stored record.
    SpawnFailed {
        key:       IdentityKey,
        type_name: String,
    },
    /// A live entity was removed: unmatched placed entity, or full rebuild.
    Destroyed {
        entity: EntityId,
        key:    Option<IdentityKey>,
    },
    /// A stored record was kept but its type may not be respawned.
    Retained {
        key:       IdentityKey,
        type_name: String,
    },
    /// A live entity could not be classified and was left as-is.
    Skipped {
        entity: EntityId,
        reason: String,
    },
    /// The record matched but its field stream could not be applied.
    ApplyFailed {
        entity: EntityId,
        key:    IdentityKey,
        reason: String,
    },
}

/// Stable event name, e.g. for log lines and the runner's output.
pub fn event_type_name(event: &ReconcileEvent) -> &'static str {
    match event {
        ReconcileEvent::Updated { .. }         => "updated",
        ReconcileEvent::ExplicitApplied { .. } => "explicit_applied",
        ReconcileEvent::Respawned { .. }       => "respawned",
        ReconcileEvent::SpawnFailed { .. }     => "spawn_failed",
        ReconcileEvent::Destroyed { .. }       => "destroyed",
        ReconcileEvent::Retained { .. }        => "retained",
        ReconcileEvent::Skipped { .. }         => "skipped",
        ReconcileEvent::ApplyFailed { .. }     => "apply_failed",
    }
}
