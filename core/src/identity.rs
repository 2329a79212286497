//! Identity resolution: which stored record a live entity corresponds to.
//!
//! Three identity kinds, checked in this order:
//!   1. Explicit: a GUID attached to the entity by configuration
//!      (singletons such as the player avatar). Never generated here.
//!   2. Runtime: entities created while the simulation ran. A key is
//!      generated the first time one is classified and kept for the
//!      lifetime of the entity.
//!   3. Placed: the authoring-time stable name.
//!
//! Keys live in association tables owned by the resolver, not on the
//! entities themselves.

use crate::{
    error::{SaveError, SaveResult},
    host::{EntityInfo, EntityOrigin, HostWorld},
    snapshot::SnapshotRecord,
    types::EntityId,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use uuid::Uuid;

pub use crate::keygen::KeyGenerator;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "key", rename_all = "snake_case")]
pub enum IdentityKey {
    Placed(String),
    Runtime(Uuid),
    Explicit(Uuid),
}

/// An empty placed name: the "no identity" key of an invalid record.
impl Default for IdentityKey {
    fn default() -> Self {
        Self::Placed(String::new())
    }
}

impl IdentityKey {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Placed(name) => name.is_empty(),
            Self::Runtime(key) | Self::Explicit(key) => key.is_nil(),
        }
    }

    pub fn is_placed(&self) -> bool {
        matches!(self, Self::Placed(_))
    }

    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Runtime(_))
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Explicit(_))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placed(name)  => write!(f, "placed:{name}"),
            Self::Runtime(key)  => write!(f, "runtime:{key}"),
            Self::Explicit(key) => write!(f, "explicit:{key}"),
        }
    }
}

/// Parse a configured explicit key. Empty, malformed and nil GUIDs are all
/// rejected.
pub fn parse_explicit_key(text: &str) -> Option<Uuid> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Uuid::parse_str(text).ok().filter(|key| !key.is_nil())
}

/// Fallback match when no stored key matches: same type descriptor and a
/// transform equal within `epsilon`. Never preferred over a key match.
pub fn soft_match(info: &EntityInfo, record: &SnapshotRecord, epsilon: f64) -> bool {
    info.type_name == record.type_name && info.transform.approx_eq(&record.transform, epsilon)
}

pub struct IdentityResolver {
    /// Explicit keys exactly as configured; validated on classification.
    explicit: HashMap<EntityId, String>,
    /// Runtime keys generated here, and keys adopted from restored records.
    assigned: HashMap<EntityId, IdentityKey>,
    keys:     KeyGenerator,
}

impl IdentityResolver {
    pub fn new(keys: KeyGenerator) -> Self {
        Self { explicit: HashMap::new(), assigned: HashMap::new(), keys }
    }

    /// Attach a configured explicit key to an entity. The text is kept as
    /// given; an invalid key makes classification of that entity fail.
    pub fn attach_explicit(&mut self, id: EntityId, key: &str) {
        self.explicit.insert(id, key.to_string());
    }

    pub fn detach_explicit(&mut self, id: EntityId) {
        self.explicit.remove(&id);
    }

    pub fn has_explicit(&self, id: EntityId) -> bool {
        self.explicit.contains_key(&id)
    }

    /// The key currently recorded for `id`, if any (explicit keys excluded).
    pub fn assigned_key(&self, id: EntityId) -> Option<&IdentityKey> {
        self.assigned.get(&id)
    }

    /// Record `key` as the identity of `id`, e.g. after respawning it from a
    /// stored record. Explicit keys go through `attach_explicit` instead.
    pub fn adopt(&mut self, id: EntityId, key: IdentityKey) {
        match key {
            IdentityKey::Explicit(key) => {
                self.explicit.insert(id, key.to_string());
            }
            other => {
                self.assigned.insert(id, other);
            }
        }
    }

    /// Drop everything known about `id`. Call when the entity is destroyed.
    pub fn forget(&mut self, id: EntityId) {
        self.explicit.remove(&id);
        self.assigned.remove(&id);
    }

    /// Drop associations for entities the world no longer has. Returns how
    /// many ids were dropped.
    pub fn prune<W: HostWorld + ?Sized>(&mut self, world: &W) -> usize {
        let before = self.explicit.len() + self.assigned.len();
        self.explicit.retain(|id, _| world.info(*id).is_some());
        self.assigned.retain(|id, _| world.info(*id).is_some());
        let dropped = before - self.explicit.len() - self.assigned.len();
        if dropped > 0 {
            log::debug!("pruned {dropped} stale identity association(s)");
        }
        dropped
    }

    /// Classify `id`, generating a runtime key when it has none yet.
    pub fn classify<W: HostWorld + ?Sized>(&mut self, world: &W, id: EntityId) -> SaveResult<IdentityKey> {
        if let Some(key) = self.peek(world, id)? {
            return Ok(key);
        }
        let key = IdentityKey::Runtime(self.keys.next_key());
        log::debug!("{id}: assigned {key}");
        self.assigned.insert(id, key.clone());
        Ok(key)
    }

    /// Classify without side effects. `Ok(None)` means a runtime entity
    /// that has not been given a key yet.
    pub fn peek<W: HostWorld + ?Sized>(&self, world: &W, id: EntityId) -> SaveResult<Option<IdentityKey>> {
        if let Some(text) = self.explicit.get(&id) {
            return parse_explicit_key(text)
                .map(|key| Some(IdentityKey::Explicit(key)))
                .ok_or_else(|| SaveError::Identity {
                    entity: id,
                    reason: format!("explicit key '{text}' is empty or not a valid GUID"),
                });
        }

        let info = world
            .info(id)
            .ok_or_else(|| SaveError::precondition(format!("entity {id} is not in the world")))?;

        if let Some(key) = self.assigned.get(&id) {
            return Ok(Some(key.clone()));
        }

        match info.origin {
            EntityOrigin::Runtime => Ok(None),
            EntityOrigin::Placed if info.stable_name.is_empty() => Err(SaveError::Identity {
                entity: id,
                reason: "placed entity has no stable name".into(),
            }),
            EntityOrigin::Placed => Ok(Some(IdentityKey::Placed(info.stable_name))),
        }
    }
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self::new(KeyGenerator::default())
    }
}
