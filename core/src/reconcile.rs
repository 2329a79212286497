//! World reconciliation: align one level's live entities with a stored
//! SnapshotSet.
//!
//! PHASES (incremental mode, fixed order):
//!   1. Match: exact key first, then soft match (type + transform) for
//!      whatever is left. Matched entities are restored in place. A soft
//!      match hands the record key only to an entity that has none.
//!   2. Respawn: stored records nothing matched are spawned and restored.
//!   3. Redestroy: unmatched live *placed* entities are destroyed. Placed
//!      entities come back on every level load, so one that was destroyed
//!      before saving must be destroyed again.
//!   4. Fixed: entities whose type may not be respawned (excluded
//!      singletons, or types the host cannot spawn) match by key only.
//!      They are never destroyed, and their unmatched records are never
//!      spawned.
//!
//! Full-rebuild mode destroys every respawn-eligible live entity and
//! spawns every respawn-eligible record instead of phases 1 to 3.
//!
//! Entities with an explicit key are outside the level phases entirely;
//! they are restored from the slot's explicit list when a record exists.
//!
//! The plan is built in one pass with key-indexed lookups, then each set is
//! executed in its own deterministic order. Nothing is removed from a list
//! while it is being iterated.

use crate::{
    config::SaveConfig,
    event::ReconcileEvent,
    extract::apply_record,
    field::ApplyReport,
    host::{EntityInfo, EntityStatus, HostWorld},
    identity::{soft_match, IdentityKey, IdentityResolver},
    snapshot::{SnapshotRecord, SnapshotSet},
    types::EntityId,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    FullRebuild,
    #[default]
    Incremental,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub entity: EntityId,
    pub key:    IdentityKey,
    pub soft:   bool,
}

/// What reconciliation will do, before anything is done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    /// Live entities restored in place, ascending entity id.
    pub matched:   Vec<Match>,
    /// Explicit-key live entities with a stored explicit record.
    pub explicit:  Vec<(EntityId, IdentityKey)>,
    /// Record keys to spawn: placed records by name, then runtime records
    /// in save order.
    pub respawn:   Vec<IdentityKey>,
    /// Live entities to destroy, ascending entity id.
    pub destroy:   Vec<EntityId>,
    /// Unconsumed records whose type may not be respawned.
    pub retained:  Vec<IdentityKey>,
    /// Live entities left exactly as they are.
    pub untouched: Vec<EntityId>,
    /// Live entities that could not be classified, with the reason.
    pub skipped:   Vec<(EntityId, String)>,
}

/// Result of reconciling one level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub level:  String,
    pub mode:   ReconcileMode,
    pub events: Vec<ReconcileEvent>,
    /// Field-level outcome summed over every restored entity.
    pub fields: ApplyReport,
}

impl ReconcileReport {
    pub fn updated(&self) -> usize {
        self.count(|e| matches!(e, ReconcileEvent::Updated { .. }))
    }

    pub fn soft_matched(&self) -> usize {
        self.count(|e| matches!(e, ReconcileEvent::Updated { soft: true, .. }))
    }

    pub fn respawned(&self) -> usize {
        self.count(|e| matches!(e, ReconcileEvent::Respawned { .. }))
    }

    pub fn destroyed(&self) -> usize {
        self.count(|e| matches!(e, ReconcileEvent::Destroyed { .. }))
    }

    pub fn explicit_applied(&self) -> usize {
        self.count(|e| matches!(e, ReconcileEvent::ExplicitApplied { .. }))
    }

    pub fn failures(&self) -> usize {
        self.count(|e| {
            matches!(
                e,
                ReconcileEvent::SpawnFailed { .. }
                    | ReconcileEvent::ApplyFailed { .. }
                    | ReconcileEvent::Skipped { .. }
            )
        })
    }

    fn count(&self, pred: impl Fn(&ReconcileEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

/// A live entity taking part in the level phases.
struct Candidate {
    info: EntityInfo,
    key:  Option<IdentityKey>,
}

pub struct Reconciler<'a> {
    config: &'a SaveConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a SaveConfig) -> Self {
        Self { config }
    }

    /// Whether records of this type may be spawned and live entities of
    /// this type destroyed.
    pub fn is_respawn_eligible<W: HostWorld + ?Sized>(&self, world: &W, type_name: &str) -> bool {
        !self.config.is_respawn_excluded(type_name) && world.can_spawn(type_name)
    }

    pub fn plan<W: HostWorld + ?Sized>(
        &self,
        world: &W,
        resolver: &IdentityResolver,
        level: &str,
        set: &SnapshotSet,
        explicit: &[SnapshotRecord],
        mode: ReconcileMode,
    ) -> ReconcilePlan {
        let mut plan = ReconcilePlan::default();
        let mut eligible: Vec<Candidate> = Vec::new();
        let mut fixed: Vec<Candidate> = Vec::new();

        for id in world.persistable_entities(level) {
            let Some(info) = world.info(id) else { continue };
            if info.status != EntityStatus::Live {
                plan.untouched.push(id);
                continue;
            }
            let key = match resolver.peek(world, id) {
                Ok(key) => key,
                Err(e) => {
                    plan.skipped.push((id, e.to_string()));
                    continue;
                }
            };
            if let Some(key @ IdentityKey::Explicit(_)) = &key {
                if explicit.iter().any(|r| &r.key == key) {
                    plan.explicit.push((id, key.clone()));
                } else {
                    plan.untouched.push(id);
                }
                continue;
            }
            let candidate = Candidate { info, key };
            if self.is_respawn_eligible(world, &candidate.info.type_name) {
                eligible.push(candidate);
            } else {
                fixed.push(candidate);
            }
        }

        let index: HashMap<&IdentityKey, &SnapshotRecord> = set.records().map(|r| (&r.key, r)).collect();
        let mut consumed: HashSet<IdentityKey> = HashSet::new();

        // Phase 4 runs first in planning so fixed entities claim their own
        // records before anything can soft-match them.
        for candidate in &fixed {
            match candidate.key.as_ref().filter(|k| index.contains_key(k)) {
                Some(key) if consumed.insert(key.clone()) => plan.matched.push(Match {
                    entity: candidate.info.id,
                    key:    key.clone(),
                    soft:   false,
                }),
                _ => plan.untouched.push(candidate.info.id),
            }
        }

        match mode {
            ReconcileMode::FullRebuild => {
                plan.destroy.extend(eligible.iter().map(|c| c.info.id));
            }
            ReconcileMode::Incremental => {
                self.plan_matches(&eligible, set, &index, &mut consumed, &mut plan);
            }
        }

        for record in set.records() {
            if consumed.contains(&record.key) {
                continue;
            }
            if self.is_respawn_eligible(world, &record.type_name) {
                plan.respawn.push(record.key.clone());
            } else {
                plan.retained.push(record.key.clone());
            }
        }

        plan.matched.sort_by_key(|m| m.entity);
        plan.destroy.sort();
        plan.untouched.sort();
        plan
    }

    /// Phases 1 and 3 of incremental mode.
    fn plan_matches(
        &self,
        eligible: &[Candidate],
        set: &SnapshotSet,
        index: &HashMap<&IdentityKey, &SnapshotRecord>,
        consumed: &mut HashSet<IdentityKey>,
        plan: &mut ReconcilePlan,
    ) {
        let mut unmatched: Vec<&Candidate> = Vec::new();
        for candidate in eligible {
            match candidate.key.as_ref().filter(|k| index.contains_key(k)) {
                Some(key) if consumed.insert(key.clone()) => plan.matched.push(Match {
                    entity: candidate.info.id,
                    key:    key.clone(),
                    soft:   false,
                }),
                _ => unmatched.push(candidate),
            }
        }

        for candidate in unmatched {
            let soft = set.records().find(|record| {
                !consumed.contains(&record.key)
                    && soft_match(&candidate.info, record, self.config.soft_match_epsilon)
            });
            if let Some(record) = soft {
                consumed.insert(record.key.clone());
                plan.matched.push(Match {
                    entity: candidate.info.id,
                    key:    record.key.clone(),
                    soft:   true,
                });
                continue;
            }
            match &candidate.key {
                Some(IdentityKey::Placed(_)) => plan.destroy.push(candidate.info.id),
                _ => plan.untouched.push(candidate.info.id),
            }
        }
    }

    /// Carry out `plan` against the live world.
    #[allow(clippy::too_many_arguments)]
    pub fn execute<W: HostWorld + ?Sized>(
        &self,
        world: &mut W,
        resolver: &mut IdentityResolver,
        level: &str,
        set: &SnapshotSet,
        explicit: &[SnapshotRecord],
        mode: ReconcileMode,
        plan: ReconcilePlan,
    ) -> ReconcileReport {
        let mut report = ReconcileReport { level: level.to_string(), mode, ..Default::default() };

        for (entity, reason) in plan.skipped {
            log::warn!("{level}: {entity} left as-is, identity unresolved: {reason}");
            report.events.push(ReconcileEvent::Skipped { entity, reason });
        }

        for m in plan.matched {
            let Some(record) = set.find(&m.key) else { continue };
            // An assigned key never changes: a soft match only names an
            // entity that has no key yet.
            let keyed = m.soft && resolver.peek(&*world, m.entity).ok().flatten().is_some();
            if restore(world, &mut report, m.entity, record) {
                if !keyed {
                    resolver.adopt(m.entity, m.key.clone());
                }
                report.events.push(ReconcileEvent::Updated { entity: m.entity, key: m.key, soft: m.soft });
            }
        }

        for (entity, key) in plan.explicit {
            let Some(record) = explicit.iter().find(|r| r.key == key) else { continue };
            if restore(world, &mut report, entity, record) {
                report.events.push(ReconcileEvent::ExplicitApplied { entity, key });
            }
        }

        match mode {
            ReconcileMode::FullRebuild => {
                self.destroy_all(world, resolver, &mut report, plan.destroy);
                self.respawn_all(world, resolver, &mut report, level, set, plan.respawn);
            }
            ReconcileMode::Incremental => {
                self.respawn_all(world, resolver, &mut report, level, set, plan.respawn);
                self.destroy_all(world, resolver, &mut report, plan.destroy);
            }
        }

        for key in plan.retained {
            let type_name = set.find(&key).map(|r| r.type_name.clone()).unwrap_or_default();
            log::debug!("{level}: {key} ({type_name}) kept in the slot, type is not respawnable");
            report.events.push(ReconcileEvent::Retained { key, type_name });
        }

        log::info!(
            "{level}: reconciled ({:?}) updated={} respawned={} destroyed={} explicit={} failures={}",
            mode,
            report.updated(),
            report.respawned(),
            report.destroyed(),
            report.explicit_applied(),
            report.failures()
        );
        report
    }

    /// Plan and execute in one call.
    pub fn reconcile<W: HostWorld + ?Sized>(
        &self,
        world: &mut W,
        resolver: &mut IdentityResolver,
        level: &str,
        set: &SnapshotSet,
        explicit: &[SnapshotRecord],
        mode: ReconcileMode,
    ) -> ReconcileReport {
        resolver.prune(&*world);
        let plan = self.plan(&*world, resolver, level, set, explicit, mode);
        self.execute(world, resolver, level, set, explicit, mode, plan)
    }

    fn respawn_all<W: HostWorld + ?Sized>(
        &self,
        world: &mut W,
        resolver: &mut IdentityResolver,
        report: &mut ReconcileReport,
        level: &str,
        set: &SnapshotSet,
        keys: Vec<IdentityKey>,
    ) {
        for key in keys {
            let Some(record) = set.find(&key) else { continue };
            let Some(entity) = world.spawn(level, &record.type_name, record.transform) else {
                log::warn!("{level}: could not respawn {key} ({})", record.type_name);
                report.events.push(ReconcileEvent::SpawnFailed {
                    key,
                    type_name: record.type_name.clone(),
                });
                continue;
            };
            resolver.adopt(entity, key.clone());
            restore(world, report, entity, record);
            log::debug!("{level}: respawned {key} as {entity}");
            report.events.push(ReconcileEvent::Respawned {
                entity,
                key,
                type_name: record.type_name.clone(),
            });
        }
    }

    fn destroy_all<W: HostWorld + ?Sized>(
        &self,
        world: &mut W,
        resolver: &mut IdentityResolver,
        report: &mut ReconcileReport,
        entities: Vec<EntityId>,
    ) {
        for entity in entities {
            let key = resolver.peek(&*world, entity).ok().flatten();
            if world.destroy(entity) {
                resolver.forget(entity);
                log::debug!("destroyed {entity}");
                report.events.push(ReconcileEvent::Destroyed { entity, key });
            } else {
                log::warn!("host refused to destroy {entity}");
            }
        }
    }
}

/// Apply one record, journaling a failure. Returns whether it applied.
fn restore<W: HostWorld + ?Sized>(
    world: &mut W,
    report: &mut ReconcileReport,
    entity: EntityId,
    record: &SnapshotRecord,
) -> bool {
    match apply_record(world, entity, record) {
        Ok(fields) => {
            report.fields.merge(fields);
            true
        }
        Err(e) => {
            log::warn!("{entity}: record {} not applied: {e}", record.key);
            report.events.push(ReconcileEvent::ApplyFailed {
                entity,
                key:    record.key.clone(),
                reason: e.to_string(),
            });
            false
        }
    }
}
