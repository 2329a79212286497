//! Snapshot extraction and restoration for single entities and objects.
//!
//! ORDER (fixed, part of the stored format):
//!   extract: identity -> pre_save hooks -> entity fields -> component
//!            fields in components() order -> post_save hooks
//!   apply:   decode -> transform -> entity fields -> component fields in
//!            components_mut() order -> post_load hooks
//!
//! Prototype and pending-destroy entities are never captured; they yield
//! an empty record, which `SnapshotRecord::is_valid` rejects.
//!
//! A non-finite transform or field value fails extraction for that entity.
//! Post-save hooks still run.

use crate::{
    error::{SaveError, SaveResult},
    field::{self, ApplyReport, FieldReader, FieldWriter},
    host::{EntityStatus, HostWorld, Savable},
    identity::IdentityResolver,
    snapshot::{ObjectRecord, SnapshotRecord},
    types::EntityId,
};

fn not_persistable(id: EntityId) -> SaveError {
    SaveError::precondition(format!("entity {id} is missing or not persistable"))
}

/// Build the record for one live entity.
pub fn extract_record<W: HostWorld + ?Sized>(
    world: &mut W,
    resolver: &mut IdentityResolver,
    id: EntityId,
) -> SaveResult<SnapshotRecord> {
    let info = world.info(id).ok_or_else(|| not_persistable(id))?;
    if info.status != EntityStatus::Live {
        log::debug!("{id} ({}) not captured: {:?}", info.type_name, info.status);
        return Ok(SnapshotRecord::default());
    }

    let key = resolver.classify(&*world, id)?;

    let entity = world.entity_mut(id).ok_or_else(|| not_persistable(id))?;
    entity.pre_save();
    for component in entity.components_mut() {
        component.pre_save();
    }

    let mut writer = FieldWriter::new();
    writer.write(&*entity);
    for component in entity.components() {
        writer.write(component);
    }
    let data = writer.finish();

    entity.post_save();
    for component in entity.components_mut() {
        component.post_save();
    }
    let data = data?;

    // Hooks may have moved the entity; capture the transform afterwards.
    let info = world.info(id).ok_or_else(|| not_persistable(id))?;
    if !info.transform.is_finite() {
        return Err(SaveError::precondition(format!("{id} has a non-finite transform")));
    }
    log::debug!("{id}: captured {key} ({}, {} bytes)", info.type_name, data.len());
    Ok(SnapshotRecord { key, type_name: info.type_name, transform: info.transform, data })
}

/// Restore `record` onto a live entity. A stream that cannot be decoded
/// leaves the entity untouched.
pub fn apply_record<W: HostWorld + ?Sized>(
    world: &mut W,
    id: EntityId,
    record: &SnapshotRecord,
) -> SaveResult<ApplyReport> {
    let mut reader = FieldReader::open(&record.data)?;

    if !world.set_transform(id, record.transform) {
        return Err(not_persistable(id));
    }
    let entity = world.entity_mut(id).ok_or_else(|| not_persistable(id))?;

    let mut report = reader.read_into(&mut *entity);
    for component in entity.components_mut() {
        report.merge(reader.read_into(component));
    }
    if reader.remaining() > 0 {
        log::debug!(
            "{id}: {} stored component section(s) had no matching component",
            reader.remaining()
        );
    }

    entity.post_load();
    for component in entity.components_mut() {
        component.post_load();
    }

    log::debug!(
        "{id}: restored {} ({} applied, {} unknown, {} mismatched, {} missing)",
        record.key,
        report.applied,
        report.unknown,
        report.mismatched,
        report.missing
    );
    Ok(report)
}

/// Build the record for a world-less object.
pub fn extract_object<T: Savable + ?Sized>(name: &str, object: &mut T) -> SaveResult<ObjectRecord> {
    object.pre_save();
    let data = field::extract(&*object);
    object.post_save();
    Ok(ObjectRecord {
        name:      name.to_string(),
        type_name: object.type_name().to_string(),
        data:      data?,
    })
}

pub fn apply_object<T: Savable + ?Sized>(object: &mut T, record: &ObjectRecord) -> SaveResult<ApplyReport> {
    let report = field::apply(&mut *object, &record.data)?;
    object.post_load();
    Ok(report)
}
