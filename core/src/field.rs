//! Field codec: persisted fields of an entity or component to/from bytes.
//!
//! RULE: Only fields declared through `PersistFields` are ever written.
//! Undeclared fields are not persisted, there is no reflection fallback.
//!
//! The byte stream is a list of sections, one per owner (the entity first,
//! then each attached component in order). Every entry in a section carries
//! its field name and a kind tag, so fields may be reordered, added or
//! removed between save and load without corrupting the stream:
//!   - names in the stream that the target no longer declares are skipped
//!   - declared names missing from the stream keep their current value
//!   - a stored kind that differs from the declared kind is skipped and
//!     logged, never coerced

use crate::error::{SaveError, SaveResult};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Text,
    Vec3,
    Guid,
    Bytes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Vec3([f64; 3]),
    Guid(Uuid),
    Bytes(Vec<u8>),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Bool(_)  => FieldKind::Bool,
            Self::Int(_)   => FieldKind::Int,
            Self::Float(_) => FieldKind::Float,
            Self::Text(_)  => FieldKind::Text,
            Self::Vec3(_)  => FieldKind::Vec3,
            Self::Guid(_)  => FieldKind::Guid,
            Self::Bytes(_) => FieldKind::Bytes,
        }
    }

    /// False for a float or vector holding NaN or an infinity. The stream
    /// format has no representation for those.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Float(v) => v.is_finite(),
            Self::Vec3(v)  => v.iter().all(|c| c.is_finite()),
            _ => true,
        }
    }
}

macro_rules! field_value_conversions {
    ($($rust:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$rust> for FieldValue {
                fn from(v: $rust) -> Self { FieldValue::$variant(v) }
            }

            /// The error carries the kind actually found.
            impl TryFrom<FieldValue> for $rust {
                type Error = FieldKind;
                fn try_from(v: FieldValue) -> Result<Self, FieldKind> {
                    match v {
                        FieldValue::$variant(inner) => Ok(inner),
                        other => Err(other.kind()),
                    }
                }
            }
        )*
    };
}

field_value_conversions! {
    bool     => Bool,
    i64      => Int,
    f64      => Float,
    String   => Text,
    [f64; 3] => Vec3,
    Uuid     => Guid,
    Vec<u8>  => Bytes,
}

/// One declared persisted field: its name and its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("field '{name}' is not declared")]
    Unknown { name: String },

    #[error("field '{name}' expects {expected:?}, got {found:?}")]
    KindMismatch { name: String, expected: FieldKind, found: FieldKind },
}

/// The declared list of persisted fields of one type.
///
/// Usually generated with [`persist_fields!`](crate::persist_fields).
pub trait PersistFields {
    /// Stable type descriptor, recorded next to the field data.
    fn type_name(&self) -> &'static str;

    /// Persisted fields in declaration order. The order is the write order.
    fn descriptors(&self) -> &'static [FieldDescriptor];

    fn get(&self, name: &str) -> Option<FieldValue>;

    fn set(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError>;
}

/// Implement [`PersistFields`] for a struct from a list of `field: Kind` pairs.
///
/// ```ignore
/// struct Door { open: bool, health: f64, opened_by: String }
/// persist_fields!(Door { open: Bool, health: Float });
/// ```
#[macro_export]
macro_rules! persist_fields {
    ($ty:ident { $($field:ident : $kind:ident),* $(,)? }) => {
        impl $crate::field::PersistFields for $ty {
            fn type_name(&self) -> &'static str {
                stringify!($ty)
            }

            fn descriptors(&self) -> &'static [$crate::field::FieldDescriptor] {
                const FIELDS: &[$crate::field::FieldDescriptor] = &[
                    $($crate::field::FieldDescriptor::new(
                        stringify!($field),
                        $crate::field::FieldKind::$kind,
                    ),)*
                ];
                FIELDS
            }

            fn get(&self, name: &str) -> Option<$crate::field::FieldValue> {
                match name {
                    $(stringify!($field) => Some($crate::field::FieldValue::from(self.$field.clone())),)*
                    _ => None,
                }
            }

            #[allow(unused_variables)]
            fn set(
                &mut self,
                name: &str,
                value: $crate::field::FieldValue,
            ) -> Result<(), $crate::field::FieldError> {
                match name {
                    $(stringify!($field) => {
                        self.$field = ::std::convert::TryFrom::try_from(value).map_err(
                            |found: $crate::field::FieldKind| $crate::field::FieldError::KindMismatch {
                                name: name.to_string(),
                                expected: $crate::field::FieldKind::$kind,
                                found,
                            },
                        )?;
                        Ok(())
                    })*
                    _ => Err($crate::field::FieldError::Unknown { name: name.to_string() }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TaggedField {
    name:  String,
    value: FieldValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldSection {
    owner:  String,
    fields: Vec<TaggedField>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FieldStream {
    sections: Vec<FieldSection>,
}

/// What happened while restoring one or more owners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    /// Fields assigned from the stream.
    pub applied:    usize,
    /// Stream entries whose name the target no longer declares.
    pub unknown:    usize,
    /// Stream entries whose kind differs from the declared kind.
    pub mismatched: usize,
    /// Declared fields with no entry in the stream (left at current value).
    pub missing:    usize,
}

impl ApplyReport {
    pub fn merge(&mut self, other: ApplyReport) {
        self.applied += other.applied;
        self.unknown += other.unknown;
        self.mismatched += other.mismatched;
        self.missing += other.missing;
    }

    /// True when stream and declarations lined up exactly.
    pub fn is_exact(&self) -> bool {
        self.unknown == 0 && self.mismatched == 0 && self.missing == 0
    }
}

/// Accumulates one section per owner, in call order.
#[derive(Debug, Default)]
pub struct FieldWriter {
    stream: FieldStream,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write<T: PersistFields + ?Sized>(&mut self, owner: &T) {
        let fields = owner
            .descriptors()
            .iter()
            .filter_map(|d| {
                owner.get(d.name).map(|value| TaggedField { name: d.name.to_string(), value })
            })
            .collect();
        self.stream.sections.push(FieldSection {
            owner: owner.type_name().to_string(),
            fields,
        });
    }

    /// Encode the stream. A non-finite number anywhere refuses the whole
    /// stream rather than writing a value that cannot be read back.
    pub fn finish(self) -> SaveResult<Vec<u8>> {
        for section in &self.stream.sections {
            if let Some(bad) = section.fields.iter().find(|f| !f.value.is_finite()) {
                return Err(SaveError::precondition(format!(
                    "{}.{} is not a finite number",
                    section.owner, bad.name
                )));
            }
        }
        Ok(serde_json::to_vec(&self.stream)?)
    }
}

/// Replays sections onto owners, in the same order they were written.
#[derive(Debug)]
pub struct FieldReader {
    sections: std::vec::IntoIter<FieldSection>,
}

impl FieldReader {
    /// An empty byte slice is a valid stream with no sections.
    pub fn open(bytes: &[u8]) -> SaveResult<Self> {
        let stream: FieldStream = if bytes.is_empty() {
            FieldStream::default()
        } else {
            serde_json::from_slice(bytes).map_err(|e| SaveError::Codec(e.to_string()))?
        };
        Ok(Self { sections: stream.sections.into_iter() })
    }

    /// Sections not yet consumed.
    pub fn remaining(&self) -> usize {
        self.sections.len()
    }

    /// Consume the next section and assign it onto `target`.
    pub fn read_into<T: PersistFields + ?Sized>(&mut self, target: &mut T) -> ApplyReport {
        let descriptors = target.descriptors();
        let Some(section) = self.sections.next() else {
            log::debug!(
                "field stream exhausted before {}; keeping current values",
                target.type_name()
            );
            return ApplyReport { missing: descriptors.len(), ..ApplyReport::default() };
        };

        if section.owner != target.type_name() {
            log::debug!(
                "field section written by {} replayed onto {}",
                section.owner,
                target.type_name()
            );
        }

        let mut report = ApplyReport::default();
        for entry in &section.fields {
            let Some(descriptor) = descriptors.iter().find(|d| d.name == entry.name) else {
                report.unknown += 1;
                continue;
            };
            if descriptor.kind != entry.value.kind() {
                log::warn!(
                    "{}.{}: stored {:?} does not match declared {:?}; field skipped",
                    target.type_name(),
                    entry.name,
                    entry.value.kind(),
                    descriptor.kind
                );
                report.mismatched += 1;
                continue;
            }
            match target.set(&entry.name, entry.value.clone()) {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    log::warn!("{}: {e}; field skipped", target.type_name());
                    report.mismatched += 1;
                }
            }
        }
        report.missing = descriptors
            .iter()
            .filter(|d| !section.fields.iter().any(|f| f.name == d.name))
            .count();
        report
    }
}

/// Single-owner convenience for [`FieldWriter`].
pub fn extract<T: PersistFields + ?Sized>(owner: &T) -> SaveResult<Vec<u8>> {
    let mut writer = FieldWriter::new();
    writer.write(owner);
    writer.finish()
}

/// Single-owner convenience for [`FieldReader`].
pub fn apply<T: PersistFields + ?Sized>(owner: &mut T, bytes: &[u8]) -> SaveResult<ApplyReport> {
    let mut reader = FieldReader::open(bytes)?;
    Ok(reader.read_into(owner))
}
