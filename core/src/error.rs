use crate::types::{EntityId, UserIndex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Entity {entity} has no usable identity: {reason}")]
    Identity { entity: EntityId, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Field stream could not be decoded: {0}")]
    Codec(String),

    #[error("Save slot '{slot}' (user {user}) does not exist")]
    SlotNotFound { slot: String, user: UserIndex },

    #[error("Save slot format version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse failure classes callers can branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    PreconditionFailure,
    IdentityFailure,
    StorageFailure,
    SchemaDrift,
}

impl SaveError {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Precondition(_) | Self::SlotNotFound { .. } => FailureCategory::PreconditionFailure,
            Self::Identity { .. } => FailureCategory::IdentityFailure,
            Self::Codec(_) | Self::UnsupportedVersion { .. } => FailureCategory::SchemaDrift,
            Self::Storage(_) | Self::Database(_) | Self::Serialization(_) | Self::Other(_) => {
                FailureCategory::StorageFailure
            }
        }
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}

pub type SaveResult<T> = Result<T, SaveError>;
