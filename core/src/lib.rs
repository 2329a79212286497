//! snapkeep-core: snapshot persistence and world reconciliation for live
//! entity simulations.
//!
//! Saving walks the live world, captures each persistable entity as a
//! keyed record and writes the whole slot. Loading aligns a freshly
//! loaded world with the stored records: restore in place, respawn, or
//! destroy.

pub mod config;
pub mod error;
pub mod event;
pub mod extract;
pub mod field;
pub mod host;
pub mod identity;
pub mod keygen;
pub mod reconcile;
pub mod sandbox;
pub mod snapshot;
pub mod store;
pub mod system;
pub mod transform;
pub mod types;

pub use config::SaveConfig;
pub use error::{FailureCategory, SaveError, SaveResult};
pub use host::{HostWorld, Savable, SavableEntity, SlotStore};
pub use identity::{IdentityKey, IdentityResolver};
pub use reconcile::{ReconcileMode, ReconcileReport};
pub use system::SaveSystem;
pub use transform::Transform;
pub use types::EntityId;
