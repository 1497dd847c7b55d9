//! Persistence for Consequences
//!
//! Data lives in a `.storage/` directory as versioned JSON files. On top of
//! that sit the stores the host needs:
//!
//! - [`AddonStore`] - records of created addon instances, replayed on startup

mod addon_store;
mod storage;

pub use addon_store::{AddonRecord, AddonRecords, AddonStore, JsonAddonStore, MemoryAddonStore};
pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
