//! Addon registry
//!
//! The [`AddonsManager`] owns every registered [`AddonInitialiser`] (keyed by
//! module name) and every live addon instance. Instances are wrapped in an
//! [`AddonHandle`], which fetches each capability collection lazily and at
//! most once.
//!
//! [`AddonInitialiser`]: cq_core::AddonInitialiser

mod error;
mod handle;
mod loader;
mod manager;

pub use error::{AddonsError, AddonsResult};
pub use handle::AddonHandle;
pub use loader::{AddonFactory, AddonLoadError, AddonLoader, AddonModule, StaticAddonLoader};
pub use manager::{AddonResolution, AddonsManager, LoadReport, RestoreReport};
