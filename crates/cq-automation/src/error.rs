use cq_addons::AddonsError;
use cq_core::{CapabilityError, ValidationError};
use cq_events::EventsError;
use cq_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("{0}")]
    NotFound(String),

    #[error("event listener {0} already exists")]
    AlreadyExists(String),

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("invalid inputs for {capability}: {source}")]
    Validation {
        capability: String,
        #[source]
        source: ValidationError,
    },

    #[error(transparent)]
    Addons(#[from] AddonsError),

    #[error(transparent)]
    Events(#[from] EventsError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{context}: {source}")]
    Capability {
        context: String,
        #[source]
        source: CapabilityError,
    },

    #[error("no async runtime available: {0}")]
    Runtime(String),
}

pub type AutomationResult<T> = Result<T, AutomationError>;
