use cq_addons::AddonsError;
use cq_core::{CapabilityError, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventsError {
    #[error("{0}")]
    NotFound(String),

    #[error("invalid inputs for event constructor {constructor}: {source}")]
    Validation {
        constructor: String,
        #[source]
        source: ValidationError,
    },

    #[error(transparent)]
    Addons(#[from] AddonsError),

    #[error("{context}: {source}")]
    Capability {
        context: String,
        #[source]
        source: CapabilityError,
    },
}

pub type EventsResult<T> = Result<T, EventsError>;
