use cq_core::{CapabilityError, ValidationError};
use cq_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddonsError {
    #[error("{0}")]
    NotFound(String),

    #[error("cannot create more than one instance of {name} from {module}")]
    PolicyViolation { module: String, name: String },

    #[error("instance {instance_id} of {module} is already live")]
    AlreadyLive { module: String, instance_id: String },

    #[error("found {count} instances of {module}, but no instance id was provided")]
    AmbiguousResolution { module: String, count: usize },

    #[error("cannot create {name} from {module}: {source}")]
    Validation {
        module: String,
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("{module} failed to create instance {instance_id}: {source}")]
    Creation {
        module: String,
        instance_id: String,
        #[source]
        source: CapabilityError,
    },

    #[error("capability of {module} instance {instance_id} failed: {source}")]
    Capability {
        module: String,
        instance_id: String,
        #[source]
        source: CapabilityError,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type AddonsResult<T> = Result<T, AddonsError>;
