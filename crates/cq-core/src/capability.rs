//! Conditions and actions
//!
//! Both are addon-supplied and may perform I/O, so every call is async.

use async_trait::async_trait;
use thiserror::Error;

use crate::input::{UserInput, UserInputValue};

/// Errors raised by addon-supplied capabilities
#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("{0}")]
    Failed(String),

    #[error("input '{0}' is required")]
    MissingInput(String),

    #[error("invalid input '{input}': {reason}")]
    InvalidInput { input: String, reason: String },

    #[error("variable {0} is read-only")]
    ReadOnly(String),

    #[error("{} change listener(s) of variable {variable_id} failed: {}", .failures.len(), .failures.join("; "))]
    ListenersFailed {
        variable_id: String,
        failures: Vec<String>,
    },
}

impl CapabilityError {
    pub fn failed(message: impl Into<String>) -> Self {
        CapabilityError::Failed(message.into())
    }
}

/// Result type for capability calls
pub type CapabilityResult<T> = Result<T, CapabilityError>;

/// A named predicate with declared inputs
///
/// Implementations must not have side effects; the same inputs may be
/// evaluated many times, concurrently, by independent evaluation passes.
#[async_trait]
pub trait Condition: Send + Sync {
    /// Identifier, unique within the addon and stable across restarts
    fn unique_id(&self) -> &str;

    /// User-facing name, read as `<input> <name>` (e.g. "Temperature is greater than")
    fn name(&self) -> &str;

    fn inputs(&self) -> &[UserInput] {
        &[]
    }

    async fn evaluate(&self, inputs: &[UserInputValue]) -> CapabilityResult<bool>;
}

/// A named side-effecting operation
#[async_trait]
pub trait Action: Send + Sync {
    /// Identifier, unique within the addon and stable across restarts
    fn unique_id(&self) -> &str;

    fn name(&self) -> &str {
        self.unique_id()
    }

    fn inputs(&self) -> &[UserInput] {
        &[]
    }

    async fn perform(&self, inputs: &[UserInputValue]) -> CapabilityResult<()>;
}
