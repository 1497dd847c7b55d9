//! Addons and addon initialisers

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::{Action, CapabilityResult, Condition};
use crate::event::{Event, EventConstructor};
use crate::input::{UserInput, UserInputValue};
use crate::variable::VariableEntry;

/// Metadata the host hands to an addon instance when creating it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonMetadata {
    /// Generated once when the instance is first created, never changes
    pub instance_id: String,

    /// Display name for the instance
    pub name: String,

    /// Inputs the user supplied when creating the instance
    #[serde(default)]
    pub user_provided_inputs: Vec<UserInputValue>,
}

/// Which capability collections an addon instance offers
///
/// A collection that is not offered is never fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub variables: bool,
    pub conditions: bool,
    pub actions: bool,
    pub events: bool,
    pub event_constructors: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_variables(mut self) -> Self {
        self.variables = true;
        self
    }

    pub fn with_conditions(mut self) -> Self {
        self.conditions = true;
        self
    }

    pub fn with_actions(mut self) -> Self {
        self.actions = true;
        self
    }

    pub fn with_events(mut self) -> Self {
        self.events = true;
        self
    }

    pub fn with_event_constructors(mut self) -> Self {
        self.event_constructors = true;
        self
    }
}

/// A running, configured instance of an addon
///
/// Collections are fetched lazily and at most once per instance; the host
/// caches the result. Only collections flagged in [`Addon::capabilities`]
/// are fetched.
#[async_trait]
pub trait Addon: Send + Sync {
    fn metadata(&self) -> &AddonMetadata;

    fn capabilities(&self) -> Capabilities;

    async fn variables(&self) -> CapabilityResult<Vec<VariableEntry>> {
        Ok(Vec::new())
    }

    async fn conditions(&self) -> CapabilityResult<Vec<Arc<dyn Condition>>> {
        Ok(Vec::new())
    }

    async fn actions(&self) -> CapabilityResult<Vec<Arc<dyn Action>>> {
        Ok(Vec::new())
    }

    async fn events(&self) -> CapabilityResult<Vec<Arc<dyn Event>>> {
        Ok(Vec::new())
    }

    async fn event_constructors(&self) -> CapabilityResult<Vec<Arc<dyn EventConstructor>>> {
        Ok(Vec::new())
    }
}

/// Description of an addon, available before any instance exists
#[derive(Debug, Clone)]
pub struct InitialiserMetadata {
    /// Display name of the addon
    pub name: String,

    pub description: String,

    /// Whether more than one instance may exist at a time
    pub supports_multiple_instances: bool,

    /// Inputs accepted by `create_instance`
    pub inputs: Vec<UserInput>,
}

impl InitialiserMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            supports_multiple_instances: false,
            inputs: Vec::new(),
        }
    }

    pub fn multiple_instances(mut self) -> Self {
        self.supports_multiple_instances = true;
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<UserInput>) -> Self {
        self.inputs = inputs;
        self
    }
}

/// Factory for addon instances, provided by each addon module
#[async_trait]
pub trait AddonInitialiser: Send + Sync {
    fn metadata(&self) -> &InitialiserMetadata;

    /// Create a new instance
    ///
    /// Every required input declared in the metadata is guaranteed to be
    /// present in `inputs` and to have passed validation.
    async fn create_instance(
        &self,
        metadata: AddonMetadata,
        inputs: &[UserInputValue],
    ) -> CapabilityResult<Arc<dyn Addon>>;
}
