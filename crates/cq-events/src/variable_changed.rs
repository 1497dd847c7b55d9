//! The `variable_value_changed` event

use std::sync::Arc;

use async_trait::async_trait;
use cq_addons::{AddonResolution, AddonsManager};
use cq_core::{
    find_input, CapabilityError, CapabilityResult, Event, EventConstructor, EventMetadata,
    InputKind, ListenerId, TriggerListener, UserInput, UserInputValue, Variable, VariableRef,
};
use serde_json::Value;
use tracing::debug;

use crate::error::{EventsError, EventsResult};
use crate::state::EventState;

/// Id of the internal constructor
pub const VARIABLE_VALUE_CHANGED: &str = "variable_value_changed";

/// Fires whenever the value of a variable changes
///
/// Dropping the event unsubscribes it from the variable.
pub struct VariableValueChangedEvent {
    state: Arc<EventState>,
    variable: Arc<dyn Variable>,
    subscription: ListenerId,
}

impl VariableValueChangedEvent {
    pub fn new(metadata: EventMetadata, variable: Arc<dyn Variable>) -> Self {
        let state = Arc::new(EventState::new(metadata));
        let trigger = state.clone();
        let subscription = variable.add_change_listener(Arc::new(move |_: &Value| {
            trigger.fire();
            Ok(())
        }));

        debug!(
            event_id = %state.metadata().unique_id,
            variable_id = %variable.unique_id(),
            "Watching variable"
        );

        Self {
            state,
            variable,
            subscription,
        }
    }

    pub fn variable(&self) -> &Arc<dyn Variable> {
        &self.variable
    }
}

impl Event for VariableValueChangedEvent {
    fn metadata(&self) -> EventMetadata {
        self.state.metadata()
    }

    fn add_trigger_listener(&self, listener: TriggerListener) -> ListenerId {
        self.state.add_trigger_listener(listener)
    }

    fn remove_trigger_listener(&self, id: ListenerId) -> bool {
        self.state.remove_trigger_listener(id)
    }
}

impl Drop for VariableValueChangedEvent {
    fn drop(&mut self) {
        self.variable.remove_change_listener(self.subscription);
    }
}

/// Find the variable a [`VariableRef`] points at
///
/// A missing module, instance or variable is `NotFound`; resolution errors of
/// the addon registry are passed through unchanged.
pub async fn resolve_variable(
    addons: &AddonsManager,
    reference: &VariableRef,
) -> EventsResult<Arc<dyn Variable>> {
    let resolution = AddonResolution {
        module: reference.module.clone(),
        instance_id: reference.instance_id.clone(),
    };
    let handle = addons.resolve_instance(&resolution)?;

    handle
        .find_variable(&reference.variable_id)
        .await
        .map_err(|source| EventsError::Capability {
            context: format!(
                "failed to fetch variables of addon {} instance {}",
                reference.module,
                handle.instance_id()
            ),
            source,
        })?
        .ok_or_else(|| {
            EventsError::NotFound(format!(
                "no variable with id {} was found in addon {} instance {}",
                reference.variable_id,
                reference.module,
                handle.instance_id()
            ))
        })
}

/// Builds [`VariableValueChangedEvent`]s from a `variable` input
pub struct VariableValueChangedConstructor {
    addons: Arc<AddonsManager>,
    inputs: Vec<UserInput>,
}

impl VariableValueChangedConstructor {
    pub fn new(addons: Arc<AddonsManager>) -> Self {
        Self {
            addons,
            inputs: vec![UserInput::new("variable", InputKind::Variable)
                .required()
                .with_name("Variable")],
        }
    }
}

#[async_trait]
impl EventConstructor for VariableValueChangedConstructor {
    fn unique_id(&self) -> &str {
        VARIABLE_VALUE_CHANGED
    }

    fn name(&self) -> &str {
        "Variable Value Changed"
    }

    fn inputs(&self) -> &[UserInput] {
        &self.inputs
    }

    async fn create_event(
        &self,
        metadata: EventMetadata,
        inputs: &[UserInputValue],
    ) -> CapabilityResult<Arc<dyn Event>> {
        let raw = find_input(inputs, "variable")
            .ok_or_else(|| CapabilityError::MissingInput("variable".to_string()))?;
        let reference = VariableRef::from_value(raw).ok_or_else(|| CapabilityError::InvalidInput {
            input: "variable".to_string(),
            reason: format!("expected a variable reference, got {}", raw),
        })?;

        let variable = resolve_variable(&self.addons, &reference)
            .await
            .map_err(|e| match e {
                EventsError::Capability { source, .. } => source,
                other => CapabilityError::failed(other.to_string()),
            })?;
        Ok(Arc::new(VariableValueChangedEvent::new(metadata, variable)))
    }
}
