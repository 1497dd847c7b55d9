//! `input-boolean`

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use cq_core::{
    find_input, Action, Addon, AddonInitialiser, AddonMetadata, Capabilities, CapabilityError,
    CapabilityResult, Condition, InitialiserMetadata, InputKind, UserInput, UserInputValue,
    Variable, VariableEntry, WritableVariable,
};
use cq_variables::ReadWriteVariable;
use serde_json::Value;
use tracing::debug;

pub const INPUT_BOOLEAN: &str = "input-boolean";

/// `is_on` / `is_off` of the `state` variable
struct StateIs {
    on: bool,
    state: Weak<ReadWriteVariable>,
}

#[async_trait]
impl Condition for StateIs {
    fn unique_id(&self) -> &str {
        if self.on {
            "is_on"
        } else {
            "is_off"
        }
    }

    fn name(&self) -> &str {
        if self.on {
            "is on"
        } else {
            "is off"
        }
    }

    async fn evaluate(&self, _inputs: &[UserInputValue]) -> CapabilityResult<bool> {
        let state = self
            .state
            .upgrade()
            .ok_or_else(|| CapabilityError::failed("input boolean was removed"))?;
        Ok(state.current().as_bool() == Some(self.on))
    }
}

#[derive(Clone, Copy)]
enum Switch {
    On,
    Off,
    Toggle,
}

struct SwitchAction {
    kind: Switch,
    state: Arc<ReadWriteVariable>,
}

#[async_trait]
impl Action for SwitchAction {
    fn unique_id(&self) -> &str {
        match self.kind {
            Switch::On => "turn_on",
            Switch::Off => "turn_off",
            Switch::Toggle => "toggle",
        }
    }

    fn name(&self) -> &str {
        match self.kind {
            Switch::On => "Turn on",
            Switch::Off => "Turn off",
            Switch::Toggle => "Toggle",
        }
    }

    async fn perform(&self, _inputs: &[UserInputValue]) -> CapabilityResult<()> {
        let current = self.state.current().as_bool().unwrap_or(false);
        let next = match self.kind {
            Switch::On => true,
            Switch::Off => false,
            Switch::Toggle => !current,
        };

        if next == current {
            debug!(variable_id = %self.state.unique_id(), state = current, "Input boolean unchanged");
            return Ok(());
        }
        self.state.update_value(Value::Bool(next)).await
    }
}

/// A boolean the user flips, by hand or from automations
pub struct InputBoolean {
    metadata: AddonMetadata,
    state: Arc<ReadWriteVariable>,
}

impl InputBoolean {
    pub fn new(metadata: AddonMetadata, name: &str, initial: bool) -> Self {
        let state = Arc::new_cyclic(|weak: &Weak<ReadWriteVariable>| {
            ReadWriteVariable::new("state", name, Value::Bool(initial)).with_conditions(vec![
                Arc::new(StateIs {
                    on: true,
                    state: weak.clone(),
                }) as Arc<dyn Condition>,
                Arc::new(StateIs {
                    on: false,
                    state: weak.clone(),
                }) as Arc<dyn Condition>,
            ])
        });
        Self { metadata, state }
    }

    pub fn state(&self) -> &Arc<ReadWriteVariable> {
        &self.state
    }
}

#[async_trait]
impl Addon for InputBoolean {
    fn metadata(&self) -> &AddonMetadata {
        &self.metadata
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_variables().with_actions()
    }

    async fn variables(&self) -> CapabilityResult<Vec<VariableEntry>> {
        let state: Arc<dyn Variable> = self.state.clone();
        Ok(vec![state.into()])
    }

    async fn actions(&self) -> CapabilityResult<Vec<Arc<dyn Action>>> {
        Ok([Switch::On, Switch::Off, Switch::Toggle]
            .into_iter()
            .map(|kind| {
                Arc::new(SwitchAction {
                    kind,
                    state: self.state.clone(),
                }) as Arc<dyn Action>
            })
            .collect())
    }
}

pub struct InputBooleanInitialiser {
    metadata: InitialiserMetadata,
}

impl InputBooleanInitialiser {
    pub fn new() -> Self {
        Self {
            metadata: InitialiserMetadata::new("Input Boolean", "A switch you can flip")
                .multiple_instances()
                .with_inputs(vec![
                    UserInput::new("name", InputKind::String)
                        .required()
                        .with_name("Name"),
                    UserInput::new("initial", InputKind::Boolean)
                        .with_name("Initial state")
                        .with_default(Value::Bool(false)),
                ]),
        }
    }
}

impl Default for InputBooleanInitialiser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddonInitialiser for InputBooleanInitialiser {
    fn metadata(&self) -> &InitialiserMetadata {
        &self.metadata
    }

    async fn create_instance(
        &self,
        metadata: AddonMetadata,
        inputs: &[UserInputValue],
    ) -> CapabilityResult<Arc<dyn Addon>> {
        let name = find_input(inputs, "name")
            .and_then(Value::as_str)
            .ok_or_else(|| CapabilityError::MissingInput("name".to_string()))?
            .to_string();
        let initial = find_input(inputs, "initial")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        debug!(instance_id = %metadata.instance_id, name = %name, initial, "Creating input boolean");
        Ok(Arc::new(InputBoolean::new(metadata, &name, initial)))
    }
}
