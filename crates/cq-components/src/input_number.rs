//! `input-number`

use std::sync::Arc;

use async_trait::async_trait;
use cq_core::{
    find_input, Action, Addon, AddonInitialiser, AddonMetadata, Capabilities, CapabilityError,
    CapabilityResult, InitialiserMetadata, InputKind, UserInput, UserInputValue, Variable,
    VariableEntry, WritableVariable,
};
use cq_variables::ReadWriteVariable;
use serde_json::{json, Value};
use tracing::debug;

pub const INPUT_NUMBER: &str = "input-number";

/// Whole numbers are stored as integers
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

fn number_input(inputs: &[UserInputValue], id: &str) -> CapabilityResult<f64> {
    find_input(inputs, id)
        .ok_or_else(|| CapabilityError::MissingInput(id.to_string()))?
        .as_f64()
        .ok_or_else(|| CapabilityError::InvalidInput {
            input: id.to_string(),
            reason: "expected a number".to_string(),
        })
}

struct SetValue {
    min: f64,
    max: f64,
    value: Arc<ReadWriteVariable>,
    inputs: Vec<UserInput>,
}

#[async_trait]
impl Action for SetValue {
    fn unique_id(&self) -> &str {
        "set_value"
    }

    fn name(&self) -> &str {
        "Set value"
    }

    fn inputs(&self) -> &[UserInput] {
        &self.inputs
    }

    async fn perform(&self, inputs: &[UserInputValue]) -> CapabilityResult<()> {
        let requested = number_input(inputs, "value")?;
        let clamped = requested.clamp(self.min, self.max);
        if clamped != requested {
            debug!(requested, clamped, "Value clamped to range");
        }
        self.value.update_value(number_value(clamped)).await
    }
}

/// A number kept within `min..=max`
pub struct InputNumber {
    metadata: AddonMetadata,
    min: f64,
    max: f64,
    value: Arc<ReadWriteVariable>,
}

impl InputNumber {
    pub fn new(
        metadata: AddonMetadata,
        name: &str,
        min: f64,
        max: f64,
        initial: Option<f64>,
    ) -> CapabilityResult<Self> {
        if min > max {
            return Err(CapabilityError::InvalidInput {
                input: "max".to_string(),
                reason: format!("maximum {} is below minimum {}", max, min),
            });
        }

        let initial = initial.unwrap_or(min).clamp(min, max);
        Ok(Self {
            metadata,
            min,
            max,
            value: Arc::new(ReadWriteVariable::new("value", name, number_value(initial))),
        })
    }

    pub fn value(&self) -> &Arc<ReadWriteVariable> {
        &self.value
    }
}

#[async_trait]
impl Addon for InputNumber {
    fn metadata(&self) -> &AddonMetadata {
        &self.metadata
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_variables().with_actions()
    }

    async fn variables(&self) -> CapabilityResult<Vec<VariableEntry>> {
        let value: Arc<dyn Variable> = self.value.clone();
        Ok(vec![value.into()])
    }

    async fn actions(&self) -> CapabilityResult<Vec<Arc<dyn Action>>> {
        Ok(vec![Arc::new(SetValue {
            min: self.min,
            max: self.max,
            value: self.value.clone(),
            inputs: vec![UserInput::new("value", InputKind::Number)
                .required()
                .with_name("Value")],
        })])
    }
}

pub struct InputNumberInitialiser {
    metadata: InitialiserMetadata,
}

impl InputNumberInitialiser {
    pub fn new() -> Self {
        Self {
            metadata: InitialiserMetadata::new("Input Number", "A number within a range")
                .multiple_instances()
                .with_inputs(vec![
                    UserInput::new("name", InputKind::String)
                        .required()
                        .with_name("Name"),
                    UserInput::new("min", InputKind::Number)
                        .required()
                        .with_name("Minimum"),
                    UserInput::new("max", InputKind::Number)
                        .required()
                        .with_name("Maximum"),
                    UserInput::new("initial", InputKind::Number).with_name("Initial value"),
                ]),
        }
    }
}

impl Default for InputNumberInitialiser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddonInitialiser for InputNumberInitialiser {
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
        let min = number_input(inputs, "min")?;
        let max = number_input(inputs, "max")?;
        let initial = find_input(inputs, "initial").and_then(Value::as_f64);

        debug!(instance_id = %metadata.instance_id, name = %name, min, max, "Creating input number");
        Ok(Arc::new(InputNumber::new(metadata, &name, min, max, initial)?))
    }
}
