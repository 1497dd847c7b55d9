//! Variables and variable collections

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::{CapabilityResult, Condition};
use crate::event::Event;

/// Identifier of a registered listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Callback invoked with the new value whenever a variable changes
///
/// An `Err` is reported back to the caller of `update_value`; it does not stop
/// the remaining listeners from being called.
pub type ChangeListener = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

/// An observable value offered by an addon
#[async_trait]
pub trait Variable: Send + Sync {
    /// Identifier, unique within the addon instance and stable across restarts
    fn unique_id(&self) -> &str;

    fn name(&self) -> &str;

    /// Conditions that apply to this variable
    fn conditions(&self) -> Vec<Arc<dyn Condition>> {
        Vec::new()
    }

    /// Events that this variable offers
    fn events(&self) -> Vec<Arc<dyn Event>> {
        Vec::new()
    }

    async fn retrieve_value(&self) -> CapabilityResult<Value>;

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId;

    /// Returns `false` if no listener with this id was registered
    fn remove_change_listener(&self, id: ListenerId) -> bool;

    /// Capability negotiation: `Some` if the variable can be updated
    fn as_writable(&self) -> Option<&dyn WritableVariable> {
        None
    }
}

/// A variable whose value can be changed by the host
#[async_trait]
pub trait WritableVariable: Variable {
    /// Apply `new_value` and notify every registered listener
    async fn update_value(&self, new_value: Value) -> CapabilityResult<()>;
}

/// A group of variables offered under one identifier
#[derive(Clone)]
pub struct VariableCollection {
    pub unique_id: String,
    pub name: String,
    pub variables: Vec<Arc<dyn Variable>>,
    /// Conditions of the group, in addition to those of its variables
    pub conditions: Vec<Arc<dyn Condition>>,
    /// Events of the group, in addition to those of its variables
    pub events: Vec<Arc<dyn Event>>,
}

impl VariableCollection {
    pub fn new(
        unique_id: impl Into<String>,
        name: impl Into<String>,
        variables: Vec<Arc<dyn Variable>>,
    ) -> Self {
        Self {
            unique_id: unique_id.into(),
            name: name.into(),
            variables,
            conditions: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Arc<dyn Condition>>) -> Self {
        self.conditions = conditions;
        self
    }

    pub fn with_events(mut self, events: Vec<Arc<dyn Event>>) -> Self {
        self.events = events;
        self
    }
}

/// An entry of an addon's variable list
#[derive(Clone)]
pub enum VariableEntry {
    Variable(Arc<dyn Variable>),
    Collection(VariableCollection),
}

impl From<Arc<dyn Variable>> for VariableEntry {
    fn from(variable: Arc<dyn Variable>) -> Self {
        VariableEntry::Variable(variable)
    }
}

impl From<VariableCollection> for VariableEntry {
    fn from(collection: VariableCollection) -> Self {
        VariableEntry::Collection(collection)
    }
}

/// Flatten collections into a single list of variables, preserving order
pub fn flatten_variables(entries: &[VariableEntry]) -> Vec<Arc<dyn Variable>> {
    entries
        .iter()
        .flat_map(|entry| match entry {
            VariableEntry::Variable(variable) => vec![variable.clone()],
            VariableEntry::Collection(collection) => collection.variables.clone(),
        })
        .collect()
}
