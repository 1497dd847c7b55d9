//! Boilerplate variables

use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use cq_core::{
    CapabilityError, CapabilityResult, ChangeListener, Condition, Event, ListenerId, Variable,
    WritableVariable,
};
use serde_json::Value;
use tracing::debug;

use crate::listeners::ListenerSet;

/// A variable holding a value in memory
///
/// The host can only read it; the owning addon publishes new values with
/// [`ReadOnlyVariable::set_value`].
pub struct ReadOnlyVariable {
    unique_id: String,
    name: String,
    conditions: Vec<Arc<dyn Condition>>,
    events: Vec<Arc<dyn Event>>,
    value: RwLock<Value>,
    listeners: ListenerSet<ChangeListener>,
    /// Held from the write until every listener has seen the value
    dispatch: Mutex<()>,
}

impl ReadOnlyVariable {
    pub fn new(unique_id: impl Into<String>, name: impl Into<String>, starting_value: Value) -> Self {
        Self {
            unique_id: unique_id.into(),
            name: name.into(),
            conditions: Vec::new(),
            events: Vec::new(),
            value: RwLock::new(starting_value),
            listeners: ListenerSet::new(),
            dispatch: Mutex::new(()),
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

    /// Current value without going through the async accessor
    pub fn current(&self) -> Value {
        self.value.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Store a new value and notify every listener
    ///
    /// The value stays applied even if listeners fail. Concurrent updates are
    /// serialised, so listeners see values in the order they were stored. A
    /// listener must not update the variable it is listening to.
    pub fn set_value(&self, new_value: Value) -> CapabilityResult<()> {
        let _dispatch = self.dispatch.lock().unwrap_or_else(|e| e.into_inner());
        {
            let mut value = self.value.write().unwrap_or_else(|e| e.into_inner());
            *value = new_value.clone();
        }

        debug!(variable_id = %self.unique_id, value = %new_value, "Variable value changed");

        self.listeners
            .notify(&new_value)
            .map_err(|failures| CapabilityError::ListenersFailed {
                variable_id: self.unique_id.clone(),
                failures,
            })
    }

    /// Number of registered change listeners
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl Variable for ReadOnlyVariable {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn conditions(&self) -> Vec<Arc<dyn Condition>> {
        self.conditions.clone()
    }

    fn events(&self) -> Vec<Arc<dyn Event>> {
        self.events.clone()
    }

    async fn retrieve_value(&self) -> CapabilityResult<Value> {
        Ok(self.current())
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

/// A variable the host can update through [`WritableVariable`]
pub struct ReadWriteVariable {
    inner: ReadOnlyVariable,
}

impl ReadWriteVariable {
    pub fn new(unique_id: impl Into<String>, name: impl Into<String>, starting_value: Value) -> Self {
        Self {
            inner: ReadOnlyVariable::new(unique_id, name, starting_value),
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<Arc<dyn Condition>>) -> Self {
        self.inner = self.inner.with_conditions(conditions);
        self
    }

    pub fn with_events(mut self, events: Vec<Arc<dyn Event>>) -> Self {
        self.inner = self.inner.with_events(events);
        self
    }

    pub fn current(&self) -> Value {
        self.inner.current()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listener_count()
    }
}

#[async_trait]
impl Variable for ReadWriteVariable {
    fn unique_id(&self) -> &str {
        self.inner.unique_id()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn conditions(&self) -> Vec<Arc<dyn Condition>> {
        self.inner.conditions()
    }

    fn events(&self) -> Vec<Arc<dyn Event>> {
        self.inner.events()
    }

    async fn retrieve_value(&self) -> CapabilityResult<Value> {
        self.inner.retrieve_value().await
    }

    fn add_change_listener(&self, listener: ChangeListener) -> ListenerId {
        self.inner.add_change_listener(listener)
    }

    fn remove_change_listener(&self, id: ListenerId) -> bool {
        self.inner.remove_change_listener(id)
    }

    fn as_writable(&self) -> Option<&dyn WritableVariable> {
        Some(self)
    }
}

#[async_trait]
impl WritableVariable for ReadWriteVariable {
    async fn update_value(&self, new_value: Value) -> CapabilityResult<()> {
        self.inner.set_value(new_value)
    }
}
