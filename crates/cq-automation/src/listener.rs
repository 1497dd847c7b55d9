//! Persisted automation definitions

use async_trait::async_trait;
use cq_core::UserInputValue;
use cq_storage::{Storable, Storage, StorageResult};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

fn generate_id() -> String {
    ulid::Ulid::new().to_string()
}

/// Runs `steps` whenever a variable changes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListener {
    #[serde(default = "generate_id")]
    pub id: String,
    /// Module of the addon owning the watched variable
    pub module_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    pub variable_id: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl EventListener {
    pub fn new(module_id: impl Into<String>, variable_id: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            module_id: module_id.into(),
            instance_id: None,
            variable_id: variable_id.into(),
            steps: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    pub fn with_step(mut self, step: impl Into<Step>) -> Self {
        self.steps.push(step.into());
        self
    }
}

/// One step of an automation
///
/// Untagged: a step with a `conditionId` is a condition, one with an
/// `actionId` an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Step {
    Condition(ConditionStep),
    Action(ActionStep),
}

impl From<ConditionStep> for Step {
    fn from(step: ConditionStep) -> Self {
        Step::Condition(step)
    }
}

impl From<ActionStep> for Step {
    fn from(step: ActionStep) -> Self {
        Step::Action(step)
    }
}

/// Steps guarded by a condition, written either as one step or a list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Steps {
    Many(Vec<Step>),
    One(Box<Step>),
}

impl Default for Steps {
    fn default() -> Self {
        Steps::Many(Vec::new())
    }
}

impl Steps {
    pub fn as_slice(&self) -> &[Step] {
        match self {
            Steps::Many(steps) => steps,
            Steps::One(step) => std::slice::from_ref(step.as_ref()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionStep {
    pub condition_id: String,
    #[serde(default)]
    pub user_inputs: Vec<UserInputValue>,
    #[serde(default)]
    pub next: Steps,
    /// Defaults to the listener's module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl ConditionStep {
    pub fn new(condition_id: impl Into<String>) -> Self {
        Self {
            condition_id: condition_id.into(),
            user_inputs: Vec::new(),
            next: Steps::default(),
            module_id: None,
            instance_id: None,
        }
    }

    pub fn with_input(mut self, unique_id: impl Into<String>, value: serde_json::Value) -> Self {
        self.user_inputs.push(UserInputValue::new(unique_id, value));
        self
    }

    pub fn then(mut self, step: impl Into<Step>) -> Self {
        let step = step.into();
        self.next = match self.next {
            Steps::Many(mut steps) => {
                steps.push(step);
                Steps::Many(steps)
            }
            Steps::One(first) => Steps::Many(vec![*first, step]),
        };
        self
    }

    pub fn on(mut self, module_id: impl Into<String>, instance_id: Option<String>) -> Self {
        self.module_id = Some(module_id.into());
        self.instance_id = instance_id;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStep {
    pub action_id: String,
    #[serde(default)]
    pub user_inputs: Vec<UserInputValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl ActionStep {
    pub fn new(action_id: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            user_inputs: Vec::new(),
            module_id: None,
            instance_id: None,
        }
    }

    pub fn with_input(mut self, unique_id: impl Into<String>, value: serde_json::Value) -> Self {
        self.user_inputs.push(UserInputValue::new(unique_id, value));
        self
    }

    pub fn on(mut self, module_id: impl Into<String>, instance_id: Option<String>) -> Self {
        self.module_id = Some(module_id.into());
        self.instance_id = instance_id;
        self
    }
}

/// Persisted contents of `consequences.event_listeners`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventListeners(pub Vec<EventListener>);

impl Storable for EventListeners {
    const KEY: &'static str = "consequences.event_listeners";
    const VERSION: u32 = 1;
}

/// Where automations are persisted
#[async_trait]
pub trait EventListenerStore: Send + Sync {
    /// Insert, or replace the listener with the same id
    async fn save_event_listener(&self, listener: EventListener) -> StorageResult<()>;

    /// Returns `false` if no listener had this id
    async fn remove_event_listener(&self, id: &str) -> StorageResult<bool>;

    async fn retrieve_all_event_listeners(&self) -> StorageResult<Vec<EventListener>>;
}

/// [`EventListenerStore`] backed by `.storage/consequences.event_listeners`
pub struct JsonEventListenerStore {
    storage: Storage,
    listeners: Mutex<Option<Vec<EventListener>>>,
}

impl JsonEventListenerStore {
    pub fn new(storage: Storage) -> Self {
        Self {
            storage,
            listeners: Mutex::new(None),
        }
    }

    async fn cached<'a>(
        &self,
        cached: &'a mut Option<Vec<EventListener>>,
    ) -> StorageResult<&'a mut Vec<EventListener>> {
        if cached.is_none() {
            let loaded = self
                .storage
                .load_data::<EventListeners>()
                .await?
                .map(|listeners| listeners.0)
                .unwrap_or_default();
            *cached = Some(loaded);
        }
        Ok(cached.get_or_insert_with(Vec::new))
    }
}

#[async_trait]
impl EventListenerStore for JsonEventListenerStore {
    async fn save_event_listener(&self, listener: EventListener) -> StorageResult<()> {
        let mut guard = self.listeners.lock().await;
        let listeners = self.cached(&mut guard).await?;

        debug!(listener_id = %listener.id, "Persisting event listener");
        match listeners.iter_mut().find(|existing| existing.id == listener.id) {
            Some(existing) => *existing = listener,
            None => listeners.push(listener),
        }

        self.storage
            .save_data(&EventListeners(listeners.clone()))
            .await
    }

    async fn remove_event_listener(&self, id: &str) -> StorageResult<bool> {
        let mut guard = self.listeners.lock().await;
        let listeners = self.cached(&mut guard).await?;

        let before = listeners.len();
        listeners.retain(|existing| existing.id != id);
        if listeners.len() == before {
            return Ok(false);
        }

        debug!(listener_id = %id, "Removing event listener");
        self.storage
            .save_data(&EventListeners(listeners.clone()))
            .await?;
        Ok(true)
    }

    async fn retrieve_all_event_listeners(&self) -> StorageResult<Vec<EventListener>> {
        let mut guard = self.listeners.lock().await;
        Ok(self.cached(&mut guard).await?.clone())
    }
}

/// In-memory [`EventListenerStore`]
#[derive(Default)]
pub struct MemoryEventListenerStore {
    listeners: Mutex<Vec<EventListener>>,
}

impl MemoryEventListenerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_listeners(listeners: Vec<EventListener>) -> Self {
        Self {
            listeners: Mutex::new(listeners),
        }
    }
}

#[async_trait]
impl EventListenerStore for MemoryEventListenerStore {
    async fn save_event_listener(&self, listener: EventListener) -> StorageResult<()> {
        let mut listeners = self.listeners.lock().await;
        match listeners.iter_mut().find(|existing| existing.id == listener.id) {
            Some(existing) => *existing = listener,
            None => listeners.push(listener),
        }
        Ok(())
    }

    async fn remove_event_listener(&self, id: &str) -> StorageResult<bool> {
        let mut listeners = self.listeners.lock().await;
        let before = listeners.len();
        listeners.retain(|existing| existing.id != id);
        Ok(listeners.len() != before)
    }

    async fn retrieve_all_event_listeners(&self) -> StorageResult<Vec<EventListener>> {
        Ok(self.listeners.lock().await.clone())
    }
}
