//! Live addon instances

use std::sync::Arc;

use cq_core::{
    flatten_variables, Action, Addon, AddonMetadata, Capabilities, CapabilityResult, Condition,
    Event, EventConstructor, Variable, VariableEntry,
};
use tokio::sync::OnceCell;
use tracing::debug;

/// An addon instance owned by the registry
///
/// Each capability collection is fetched from the addon the first time it is
/// needed and cached for the lifetime of the instance. A failed fetch is not
/// cached. Collections the addon does not declare in its [`Capabilities`]
/// are never fetched and read as `None`.
pub struct AddonHandle {
    module: String,
    addon: Arc<dyn Addon>,
    variables: OnceCell<Vec<VariableEntry>>,
    conditions: OnceCell<Vec<Arc<dyn Condition>>>,
    actions: OnceCell<Vec<Arc<dyn Action>>>,
    events: OnceCell<Vec<Arc<dyn Event>>>,
    event_constructors: OnceCell<Vec<Arc<dyn EventConstructor>>>,
}

impl AddonHandle {
    pub fn new(module: impl Into<String>, addon: Arc<dyn Addon>) -> Self {
        Self {
            module: module.into(),
            addon,
            variables: OnceCell::new(),
            conditions: OnceCell::new(),
            actions: OnceCell::new(),
            events: OnceCell::new(),
            event_constructors: OnceCell::new(),
        }
    }

    /// Module name of the initialiser that created this instance
    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn metadata(&self) -> &AddonMetadata {
        self.addon.metadata()
    }

    pub fn instance_id(&self) -> &str {
        &self.addon.metadata().instance_id
    }

    pub fn capabilities(&self) -> Capabilities {
        self.addon.capabilities()
    }

    /// The wrapped addon
    pub fn addon(&self) -> &Arc<dyn Addon> {
        &self.addon
    }

    pub async fn variables(&self) -> CapabilityResult<Option<&[VariableEntry]>> {
        if !self.capabilities().variables {
            return Ok(None);
        }
        let entries = self
            .variables
            .get_or_try_init(|| {
                debug!(module = %self.module, instance_id = %self.instance_id(), "Fetching variables");
                self.addon.variables()
            })
            .await?;
        Ok(Some(entries.as_slice()))
    }

    pub async fn conditions(&self) -> CapabilityResult<Option<&[Arc<dyn Condition>]>> {
        if !self.capabilities().conditions {
            return Ok(None);
        }
        let conditions = self
            .conditions
            .get_or_try_init(|| self.addon.conditions())
            .await?;
        Ok(Some(conditions.as_slice()))
    }

    pub async fn actions(&self) -> CapabilityResult<Option<&[Arc<dyn Action>]>> {
        if !self.capabilities().actions {
            return Ok(None);
        }
        let actions = self.actions.get_or_try_init(|| self.addon.actions()).await?;
        Ok(Some(actions.as_slice()))
    }

    pub async fn events(&self) -> CapabilityResult<Option<&[Arc<dyn Event>]>> {
        if !self.capabilities().events {
            return Ok(None);
        }
        let events = self.events.get_or_try_init(|| self.addon.events()).await?;
        Ok(Some(events.as_slice()))
    }

    pub async fn event_constructors(
        &self,
    ) -> CapabilityResult<Option<&[Arc<dyn EventConstructor>]>> {
        if !self.capabilities().event_constructors {
            return Ok(None);
        }
        let constructors = self
            .event_constructors
            .get_or_try_init(|| self.addon.event_constructors())
            .await?;
        Ok(Some(constructors.as_slice()))
    }

    /// Every variable, with collections flattened
    pub async fn flat_variables(&self) -> CapabilityResult<Vec<Arc<dyn Variable>>> {
        Ok(self
            .variables()
            .await?
            .map(flatten_variables)
            .unwrap_or_default())
    }

    pub async fn find_variable(&self, unique_id: &str) -> CapabilityResult<Option<Arc<dyn Variable>>> {
        Ok(self
            .flat_variables()
            .await?
            .into_iter()
            .find(|variable| variable.unique_id() == unique_id))
    }

    /// Conditions offered for a variable: its own, then those of any
    /// collection containing it
    pub async fn variable_conditions(&self, variable_id: &str) -> CapabilityResult<Vec<Arc<dyn Condition>>> {
        let mut conditions = Vec::new();
        for entry in self.variables().await?.unwrap_or_default() {
            match entry {
                VariableEntry::Variable(variable) if variable.unique_id() == variable_id => {
                    conditions.extend(variable.conditions());
                }
                VariableEntry::Collection(collection) => {
                    if let Some(variable) = collection
                        .variables
                        .iter()
                        .find(|variable| variable.unique_id() == variable_id)
                    {
                        conditions.extend(variable.conditions());
                        conditions.extend(collection.conditions.iter().cloned());
                    }
                }
                VariableEntry::Variable(_) => {}
            }
        }
        Ok(conditions)
    }

    pub async fn find_condition(&self, unique_id: &str) -> CapabilityResult<Option<Arc<dyn Condition>>> {
        Ok(self
            .conditions()
            .await?
            .unwrap_or_default()
            .iter()
            .find(|condition| condition.unique_id() == unique_id)
            .cloned())
    }

    pub async fn find_action(&self, unique_id: &str) -> CapabilityResult<Option<Arc<dyn Action>>> {
        Ok(self
            .actions()
            .await?
            .unwrap_or_default()
            .iter()
            .find(|action| action.unique_id() == unique_id)
            .cloned())
    }

    pub async fn find_event_constructor(
        &self,
        unique_id: &str,
    ) -> CapabilityResult<Option<Arc<dyn EventConstructor>>> {
        Ok(self
            .event_constructors()
            .await?
            .unwrap_or_default()
            .iter()
            .find(|constructor| constructor.unique_id() == unique_id)
            .cloned())
    }
}

impl std::fmt::Debug for AddonHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonHandle")
            .field("module", &self.module)
            .field("instance_id", &self.instance_id())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
