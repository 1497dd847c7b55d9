//! Events Manager
//!
//! Resolves events offered by addon instances and constructs new events,
//! either from addon event constructors or from the constructors the host
//! provides under the internal namespace.

use std::sync::Arc;

use cq_addons::{AddonHandle, AddonResolution, AddonsManager};
use cq_core::{
    apply_defaults, validate_inputs, Event, EventConstructor, EventMetadata, InputKind,
    UserInputValue, Variable, VariableRef, INTERNAL_NAMESPACE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{EventsError, EventsResult};
use crate::variable_changed::{resolve_variable, VariableValueChangedConstructor};

/// Identifies an existing event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResolution {
    pub addon: AddonResolution,
    /// When set, the event is looked up on this variable instead of the instance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<String>,
    pub event_id: String,
}

/// Identifies an event constructor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventConstructorResolution {
    pub addon: AddonResolution,
    pub constructor_id: String,
}

impl EventConstructorResolution {
    /// A constructor provided by the host itself
    pub fn internal(constructor_id: impl Into<String>) -> Self {
        Self {
            addon: AddonResolution::new(INTERNAL_NAMESPACE),
            constructor_id: constructor_id.into(),
        }
    }
}

pub struct EventsManager {
    addons: Arc<AddonsManager>,
    internal_constructors: Vec<Arc<dyn EventConstructor>>,
}

impl EventsManager {
    pub fn new(addons: Arc<AddonsManager>) -> Self {
        let internal_constructors: Vec<Arc<dyn EventConstructor>> =
            vec![Arc::new(VariableValueChangedConstructor::new(addons.clone()))];

        Self {
            addons,
            internal_constructors,
        }
    }

    pub fn addons(&self) -> &Arc<AddonsManager> {
        &self.addons
    }

    pub fn internal_constructors(&self) -> &[Arc<dyn EventConstructor>] {
        &self.internal_constructors
    }

    /// Find an event offered by an addon instance or one of its variables
    pub async fn resolve_event(&self, resolution: &EventResolution) -> EventsResult<Arc<dyn Event>> {
        let module = &resolution.addon.module;
        if module == INTERNAL_NAMESPACE {
            return Err(EventsError::NotFound(
                "internal events cannot be resolved, only constructed".to_string(),
            ));
        }

        let handle = self.addons.resolve_instance(&resolution.addon)?;
        let instance_id = handle.instance_id();

        let event = match &resolution.variable_id {
            Some(variable_id) => {
                let variable = handle
                    .find_variable(variable_id)
                    .await
                    .map_err(|source| capability_error(&handle, "variables", source))?
                    .ok_or_else(|| {
                        EventsError::NotFound(format!(
                            "no variable with id {} was found in addon {} instance {}",
                            variable_id, module, instance_id
                        ))
                    })?;

                let events = variable.events();
                if events.is_empty() {
                    return Err(EventsError::NotFound(format!(
                        "no events found on variable with id {} from addon {} instance {}",
                        variable_id, module, instance_id
                    )));
                }

                events
                    .into_iter()
                    .find(|event| event.metadata().unique_id == resolution.event_id)
                    .ok_or_else(|| {
                        EventsError::NotFound(format!(
                            "no event with id {} was found on variable with id {} from addon {} instance {}",
                            resolution.event_id, variable_id, module, instance_id
                        ))
                    })?
            }
            None => {
                let events = handle
                    .events()
                    .await
                    .map_err(|source| capability_error(&handle, "events", source))?
                    .ok_or_else(|| {
                        EventsError::NotFound(format!(
                            "addon {} instance {} does not offer events",
                            module, instance_id
                        ))
                    })?;

                events
                    .iter()
                    .find(|event| event.metadata().unique_id == resolution.event_id)
                    .cloned()
                    .ok_or_else(|| {
                        EventsError::NotFound(format!(
                            "no event with id {} was found on addon {} instance {}",
                            resolution.event_id, module, instance_id
                        ))
                    })?
            }
        };

        debug!(module = %module, instance_id = %instance_id, event_id = %resolution.event_id, "Resolved event");
        Ok(event)
    }

    /// Find the variable a [`VariableRef`] points at
    pub async fn resolve_variable(&self, reference: &VariableRef) -> EventsResult<Arc<dyn Variable>> {
        resolve_variable(&self.addons, reference).await
    }

    /// Every variable referenced by a `Variable` input must exist
    async fn check_variable_inputs(
        &self,
        constructor: &dyn EventConstructor,
        inputs: &[UserInputValue],
    ) -> EventsResult<()> {
        let variable_inputs = constructor
            .inputs()
            .iter()
            .filter(|input| input.kind == InputKind::Variable);

        for input in variable_inputs {
            for supplied in inputs.iter().filter(|v| v.unique_id == input.unique_id) {
                let values: Vec<&Value> = match &supplied.value {
                    Value::Array(items) => items.iter().collect(),
                    single => vec![single],
                };
                for reference in values.into_iter().filter_map(VariableRef::from_value) {
                    self.resolve_variable(&reference).await?;
                }
            }
        }
        Ok(())
    }

    async fn resolve_constructor(
        &self,
        resolution: &EventConstructorResolution,
    ) -> EventsResult<Arc<dyn EventConstructor>> {
        let module = &resolution.addon.module;
        if module == INTERNAL_NAMESPACE {
            return self
                .internal_constructors
                .iter()
                .find(|constructor| constructor.unique_id() == resolution.constructor_id)
                .cloned()
                .ok_or_else(|| {
                    EventsError::NotFound(format!(
                        "failed to find internal event constructor with the id {}",
                        resolution.constructor_id
                    ))
                });
        }

        let handle = self.addons.resolve_instance(&resolution.addon)?;
        let constructors = handle
            .event_constructors()
            .await
            .map_err(|source| capability_error(&handle, "event constructors", source))?
            .ok_or_else(|| {
                EventsError::NotFound(format!(
                    "addon {} instance {} does not offer event constructors",
                    module,
                    handle.instance_id()
                ))
            })?;

        constructors
            .iter()
            .find(|constructor| constructor.unique_id() == resolution.constructor_id)
            .cloned()
            .ok_or_else(|| {
                EventsError::NotFound(format!(
                    "no event constructor with id {} was found on addon {} instance {}",
                    resolution.constructor_id,
                    module,
                    handle.instance_id()
                ))
            })
    }

    /// Build a new event from a constructor and user inputs
    ///
    /// The event gets a fresh id and has never been triggered.
    pub async fn construct_event(
        &self,
        resolution: &EventConstructorResolution,
        inputs: &[UserInputValue],
    ) -> EventsResult<Arc<dyn Event>> {
        let constructor = self.resolve_constructor(resolution).await?;

        let inputs = apply_defaults(constructor.inputs(), inputs);
        validate_inputs(constructor.inputs(), &inputs)
            .await
            .map_err(|source| EventsError::Validation {
                constructor: constructor.unique_id().to_string(),
                source,
            })?;
        self.check_variable_inputs(constructor.as_ref(), &inputs).await?;

        let metadata = EventMetadata::new(uuid::Uuid::new_v4().to_string());
        let event_id = metadata.unique_id.clone();

        let event = constructor
            .create_event(metadata, &inputs)
            .await
            .map_err(|source| EventsError::Capability {
                context: format!(
                    "event constructor {} of {} failed",
                    resolution.constructor_id, resolution.addon.module
                ),
                source,
            })?;

        info!(
            module = %resolution.addon.module,
            constructor = %resolution.constructor_id,
            event_id = %event_id,
            "Constructed event"
        );
        Ok(event)
    }
}

fn capability_error(
    handle: &AddonHandle,
    collection: &str,
    source: cq_core::CapabilityError,
) -> EventsError {
    EventsError::Capability {
        context: format!(
            "failed to fetch {} of addon {} instance {}",
            collection,
            handle.module(),
            handle.instance_id()
        ),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::EventState;
    use crate::variable_changed::VARIABLE_VALUE_CHANGED;
    use async_trait::async_trait;
    use cq_core::{
        Addon, AddonInitialiser, AddonMetadata, Capabilities, CapabilityResult,
        InitialiserMetadata, Variable, VariableEntry, VariableRef, WritableVariable,
    };
    use cq_addons::AddonsError;
    use cq_storage::MemoryAddonStore;
    use cq_variables::ReadWriteVariable;
    use serde_json::json;
    use std::sync::Mutex;

    struct Doorbell {
        metadata: AddonMetadata,
        pressed: Arc<EventState>,
        chime: Arc<ReadWriteVariable>,
        volume: Arc<ReadWriteVariable>,
    }

    #[async_trait]
    impl Addon for Doorbell {
        fn metadata(&self) -> &AddonMetadata {
            &self.metadata
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::none().with_variables().with_events()
        }

        async fn variables(&self) -> CapabilityResult<Vec<VariableEntry>> {
            let chime: Arc<dyn Variable> = self.chime.clone();
            let volume: Arc<dyn Variable> = self.volume.clone();
            Ok(vec![chime.into(), volume.into()])
        }

        async fn events(&self) -> CapabilityResult<Vec<Arc<dyn Event>>> {
            Ok(vec![self.pressed.clone() as Arc<dyn Event>])
        }
    }

    struct DoorbellInitialiser(InitialiserMetadata);

    #[async_trait]
    impl AddonInitialiser for DoorbellInitialiser {
        fn metadata(&self) -> &InitialiserMetadata {
            &self.0
        }

        async fn create_instance(
            &self,
            metadata: AddonMetadata,
            _inputs: &[UserInputValue],
        ) -> CapabilityResult<Arc<dyn Addon>> {
            let ringing = Arc::new(EventState::new(EventMetadata::new("ringing")));
            let ringing_event: Arc<dyn Event> = ringing.clone();
            Ok(Arc::new(Doorbell {
                metadata,
                pressed: Arc::new(EventState::new(EventMetadata::new("pressed"))),
                chime: Arc::new(
                    ReadWriteVariable::new("chime", "Chime", json!("ding")).with_events(vec![ringing_event]),
                ),
                volume: Arc::new(ReadWriteVariable::new("volume", "Volume", json!(5))),
            }))
        }
    }

    async fn setup() -> (EventsManager, Arc<cq_addons::AddonHandle>) {
        let addons = Arc::new(AddonsManager::new(Arc::new(MemoryAddonStore::new())));
        addons.register_initialiser(
            "doorbell",
            Arc::new(DoorbellInitialiser(
                InitialiserMetadata::new("Doorbell", "").multiple_instances(),
            )),
        );
        let handle = addons.create_instance("doorbell", Vec::new()).await.unwrap();
        (EventsManager::new(addons), handle)
    }

    fn resolution(variable_id: Option<&str>, event_id: &str) -> EventResolution {
        EventResolution {
            addon: AddonResolution::new("doorbell"),
            variable_id: variable_id.map(str::to_string),
            event_id: event_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_resolve_instance_event() {
        let (events, _) = setup().await;
        let event = events.resolve_event(&resolution(None, "pressed")).await.unwrap();
        assert_eq!(event.metadata().unique_id, "pressed");

        let err = events.resolve_event(&resolution(None, "missing")).await.unwrap_err();
        assert!(matches!(err, EventsError::NotFound(ref m) if m.contains("missing")));
    }

    #[tokio::test]
    async fn test_resolve_variable_event_stages() {
        let (events, _) = setup().await;

        let event = events
            .resolve_event(&resolution(Some("chime"), "ringing"))
            .await
            .unwrap();
        assert_eq!(event.metadata().unique_id, "ringing");

        let no_variable = events
            .resolve_event(&resolution(Some("siren"), "ringing"))
            .await
            .unwrap_err()
            .to_string();
        assert!(no_variable.contains("no variable with id siren"));

        let no_events = events
            .resolve_event(&resolution(Some("volume"), "ringing"))
            .await
            .unwrap_err()
            .to_string();
        assert!(no_events.contains("no events found on variable with id volume"));

        let no_event = events
            .resolve_event(&resolution(Some("chime"), "buzzing"))
            .await
            .unwrap_err()
            .to_string();
        assert!(no_event.contains("no event with id buzzing"));
    }

    #[tokio::test]
    async fn test_internal_events_not_resolvable() {
        let (events, _) = setup().await;
        let err = events
            .resolve_event(&EventResolution {
                addon: AddonResolution::new(INTERNAL_NAMESPACE),
                variable_id: None,
                event_id: "anything".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EventsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_addon_without_constructors() {
        let (events, _) = setup().await;
        let err = events
            .construct_event(
                &EventConstructorResolution {
                    addon: AddonResolution::new("doorbell"),
                    constructor_id: "schedule".to_string(),
                },
                &[],
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not offer event constructors"));
    }

    #[tokio::test]
    async fn test_construct_variable_value_changed() {
        let (events, handle) = setup().await;
        let resolution = EventConstructorResolution::internal(VARIABLE_VALUE_CHANGED);

        // Missing the required variable input
        let err = events.construct_event(&resolution, &[]).await.unwrap_err();
        match err {
            EventsError::Validation { source, .. } => assert_eq!(source.missing_inputs(), vec!["Variable"]),
            other => panic!("unexpected error: {other}"),
        }

        let reference = VariableRef::new("doorbell", "volume");
        let event = events
            .construct_event(&resolution, &[UserInputValue::new("variable", reference.to_value())])
            .await
            .unwrap();
        assert!(uuid::Uuid::parse_str(&event.metadata().unique_id).is_ok());
        assert!(event.metadata().last_triggered.is_none());

        let fired = Arc::new(Mutex::new(0));
        let counter = fired.clone();
        event.add_trigger_listener(Arc::new(move |_: &EventMetadata| {
            *counter.lock().unwrap() += 1;
        }));

        let volume = handle.find_variable("volume").await.unwrap().unwrap();
        volume.as_writable().unwrap().update_value(json!(7)).await.unwrap();

        assert_eq!(*fired.lock().unwrap(), 1);
        assert!(event.metadata().last_triggered.is_some());
    }

    async fn construct_watching(events: &EventsManager, reference: VariableRef) -> EventsError {
        events
            .construct_event(
                &EventConstructorResolution::internal(VARIABLE_VALUE_CHANGED),
                &[UserInputValue::new("variable", reference.to_value())],
            )
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_construct_with_unknown_variable() {
        let (events, _) = setup().await;
        let err = construct_watching(&events, VariableRef::new("doorbell", "siren")).await;
        assert!(matches!(err, EventsError::NotFound(ref m) if m.contains("siren")));
    }

    #[tokio::test]
    async fn test_construct_with_unknown_addon() {
        let (events, _) = setup().await;

        let err = construct_watching(&events, VariableRef::new("garage", "door")).await;
        assert!(matches!(err, EventsError::Addons(AddonsError::NotFound(_))));

        let err = construct_watching(
            &events,
            VariableRef::new("doorbell", "volume").with_instance("front"),
        )
        .await;
        assert!(matches!(err, EventsError::Addons(AddonsError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_construct_with_ambiguous_addon() {
        let (events, _) = setup().await;
        events.addons().create_instance("doorbell", Vec::new()).await.unwrap();

        let err = construct_watching(&events, VariableRef::new("doorbell", "volume")).await;
        assert!(matches!(
            err,
            EventsError::Addons(AddonsError::AmbiguousResolution { count: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_internal_constructor() {
        let (events, _) = setup().await;
        let err = events
            .construct_event(&EventConstructorResolution::internal("sunset"), &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sunset"));
    }
}
