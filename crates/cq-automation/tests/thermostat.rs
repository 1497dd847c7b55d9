//! Thermostat automation across a restart

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cq_addons::{AddonResolution, AddonsManager, StaticAddonLoader};
use cq_automation::{
    ActionStep, AutomationManager, AutomationOptions, ConditionStep, EventListener,
    JsonEventListenerStore,
};
use cq_core::{
    Action, Addon, AddonInitialiser, AddonMetadata, Capabilities, CapabilityResult,
    InitialiserMetadata, UserInputValue, Variable, VariableEntry, WritableVariable,
};
use cq_events::EventsManager;
use cq_storage::{JsonAddonStore, Storage};
use cq_variables::ReadWriteVariable;
use serde_json::json;
use tempfile::TempDir;

type FanLog = Arc<Mutex<Vec<&'static str>>>;

struct Thermostat {
    metadata: AddonMetadata,
    temperature: Arc<ReadWriteVariable>,
    fan: FanLog,
}

struct Fan {
    id: &'static str,
    log: FanLog,
}

#[async_trait]
impl Action for Fan {
    fn unique_id(&self) -> &str {
        self.id
    }

    async fn perform(&self, _inputs: &[UserInputValue]) -> CapabilityResult<()> {
        self.log.lock().unwrap().push(self.id);
        Ok(())
    }
}

#[async_trait]
impl Addon for Thermostat {
    fn metadata(&self) -> &AddonMetadata {
        &self.metadata
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_variables().with_actions()
    }

    async fn variables(&self) -> CapabilityResult<Vec<VariableEntry>> {
        let temperature: Arc<dyn Variable> = self.temperature.clone();
        Ok(vec![temperature.into()])
    }

    async fn actions(&self) -> CapabilityResult<Vec<Arc<dyn Action>>> {
        Ok(vec![
            Arc::new(Fan {
                id: "fan_on",
                log: self.fan.clone(),
            }),
            Arc::new(Fan {
                id: "fan_off",
                log: self.fan.clone(),
            }),
        ])
    }
}

struct ThermostatInitialiser {
    metadata: InitialiserMetadata,
    fan: FanLog,
}

#[async_trait]
impl AddonInitialiser for ThermostatInitialiser {
    fn metadata(&self) -> &InitialiserMetadata {
        &self.metadata
    }

    async fn create_instance(
        &self,
        metadata: AddonMetadata,
        _inputs: &[UserInputValue],
    ) -> CapabilityResult<Arc<dyn Addon>> {
        Ok(Arc::new(Thermostat {
            metadata,
            temperature: Arc::new(ReadWriteVariable::new("temp", "Temperature", json!(20))),
            fan: self.fan.clone(),
        }))
    }
}

struct Host {
    addons: Arc<AddonsManager>,
    automations: AutomationManager,
}

async fn start(temp_dir: &TempDir, fan: &FanLog) -> Host {
    let storage = Storage::new(temp_dir.path());
    let addons = Arc::new(AddonsManager::new(Arc::new(JsonAddonStore::new(storage.clone()))));
    let loader = StaticAddonLoader::new().with_initialiser(
        "thermostat",
        Arc::new(ThermostatInitialiser {
            metadata: InitialiserMetadata::new("Thermostat", "Temperature with a fan"),
            fan: fan.clone(),
        }),
    );
    addons.load_addons(&loader).await.unwrap();

    let events = Arc::new(EventsManager::new(addons.clone()));
    let automations = AutomationManager::new(
        addons.clone(),
        events,
        AutomationOptions::default(),
        Arc::new(JsonEventListenerStore::new(storage)),
    );
    automations.load().await.unwrap();

    Host {
        addons,
        automations,
    }
}

async fn set_temperature(host: &Host, value: serde_json::Value) {
    let handle = host
        .addons
        .resolve_instance(&AddonResolution::new("thermostat"))
        .unwrap();
    let variable = handle.find_variable("temp").await.unwrap().unwrap();
    variable
        .as_writable()
        .unwrap()
        .update_value(value)
        .await
        .unwrap();
}

fn cooling() -> EventListener {
    EventListener::new("thermostat", "temp")
        .with_step(
            ConditionStep::new("numeric_gt")
                .with_input("rhs_input", json!(22))
                .then(ActionStep::new("fan_on")),
        )
        .with_step(
            ConditionStep::new("numeric_lte")
                .with_input("rhs_input", json!(22))
                .then(ActionStep::new("fan_off")),
        )
}

#[tokio::test]
async fn test_thermostat_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let fan: FanLog = Arc::new(Mutex::new(Vec::new()));

    let host = start(&temp_dir, &fan).await;
    host.addons.create_instance("thermostat", Vec::new()).await.unwrap();

    let listener = cooling();
    let listener_id = listener.id.clone();
    host.automations.add(listener).await.unwrap();

    let mut passes = host.automations.subscribe();
    set_temperature(&host, json!(25)).await;
    let pass = passes.recv().await.unwrap();
    assert_eq!(pass.listener_id, listener_id);
    assert_eq!(pass.report.actions_performed, vec!["fan_on"]);

    host.automations.shutdown();
    host.addons.shutdown();
    drop(host);

    // Same storage directory, fresh host
    let host = start(&temp_dir, &fan).await;
    assert!(host.automations.is_armed(&listener_id));

    let mut passes = host.automations.subscribe();
    set_temperature(&host, json!(21)).await;
    let pass = passes.recv().await.unwrap();
    assert_eq!(pass.report.actions_performed, vec!["fan_off"]);

    assert_eq!(*fan.lock().unwrap(), vec!["fan_on", "fan_off"]);
}

#[tokio::test]
async fn test_listener_for_missing_addon_is_not_armed() {
    let temp_dir = TempDir::new().unwrap();
    let fan: FanLog = Arc::new(Mutex::new(Vec::new()));
    let host = start(&temp_dir, &fan).await;

    // No thermostat instance was created
    assert!(host.automations.add(cooling()).await.is_err());
    assert!(host.automations.listeners().is_empty());
}
