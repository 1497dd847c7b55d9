//! Light switch lifecycle: create, persist, restart, restore

use std::sync::Arc;

use async_trait::async_trait;
use cq_addons::{AddonResolution, AddonsError, AddonsManager, StaticAddonLoader};
use cq_core::{
    find_input, Addon, AddonInitialiser, AddonMetadata, Capabilities, CapabilityResult,
    InitialiserMetadata, InputKind, UserInput, UserInputValue, Variable, VariableEntry,
};
use cq_storage::{JsonAddonStore, Storage};
use cq_variables::ReadWriteVariable;
use serde_json::json;
use tempfile::TempDir;

struct LightSwitch {
    metadata: AddonMetadata,
    state: Arc<ReadWriteVariable>,
}

#[async_trait]
impl Addon for LightSwitch {
    fn metadata(&self) -> &AddonMetadata {
        &self.metadata
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with_variables()
    }

    async fn variables(&self) -> CapabilityResult<Vec<VariableEntry>> {
        let state: Arc<dyn Variable> = self.state.clone();
        Ok(vec![state.into()])
    }
}

struct LightSwitchInitialiser {
    metadata: InitialiserMetadata,
}

impl LightSwitchInitialiser {
    fn new() -> Self {
        Self {
            metadata: InitialiserMetadata::new("Light Switch", "A single switch")
                .with_inputs(vec![UserInput::new("enabled", InputKind::Boolean).required()]),
        }
    }
}

#[async_trait]
impl AddonInitialiser for LightSwitchInitialiser {
    fn metadata(&self) -> &InitialiserMetadata {
        &self.metadata
    }

    async fn create_instance(
        &self,
        metadata: AddonMetadata,
        inputs: &[UserInputValue],
    ) -> CapabilityResult<Arc<dyn Addon>> {
        let enabled = find_input(inputs, "enabled").cloned().unwrap_or(json!(false));
        Ok(Arc::new(LightSwitch {
            metadata,
            state: Arc::new(ReadWriteVariable::new("on", "On", enabled)),
        }))
    }
}

fn loader() -> StaticAddonLoader {
    StaticAddonLoader::new().with_initialiser("light-switch", Arc::new(LightSwitchInitialiser::new()))
}

#[tokio::test]
async fn test_light_switch_lifecycle() {
    let temp_dir = TempDir::new().unwrap();

    let manager = AddonsManager::new(Arc::new(JsonAddonStore::new(Storage::new(temp_dir.path()))));
    let report = manager.load_addons(&loader()).await.unwrap();
    assert_eq!(report.initialisers, vec!["light-switch"]);
    assert_eq!(report.restore.restored, 0);

    // Missing required input
    let err = manager.create_instance("light-switch", Vec::new()).await.unwrap_err();
    match &err {
        AddonsError::Validation { source, .. } => assert_eq!(source.missing_inputs(), vec!["enabled"]),
        other => panic!("unexpected error: {other}"),
    }

    let instance = manager
        .create_instance("light-switch", vec![UserInputValue::new("enabled", json!(true))])
        .await
        .unwrap();
    let instance_id = instance.instance_id().to_string();
    assert!(uuid::Uuid::parse_str(&instance_id).is_ok());

    let state = instance.find_variable("on").await.unwrap().unwrap();
    assert_eq!(state.retrieve_value().await.unwrap(), json!(true));

    let err = manager
        .create_instance("light-switch", vec![UserInputValue::new("enabled", json!(false))])
        .await
        .unwrap_err();
    assert!(matches!(err, AddonsError::PolicyViolation { .. }));

    manager.shutdown();

    // A fresh host restores the instance with the same identity
    let restarted = AddonsManager::new(Arc::new(JsonAddonStore::new(Storage::new(temp_dir.path()))));
    let report = restarted.load_addons(&loader()).await.unwrap();
    assert_eq!(report.restore.restored, 1);

    let restored = restarted
        .resolve_instance(&AddonResolution::new("light-switch"))
        .unwrap();
    assert_eq!(restored.instance_id(), instance_id);
    assert_eq!(restored.metadata().name, "Light Switch");

    let state = restored.find_variable("on").await.unwrap().unwrap();
    assert_eq!(state.retrieve_value().await.unwrap(), json!(true));
}
