//! Addons Manager
//!
//! Owns addon initialisers and the instances created from them.

use std::sync::Arc;

use cq_core::{apply_defaults, validate_inputs, AddonInitialiser, AddonMetadata, UserInputValue};
use cq_storage::{AddonRecord, AddonStore};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::{AddonsError, AddonsResult};
use crate::handle::AddonHandle;
use crate::loader::AddonLoader;

/// Identifies an addon instance by module and optional instance id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonResolution {
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl AddonResolution {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            instance_id: None,
        }
    }

    pub fn with_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }
}

/// Outcome of replaying persisted instance records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
}

/// Outcome of [`AddonsManager::load_addons`]
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Module names registered, in discovery order
    pub initialisers: Vec<String>,
    /// Messages of modules that failed to load
    pub load_errors: Vec<String>,
    pub restore: RestoreReport,
}

/// Addons Manager
///
/// - Registers initialisers by module name
/// - Creates instances, enforcing the single-instance policy and required inputs
/// - Resolves instances by module and instance id
/// - Persists new instances and restores them on startup
pub struct AddonsManager {
    store: Arc<dyn AddonStore>,

    /// module name -> initialiser
    initialisers: DashMap<String, Arc<dyn AddonInitialiser>>,

    /// module name -> live instances, in creation order
    instances: DashMap<String, Vec<Arc<AddonHandle>>>,

    /// Serialises instance creation per module
    creation_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AddonsManager {
    pub fn new(store: Arc<dyn AddonStore>) -> Self {
        Self {
            store,
            initialisers: DashMap::new(),
            instances: DashMap::new(),
            creation_locks: DashMap::new(),
        }
    }

    /// Register an initialiser, replacing any previous one for the module
    pub fn register_initialiser(&self, module: impl Into<String>, initialiser: Arc<dyn AddonInitialiser>) {
        let module = module.into();
        let name = initialiser.metadata().name.clone();

        if self.initialisers.insert(module.clone(), initialiser).is_some() {
            warn!(module = %module, "Addon initialiser registered twice, replacing the previous one");
        }

        info!(module = %module, name = %name, "Registered addon initialiser");
    }

    pub fn initialiser(&self, module: &str) -> Option<Arc<dyn AddonInitialiser>> {
        self.initialisers.get(module).map(|r| r.value().clone())
    }

    /// Every registered initialiser, sorted by module name
    pub fn initialisers(&self) -> Vec<(String, Arc<dyn AddonInitialiser>)> {
        let mut initialisers: Vec<_> = self
            .initialisers
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();
        initialisers.sort_by(|a, b| a.0.cmp(&b.0));
        initialisers
    }

    /// Live instances of a module, in creation order
    pub fn instances(&self, module: &str) -> Vec<Arc<AddonHandle>> {
        self.instances
            .get(module)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    pub fn all_instances(&self) -> Vec<Arc<AddonHandle>> {
        let mut modules: Vec<String> = self.instances.iter().map(|r| r.key().clone()).collect();
        modules.sort();
        modules.iter().flat_map(|module| self.instances(module)).collect()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.iter().map(|r| r.value().len()).sum()
    }

    fn creation_lock(&self, module: &str) -> Arc<Mutex<()>> {
        self.creation_locks
            .entry(module.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn require_initialiser(&self, module: &str) -> AddonsResult<Arc<dyn AddonInitialiser>> {
        self.initialiser(module)
            .ok_or_else(|| AddonsError::NotFound(format!("no module with the name {} was found", module)))
    }

    fn check_policy(&self, module: &str, initialiser: &dyn AddonInitialiser) -> AddonsResult<()> {
        let metadata = initialiser.metadata();
        if !metadata.supports_multiple_instances && !self.instances(module).is_empty() {
            return Err(AddonsError::PolicyViolation {
                module: module.to_string(),
                name: metadata.name.clone(),
            });
        }
        Ok(())
    }

    /// Create a new instance of `module` from user inputs
    ///
    /// The instance is persisted so it is restored on the next start; a
    /// persistence failure is logged and does not fail the creation.
    pub async fn create_instance(
        &self,
        module: &str,
        inputs: Vec<UserInputValue>,
    ) -> AddonsResult<Arc<AddonHandle>> {
        let initialiser = self.require_initialiser(module)?;

        let lock = self.creation_lock(module);
        let _guard = lock.lock().await;

        self.check_policy(module, initialiser.as_ref())?;

        let metadata = AddonMetadata {
            instance_id: uuid::Uuid::new_v4().to_string(),
            name: initialiser.metadata().name.clone(),
            user_provided_inputs: inputs,
        };
        let handle = self.instantiate(module, initialiser.as_ref(), metadata).await?;

        let record = AddonRecord {
            instance_id: handle.instance_id().to_string(),
            module_name: module.to_string(),
            display_name: handle.metadata().name.clone(),
            inputs: handle.metadata().user_provided_inputs.clone(),
        };
        if let Err(e) = self.store.create_addon_record(record).await {
            error!(
                module = %module,
                instance_id = %handle.instance_id(),
                error = %e,
                "Failed to persist addon instance"
            );
        }

        Ok(handle)
    }

    /// Validate inputs, build the instance and index it
    async fn instantiate(
        &self,
        module: &str,
        initialiser: &dyn AddonInitialiser,
        metadata: AddonMetadata,
    ) -> AddonsResult<Arc<AddonHandle>> {
        let schema = &initialiser.metadata().inputs;
        let inputs = apply_defaults(schema, &metadata.user_provided_inputs);

        validate_inputs(schema, &inputs)
            .await
            .map_err(|source| AddonsError::Validation {
                module: module.to_string(),
                name: initialiser.metadata().name.clone(),
                source,
            })?;

        let instance_id = metadata.instance_id.clone();
        let addon = initialiser
            .create_instance(metadata, &inputs)
            .await
            .map_err(|source| AddonsError::Creation {
                module: module.to_string(),
                instance_id: instance_id.clone(),
                source,
            })?;

        let handle = Arc::new(AddonHandle::new(module, addon));
        self.instances
            .entry(module.to_string())
            .or_default()
            .push(handle.clone());

        info!(
            module = %module,
            instance_id = %instance_id,
            name = %initialiser.metadata().name,
            "Created addon instance"
        );

        Ok(handle)
    }

    /// Find a live instance
    ///
    /// Without an instance id, the module must have exactly one instance.
    pub fn resolve_instance(&self, resolution: &AddonResolution) -> AddonsResult<Arc<AddonHandle>> {
        let module = &resolution.module;
        let instances = self.instances(module);

        if instances.is_empty() {
            return Err(AddonsError::NotFound(format!("no instance of addon {} found", module)));
        }

        match &resolution.instance_id {
            Some(instance_id) => instances
                .iter()
                .find(|handle| handle.instance_id() == instance_id)
                .cloned()
                .ok_or_else(|| {
                    AddonsError::NotFound(format!(
                        "found {} instances for addon {}, but none with instance id {}",
                        instances.len(),
                        module,
                        instance_id
                    ))
                }),
            None if instances.len() > 1 => Err(AddonsError::AmbiguousResolution {
                module: module.clone(),
                count: instances.len(),
            }),
            None => Ok(instances[0].clone()),
        }
    }

    /// Recreate instances from persisted records
    ///
    /// Records of unknown modules are skipped with a warning. A record that
    /// fails validation or creation is logged and skipped.
    pub async fn load_from_persisted_state(&self, records: Vec<AddonRecord>) -> RestoreReport {
        let mut report = RestoreReport::default();

        for record in records {
            let Some(initialiser) = self.initialiser(&record.module_name) else {
                warn!(
                    module = %record.module_name,
                    instance_id = %record.instance_id,
                    "Addon is stored but could not be found. Has it been uninstalled?"
                );
                report.skipped += 1;
                continue;
            };

            match self.restore(initialiser.as_ref(), record.clone()).await {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    error!(
                        module = %record.module_name,
                        instance_id = %record.instance_id,
                        error = %e,
                        "Failed to restore stored addon instance"
                    );
                    report.skipped += 1;
                }
            }
        }

        info!(restored = report.restored, skipped = report.skipped, "Restored addon instances");
        report
    }

    async fn restore(
        &self,
        initialiser: &dyn AddonInitialiser,
        record: AddonRecord,
    ) -> AddonsResult<Arc<AddonHandle>> {
        let module = record.module_name;
        let lock = self.creation_lock(&module);
        let _guard = lock.lock().await;

        if self
            .instances(&module)
            .iter()
            .any(|handle| handle.instance_id() == record.instance_id)
        {
            debug!(module = %module, instance_id = %record.instance_id, "Instance already live");
            return Err(AddonsError::AlreadyLive {
                module,
                instance_id: record.instance_id,
            });
        }
        self.check_policy(&module, initialiser)?;

        debug!(module = %module, instance_id = %record.instance_id, "Restoring addon instance");

        let metadata = AddonMetadata {
            instance_id: record.instance_id,
            name: record.display_name,
            user_provided_inputs: record.inputs,
        };
        self.instantiate(&module, initialiser, metadata).await
    }

    /// Register every discovered module, then restore persisted instances
    pub async fn load_addons(&self, loader: &dyn AddonLoader) -> AddonsResult<LoadReport> {
        info!("Loading addons");

        let (modules, errors) = loader.discover_addons().await;

        let mut report = LoadReport::default();
        for e in errors {
            error!(module = %e.module(), error = %e, "Error loading addon module");
            report.load_errors.push(e.to_string());
        }

        for module in modules {
            self.register_initialiser(module.module_name.clone(), module.initialiser);
            report.initialisers.push(module.module_name);
        }

        let records = self.store.retrieve_all_addon_records().await?;
        report.restore = self.load_from_persisted_state(records).await;

        Ok(report)
    }

    /// Drop every live instance
    pub fn shutdown(&self) {
        let count = self.instance_count();
        self.instances.clear();
        info!(instances = count, "Addon instances shut down");
    }
}
