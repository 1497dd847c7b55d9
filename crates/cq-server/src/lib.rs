//! The Consequences host
//!
//! Wires storage, the addon registry, event resolution and automations
//! together, and owns their lifecycle.

mod error;

use std::sync::Arc;

use cq_addons::{AddonLoader, AddonsManager, LoadReport};
use cq_automation::{AutomationManager, AutomationOptions, JsonEventListenerStore};
use cq_components::builtin_loader;
use cq_config::ConsequencesConfig;
use cq_events::EventsManager;
use cq_storage::{JsonAddonStore, Storage};
use tracing::info;

pub use error::{ServerError, ServerResult};

/// The central Consequences instance
pub struct Consequences {
    config: ConsequencesConfig,
    addons: Arc<AddonsManager>,
    events: Arc<EventsManager>,
    automations: AutomationManager,
}

impl Consequences {
    pub fn new(config: ConsequencesConfig) -> Self {
        let storage = Storage::new(config.storage_dir());
        info!(storage_dir = ?storage.storage_dir(), "Using storage");

        let addons = Arc::new(AddonsManager::new(Arc::new(JsonAddonStore::new(
            storage.clone(),
        ))));
        let events = Arc::new(EventsManager::new(addons.clone()));
        let automations = AutomationManager::new(
            addons.clone(),
            events.clone(),
            AutomationOptions {
                call_timeout: config.automation.call_timeout(),
                max_depth: config.automation.max_depth,
            },
            Arc::new(JsonEventListenerStore::new(storage)),
        );

        Self {
            config,
            addons,
            events,
            automations,
        }
    }

    pub fn config(&self) -> &ConsequencesConfig {
        &self.config
    }

    pub fn addons(&self) -> &Arc<AddonsManager> {
        &self.addons
    }

    pub fn events(&self) -> &Arc<EventsManager> {
        &self.events
    }

    pub fn automations(&self) -> &AutomationManager {
        &self.automations
    }

    /// Register modules from `loader` and restore persisted instances
    pub async fn load_addons(&self, loader: &dyn AddonLoader) -> ServerResult<LoadReport> {
        let report = self.addons.load_addons(loader).await?;

        info!(
            modules = report.initialisers.len(),
            load_errors = report.load_errors.len(),
            restored = report.restore.restored,
            skipped = report.restore.skipped,
            "Addons loaded"
        );
        Ok(report)
    }

    /// Load the built-in addons, then arm persisted automations
    pub async fn start(&self) -> ServerResult<()> {
        let loader = builtin_loader().with_disabled(self.config.addons.disabled.iter().cloned());
        self.load_addons(&loader).await?;

        let armed = self.automations.load().await?;
        info!(armed, "Consequences started");
        Ok(())
    }

    /// Disarm automations and drop every addon instance
    ///
    /// Persisted state is left untouched.
    pub fn shutdown(&self) {
        self.automations.shutdown();
        self.addons.shutdown();
        info!("Consequences stopped");
    }
}
