//! Arms persisted automations on their trigger events

use std::sync::{Arc, Weak};
use std::time::Duration;

use cq_addons::AddonsManager;
use cq_core::{EventMetadata, ListenerId};
use cq_events::EventsManager;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::builder::ChainBuilder;
use crate::error::{AutomationError, AutomationResult};
use crate::evaluator::{EvaluationReport, Evaluator, EvaluatorOptions};
use crate::link::Chain;
use crate::listener::{EventListener, EventListenerStore};

const REPORT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct AutomationOptions {
    pub call_timeout: Option<Duration>,
    /// Deepest nesting of condition steps a listener may use
    pub max_depth: usize,
}

impl Default for AutomationOptions {
    fn default() -> Self {
        Self {
            call_timeout: None,
            max_depth: 32,
        }
    }
}

/// Outcome of a pass started by a trigger
#[derive(Debug, Clone)]
pub struct PassReport {
    pub listener_id: String,
    pub report: EvaluationReport,
}

struct Armed {
    definition: EventListener,
    chain: Arc<Chain>,
    trigger_id: ListenerId,
}

impl Armed {
    /// Stop reacting to the trigger, handing back what was armed
    fn disarm(self) -> (EventListener, Arc<Chain>) {
        self.chain
            .starting_event()
            .remove_trigger_listener(self.trigger_id);
        (self.definition, self.chain)
    }
}

/// Keeps every event listener armed
///
/// Each trigger spawns its own evaluation pass; passes of the same or
/// different listeners may overlap.
pub struct AutomationManager {
    builder: ChainBuilder,
    evaluator: Arc<Evaluator>,
    store: Arc<dyn EventListenerStore>,
    armed: DashMap<String, Armed>,
    reports: broadcast::Sender<PassReport>,
}

impl AutomationManager {
    pub fn new(
        addons: Arc<AddonsManager>,
        events: Arc<EventsManager>,
        options: AutomationOptions,
        store: Arc<dyn EventListenerStore>,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            builder: ChainBuilder::new(addons, events, options.max_depth),
            evaluator: Arc::new(Evaluator::new(EvaluatorOptions {
                call_timeout: options.call_timeout,
            })),
            store,
            armed: DashMap::new(),
            reports,
        }
    }

    /// Receive a [`PassReport`] for every triggered pass
    pub fn subscribe(&self) -> broadcast::Receiver<PassReport> {
        self.reports.subscribe()
    }

    pub fn is_armed(&self, id: &str) -> bool {
        self.armed.contains_key(id)
    }

    /// Definitions of the armed listeners, ordered by id
    pub fn listeners(&self) -> Vec<EventListener> {
        let mut listeners: Vec<EventListener> = self
            .armed
            .iter()
            .map(|entry| entry.definition.clone())
            .collect();
        listeners.sort_by(|a, b| a.id.cmp(&b.id));
        listeners
    }

    /// Build, arm and persist a new listener
    pub async fn add(&self, listener: EventListener) -> AutomationResult<()> {
        if self.armed.contains_key(&listener.id) {
            return Err(AutomationError::AlreadyExists(listener.id));
        }

        let chain = Arc::new(self.builder.build(&listener).await?);
        let id = listener.id.clone();

        match self.armed.entry(id.clone()) {
            Entry::Occupied(_) => return Err(AutomationError::AlreadyExists(id)),
            Entry::Vacant(slot) => {
                let armed = self.arm(listener.clone(), chain)?;
                slot.insert(armed);
            }
        }

        if let Err(e) = self.store.save_event_listener(listener).await {
            error!(listener_id = %id, error = %e, "Failed to persist event listener");
            if let Some((_, armed)) = self.armed.remove(&id) {
                armed.disarm();
            }
            return Err(e.into());
        }

        info!(listener_id = %id, "Event listener added");
        Ok(())
    }

    /// Swap the definition of an armed listener
    ///
    /// If the new definition fails to build or to persist, the old one stays
    /// armed.
    pub async fn replace(&self, listener: EventListener) -> AutomationResult<()> {
        if !self.armed.contains_key(&listener.id) {
            return Err(AutomationError::NotFound(format!(
                "no event listener with id {}",
                listener.id
            )));
        }

        let chain = Arc::new(self.builder.build(&listener).await?);
        let id = listener.id.clone();
        let armed = self.arm(listener.clone(), chain)?;
        let previous = self
            .armed
            .insert(id.clone(), armed)
            .map(Armed::disarm);

        if let Err(e) = self.store.save_event_listener(listener).await {
            error!(listener_id = %id, error = %e, "Failed to persist event listener, restoring previous definition");
            if let Some((_, armed)) = self.armed.remove(&id) {
                armed.disarm();
            }
            if let Some((definition, chain)) = previous {
                let restored = self.arm(definition, chain)?;
                self.armed.insert(id, restored);
            }
            return Err(e.into());
        }

        info!(listener_id = %id, "Event listener replaced");
        Ok(())
    }

    /// Disarm and delete a listener
    pub async fn remove(&self, id: &str) -> AutomationResult<()> {
        let was_armed = match self.armed.remove(id) {
            Some((_, armed)) => {
                armed.disarm();
                true
            }
            None => false,
        };

        let was_stored = self.store.remove_event_listener(id).await?;
        if !was_armed && !was_stored {
            return Err(AutomationError::NotFound(format!(
                "no event listener with id {}",
                id
            )));
        }

        info!(listener_id = %id, "Event listener removed");
        Ok(())
    }

    /// Arm every persisted listener
    ///
    /// Listeners that fail to build are logged and skipped. Returns how many
    /// were armed.
    pub async fn load(&self) -> AutomationResult<usize> {
        let listeners = self.store.retrieve_all_event_listeners().await?;
        let total = listeners.len();
        let mut loaded = 0;

        for listener in listeners {
            if self.armed.contains_key(&listener.id) {
                debug!(listener_id = %listener.id, "Event listener already armed");
                continue;
            }

            let chain = match self.builder.build(&listener).await {
                Ok(chain) => Arc::new(chain),
                Err(e) => {
                    warn!(listener_id = %listener.id, error = %e, "Skipping event listener");
                    continue;
                }
            };

            let id = listener.id.clone();
            let armed = self.arm(listener, chain)?;
            self.armed.insert(id, armed);
            loaded += 1;
        }

        info!(loaded, total, "Event listeners loaded");
        Ok(loaded)
    }

    /// Evaluate a listener's chain now, without waiting for its trigger
    pub async fn run_now(&self, id: &str) -> AutomationResult<EvaluationReport> {
        let chain = self
            .armed
            .get(id)
            .map(|entry| entry.chain.clone())
            .ok_or_else(|| AutomationError::NotFound(format!("no event listener with id {}", id)))?;

        debug!(listener_id = %id, "Running event listener on demand");
        Ok(self.evaluator.run_chain(&chain).await)
    }

    /// Disarm every listener; persisted definitions are kept
    pub fn shutdown(&self) {
        let ids: Vec<String> = self.armed.iter().map(|entry| entry.key().clone()).collect();
        for id in &ids {
            if let Some((_, armed)) = self.armed.remove(id) {
                armed.disarm();
            }
        }
        info!(disarmed = ids.len(), "Automation manager shut down");
    }

    fn arm(&self, definition: EventListener, chain: Arc<Chain>) -> AutomationResult<Armed> {
        let runtime = Handle::try_current().map_err(|e| AutomationError::Runtime(e.to_string()))?;

        let weak: Weak<Chain> = Arc::downgrade(&chain);
        let evaluator = self.evaluator.clone();
        let reports = self.reports.clone();
        let listener_id = definition.id.clone();

        let trigger_id = chain
            .starting_event()
            .add_trigger_listener(Arc::new(move |metadata: &EventMetadata| {
                let Some(chain) = weak.upgrade() else {
                    return;
                };
                debug!(
                    listener_id = %listener_id,
                    event_id = %metadata.unique_id,
                    "Trigger fired, starting pass"
                );

                let evaluator = evaluator.clone();
                let reports = reports.clone();
                let listener_id = listener_id.clone();
                runtime.spawn(async move {
                    let report = evaluator.run_chain(&chain).await;
                    if !report.is_clean() {
                        warn!(
                            listener_id = %listener_id,
                            failures = report.failures.len(),
                            "Evaluation pass finished with failures"
                        );
                    }
                    // No subscribers is fine
                    let _ = reports.send(PassReport {
                        listener_id,
                        report,
                    });
                });
            }));

        debug!(listener_id = %definition.id, "Armed event listener");
        Ok(Armed {
            definition,
            chain,
            trigger_id,
        })
    }
}

impl Drop for AutomationManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{ActionStep, ConditionStep, MemoryEventListenerStore};
    use async_trait::async_trait;
    use cq_core::{
        Action, Addon, AddonInitialiser, AddonMetadata, Capabilities, CapabilityResult,
        InitialiserMetadata, UserInputValue, VariableEntry, WritableVariable,
    };
    use cq_storage::{MemoryAddonStore, StorageError, StorageResult};
    use cq_variables::ReadWriteVariable;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Heater {
        metadata: AddonMetadata,
        temperature: Arc<ReadWriteVariable>,
        runs: Arc<AtomicUsize>,
        overlap: Arc<Overlap>,
    }

    /// Tracks how many slow heats run at once
    #[derive(Default)]
    struct Overlap {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    struct HeatSlowly(Arc<Overlap>);

    #[async_trait]
    impl Action for HeatSlowly {
        fn unique_id(&self) -> &str {
            "heat_slowly"
        }

        async fn perform(&self, _inputs: &[UserInputValue]) -> CapabilityResult<()> {
            let running = self.0.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.0.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Heat(Arc<AtomicUsize>);

    #[async_trait]
    impl Action for Heat {
        fn unique_id(&self) -> &str {
            "heat"
        }

        async fn perform(&self, _inputs: &[UserInputValue]) -> CapabilityResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Addon for Heater {
        fn metadata(&self) -> &AddonMetadata {
            &self.metadata
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::none().with_variables().with_actions()
        }

        async fn variables(&self) -> CapabilityResult<Vec<VariableEntry>> {
            Ok(vec![VariableEntry::Variable(self.temperature.clone())])
        }

        async fn actions(&self) -> CapabilityResult<Vec<Arc<dyn Action>>> {
            Ok(vec![
                Arc::new(Heat(self.runs.clone())),
                Arc::new(HeatSlowly(self.overlap.clone())),
            ])
        }
    }

    struct HeaterInitialiser {
        metadata: InitialiserMetadata,
        temperature: Arc<ReadWriteVariable>,
        runs: Arc<AtomicUsize>,
        overlap: Arc<Overlap>,
    }

    #[async_trait]
    impl AddonInitialiser for HeaterInitialiser {
        fn metadata(&self) -> &InitialiserMetadata {
            &self.metadata
        }

        async fn create_instance(
            &self,
            metadata: AddonMetadata,
            _inputs: &[UserInputValue],
        ) -> CapabilityResult<Arc<dyn Addon>> {
            Ok(Arc::new(Heater {
                metadata,
                temperature: self.temperature.clone(),
                runs: self.runs.clone(),
                overlap: self.overlap.clone(),
            }))
        }
    }

    /// Memory store whose saves can be made to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryEventListenerStore,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl EventListenerStore for FlakyStore {
        async fn save_event_listener(&self, listener: EventListener) -> StorageResult<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.inner.save_event_listener(listener).await
        }

        async fn remove_event_listener(&self, id: &str) -> StorageResult<bool> {
            self.inner.remove_event_listener(id).await
        }

        async fn retrieve_all_event_listeners(&self) -> StorageResult<Vec<EventListener>> {
            self.inner.retrieve_all_event_listeners().await
        }
    }

    struct Fixture {
        manager: AutomationManager,
        store: Arc<FlakyStore>,
        temperature: Arc<ReadWriteVariable>,
        runs: Arc<AtomicUsize>,
        overlap: Arc<Overlap>,
    }

    async fn fixture() -> Fixture {
        let addons = Arc::new(AddonsManager::new(Arc::new(MemoryAddonStore::new())));
        let temperature = Arc::new(ReadWriteVariable::new("temp", "Temperature", json!(18)));
        let runs = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(Overlap::default());
        addons.register_initialiser(
            "heater",
            Arc::new(HeaterInitialiser {
                metadata: InitialiserMetadata::new("Heater", "Keeps the room warm"),
                temperature: temperature.clone(),
                runs: runs.clone(),
                overlap: overlap.clone(),
            }),
        );
        addons.create_instance("heater", Vec::new()).await.unwrap();

        let events = Arc::new(EventsManager::new(addons.clone()));
        let store = Arc::new(FlakyStore::default());
        Fixture {
            manager: AutomationManager::new(
                addons,
                events,
                AutomationOptions::default(),
                store.clone(),
            ),
            store,
            temperature,
            runs,
            overlap,
        }
    }

    fn heat_when_cold(id: &str) -> EventListener {
        EventListener::new("heater", "temp").with_id(id).with_step(
            ConditionStep::new("numeric_lt")
                .with_input("rhs_input", json!(20))
                .then(ActionStep::new("heat")),
        )
    }

    #[tokio::test]
    async fn test_add_arms_and_persists() {
        let fixture = fixture().await;
        let mut passes = fixture.manager.subscribe();

        fixture.manager.add(heat_when_cold("a")).await.unwrap();
        assert!(fixture.manager.is_armed("a"));
        assert_eq!(fixture.store.retrieve_all_event_listeners().await.unwrap().len(), 1);

        fixture.temperature.update_value(json!(17)).await.unwrap();
        let pass = passes.recv().await.unwrap();
        assert_eq!(pass.listener_id, "a");
        assert_eq!(pass.report.actions_performed, vec!["heat"]);

        fixture.temperature.update_value(json!(23)).await.unwrap();
        let pass = passes.recv().await.unwrap();
        assert!(pass.report.actions_performed.is_empty());
        assert_eq!(fixture.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_add_twice_rejected() {
        let fixture = fixture().await;
        fixture.manager.add(heat_when_cold("a")).await.unwrap();

        let err = fixture.manager.add(heat_when_cold("a")).await.unwrap_err();
        assert!(matches!(err, AutomationError::AlreadyExists(_)));
        assert_eq!(fixture.temperature.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_disarms() {
        let fixture = fixture().await;
        fixture.manager.add(heat_when_cold("a")).await.unwrap();
        fixture.manager.remove("a").await.unwrap();

        assert!(!fixture.manager.is_armed("a"));
        assert_eq!(fixture.temperature.listener_count(), 0);
        assert!(fixture.store.retrieve_all_event_listeners().await.unwrap().is_empty());

        let err = fixture.manager.remove("a").await.unwrap_err();
        assert!(matches!(err, AutomationError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_old_chain() {
        let fixture = fixture().await;
        fixture.manager.add(heat_when_cold("a")).await.unwrap();

        let broken = EventListener::new("heater", "temp")
            .with_id("a")
            .with_step(ActionStep::new("cool"));
        assert!(fixture.manager.replace(broken).await.is_err());

        let report = fixture.manager.run_now("a").await.unwrap();
        assert_eq!(report.actions_performed, vec!["heat"]);
        assert_eq!(fixture.temperature.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_replace_swaps_chain() {
        let fixture = fixture().await;
        fixture.manager.add(heat_when_cold("a")).await.unwrap();

        let always = EventListener::new("heater", "temp")
            .with_id("a")
            .with_step(ActionStep::new("heat"))
            .with_step(ActionStep::new("heat"));
        fixture.manager.replace(always.clone()).await.unwrap();

        let report = fixture.manager.run_now("a").await.unwrap();
        assert_eq!(report.actions_performed.len(), 2);
        assert_eq!(fixture.manager.listeners(), vec![always]);
        // The old trigger let go of the variable
        assert_eq!(fixture.temperature.listener_count(), 1);

        let missing = EventListener::new("heater", "temp").with_id("b");
        assert!(matches!(
            fixture.manager.replace(missing).await,
            Err(AutomationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_restores_previous_when_save_fails() {
        let fixture = fixture().await;
        let mut passes = fixture.manager.subscribe();
        fixture.manager.add(heat_when_cold("a")).await.unwrap();

        fixture.store.fail_saves.store(true, Ordering::SeqCst);
        let always = EventListener::new("heater", "temp")
            .with_id("a")
            .with_step(ActionStep::new("heat"))
            .with_step(ActionStep::new("heat"));
        let err = fixture.manager.replace(always).await.unwrap_err();
        assert!(matches!(err, AutomationError::Storage(_)));

        assert_eq!(fixture.manager.listeners(), vec![heat_when_cold("a")]);
        assert_eq!(fixture.temperature.listener_count(), 1);

        // Still driven by the old definition
        fixture.temperature.update_value(json!(25)).await.unwrap();
        let pass = passes.recv().await.unwrap();
        assert!(pass.report.actions_performed.is_empty());
        assert_eq!(
            fixture.store.retrieve_all_event_listeners().await.unwrap(),
            vec![heat_when_cold("a")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_triggers_run_independent_passes() {
        let fixture = fixture().await;
        let mut passes = fixture.manager.subscribe();
        let listener = EventListener::new("heater", "temp")
            .with_id("slow")
            .with_step(ActionStep::new("heat_slowly"))
            .with_step(ActionStep::new("heat"));
        fixture.manager.add(listener).await.unwrap();

        // The second change arrives while the first pass is still heating
        fixture.temperature.update_value(json!(17)).await.unwrap();
        fixture.temperature.update_value(json!(16)).await.unwrap();

        for _ in 0..2 {
            let pass = passes.recv().await.unwrap();
            assert_eq!(pass.listener_id, "slow");
            assert_eq!(pass.report.actions_performed, vec!["heat_slowly", "heat"]);
            assert!(pass.report.is_clean());
        }
        assert_eq!(fixture.overlap.peak.load(Ordering::SeqCst), 2);
        assert_eq!(fixture.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_load_skips_broken() {
        let fixture = fixture().await;
        fixture.store.save_event_listener(heat_when_cold("a")).await.unwrap();
        fixture
            .store
            .save_event_listener(EventListener::new("boiler", "temp").with_id("b"))
            .await
            .unwrap();

        assert_eq!(fixture.manager.load().await.unwrap(), 1);
        assert!(fixture.manager.is_armed("a"));
        assert!(!fixture.manager.is_armed("b"));

        fixture.manager.shutdown();
        assert!(!fixture.manager.is_armed("a"));
        assert_eq!(fixture.temperature.listener_count(), 0);
        // Definitions survive shutdown
        assert_eq!(fixture.store.retrieve_all_event_listeners().await.unwrap().len(), 2);
    }

    #[test]
    fn test_arm_requires_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let fixture = runtime.block_on(fixture());
        let chain = runtime
            .block_on(fixture.manager.builder.build(&heat_when_cold("a")))
            .unwrap();

        let err = fixture
            .manager
            .arm(heat_when_cold("a"), Arc::new(chain))
            .err()
            .unwrap();
        assert!(matches!(err, AutomationError::Runtime(_)));
    }
}
