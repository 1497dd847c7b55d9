use std::sync::Mutex;

use chrono::Utc;
use cq_core::{Event, EventMetadata, ListenerId, TriggerListener};
use cq_variables::ListenerSet;
use tracing::debug;

/// Trigger listeners and metadata of one event
///
/// Addons can hand out an `Arc<EventState>` as an event and call
/// [`EventState::fire`] when it happens.
pub struct EventState {
    metadata: Mutex<EventMetadata>,
    listeners: ListenerSet<TriggerListener>,
}

impl EventState {
    pub fn new(metadata: EventMetadata) -> Self {
        Self {
            metadata: Mutex::new(metadata),
            listeners: ListenerSet::new(),
        }
    }

    /// Stamp `last_triggered` and call every trigger listener
    pub fn fire(&self) {
        let metadata = {
            let mut metadata = self.metadata.lock().unwrap_or_else(|e| e.into_inner());
            metadata.last_triggered = Some(Utc::now());
            metadata.clone()
        };

        let listeners = self.listeners.snapshot();
        debug!(event_id = %metadata.unique_id, listeners = listeners.len(), "Event fired");

        for listener in listeners {
            listener(&metadata);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Event for EventState {
    fn metadata(&self) -> EventMetadata {
        self.metadata.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn add_trigger_listener(&self, listener: TriggerListener) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_trigger_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}
