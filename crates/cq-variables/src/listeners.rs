//! Ordered listener sets

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use cq_core::{ChangeListener, ListenerId};
use serde_json::Value;
use tracing::trace;

/// An ordered set of callbacks
///
/// Every registration gets a fresh [`ListenerId`], so registering the same
/// callback twice yields two independent registrations and removing one id
/// removes exactly that registration.
pub struct ListenerSet<L> {
    /// Counter for generating unique listener IDs
    next_id: AtomicU64,
    /// Registered listeners in registration order
    entries: Mutex<Vec<(ListenerId, L)>>,
}

impl<L: Clone> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a listener at the end of the set
    pub fn add(&self, listener: L) -> ListenerId {
        let id = ListenerId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.lock().push((id, listener));
        trace!(listener_id = id.value(), "Listener added");
        id
    }

    /// Remove a registration, returning whether it existed
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        let removed = entries.len() != before;
        trace!(listener_id = id.value(), removed, "Listener removed");
        removed
    }

    /// Listeners registered right now, in order
    ///
    /// Dispatch iterates over this copy with the lock released, so callbacks
    /// may freely add or remove listeners.
    pub fn snapshot(&self) -> Vec<L> {
        self.lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, L)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<L: Clone> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerSet<ChangeListener> {
    /// Call every listener with `value`
    ///
    /// A failing listener does not stop the others. The messages of all
    /// failures are returned together.
    pub fn notify(&self, value: &Value) -> Result<(), Vec<String>> {
        let failures: Vec<String> = self
            .snapshot()
            .into_iter()
            .filter_map(|listener| listener(value).err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}
