//! Events and event constructors

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityResult;
use crate::input::{UserInput, UserInputValue};
use crate::variable::ListenerId;

/// Metadata assigned to every event by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    /// Identifier used to track the event
    pub unique_id: String,

    /// When the event last fired; managed by the host, not by addons
    pub last_triggered: Option<DateTime<Utc>>,
}

impl EventMetadata {
    /// Metadata for an event that has never fired
    pub fn new(unique_id: impl Into<String>) -> Self {
        Self {
            unique_id: unique_id.into(),
            last_triggered: None,
        }
    }
}

/// Callback invoked when an event fires
pub type TriggerListener = Arc<dyn Fn(&EventMetadata) + Send + Sync>;

/// Something that can happen
///
/// Addons whose event wraps a variable must fire it whenever the value is
/// changed through `update_value`, even if they cannot observe other changes.
pub trait Event: Send + Sync {
    /// Snapshot of the current metadata
    fn metadata(&self) -> EventMetadata;

    fn add_trigger_listener(&self, listener: TriggerListener) -> ListenerId;

    /// Returns `false` if no listener with this id was registered
    fn remove_trigger_listener(&self, id: ListenerId) -> bool;
}

impl fmt::Debug for dyn Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("metadata", &self.metadata())
            .finish_non_exhaustive()
    }
}

/// Builds new events from user inputs
#[async_trait]
pub trait EventConstructor: Send + Sync {
    fn unique_id(&self) -> &str;

    fn name(&self) -> &str;

    fn inputs(&self) -> &[UserInput] {
        &[]
    }

    async fn create_event(
        &self,
        metadata: EventMetadata,
        inputs: &[UserInputValue],
    ) -> CapabilityResult<Arc<dyn Event>>;
}
