//! Events for Consequences
//!
//! - [`EventState`] - trigger listeners plus `last_triggered` bookkeeping,
//!   usable directly as an [`Event`](cq_core::Event)
//! - [`VariableValueChangedEvent`] - fires whenever a variable changes
//! - [`EventsManager`] - resolves addon events and constructs new ones

mod error;
mod manager;
mod state;
mod variable_changed;

pub use error::{EventsError, EventsResult};
pub use manager::{EventConstructorResolution, EventResolution, EventsManager};
pub use state::EventState;
pub use variable_changed::{VariableValueChangedConstructor, VariableValueChangedEvent, VARIABLE_VALUE_CHANGED};
