//! Variable change notification
//!
//! This crate provides the listener bookkeeping shared by variables and
//! events, and two ready-made variables that addons can expose directly:
//!
//! - [`ReadOnlyVariable`] - a value only the addon itself can change
//! - [`ReadWriteVariable`] - a value the host can also update
//!
//! Listeners are invoked synchronously, in registration order, over a
//! snapshot taken when a change is dispatched. Adding or removing listeners
//! from inside a callback never disturbs the pass in progress.

mod listeners;
mod variables;

pub use listeners::ListenerSet;
pub use variables::{ReadOnlyVariable, ReadWriteVariable};
