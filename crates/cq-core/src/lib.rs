//! Core types for Consequences
//!
//! This crate provides the capability model shared by every other crate:
//! the traits addons implement (Variable, Condition, Action, Event,
//! EventConstructor, Addon, AddonInitialiser) and the user input contract
//! used to configure them.

mod addon;
mod capability;
mod event;
mod input;
mod variable;

pub use addon::{Addon, AddonInitialiser, AddonMetadata, Capabilities, InitialiserMetadata};
pub use capability::{Action, CapabilityError, CapabilityResult, Condition};
pub use event::{Event, EventConstructor, EventMetadata, TriggerListener};
pub use input::{
    apply_defaults, find_input, validate_inputs, InputFilter, InputKind, InputProblem,
    InputValidator, UserInput, UserInputValue, ValidationError, VariableRef,
};
pub use variable::{
    flatten_variables, ChangeListener, ListenerId, Variable, VariableCollection, VariableEntry,
    WritableVariable,
};

/// Module name reserved for capabilities provided by the host itself
pub const INTERNAL_NAMESPACE: &str = "consequences";
