//! Automations for Consequences
//!
//! An automation is a decision tree of [`Link`]s. Reaching a link runs all
//! of its actions in order, then evaluates each of its conditions in order,
//! entering the guarded child link of every condition that holds.
//!
//! [`EventListener`]s are the persisted form of an automation: a watched
//! variable plus a tree of steps. The [`AutomationManager`] turns them into
//! armed [`Chain`]s that run an evaluation pass whenever the variable changes.

mod builder;
mod builtin;
mod error;
mod evaluator;
mod link;
mod listener;
mod manager;

pub use builder::ChainBuilder;
pub use builtin::{builtin_conditions, BooleanCondition, NumericComparison, NumericCondition, VariableBoundCondition};
pub use error::{AutomationError, AutomationResult};
pub use evaluator::{EvaluationFailure, EvaluationReport, Evaluator, EvaluatorOptions, FailureKind};
pub use link::{ActionEntry, Chain, ConditionEntry, Link, LinkArena, LinkId};
pub use listener::{
    ActionStep, ConditionStep, EventListener, EventListenerStore, EventListeners,
    JsonEventListenerStore, MemoryEventListenerStore, Step, Steps,
};
pub use manager::{AutomationManager, AutomationOptions, PassReport};
