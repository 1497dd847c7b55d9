//! Turns [`EventListener`]s into [`Chain`]s

use std::sync::Arc;

use cq_addons::{AddonHandle, AddonResolution, AddonsManager};
use cq_core::{
    apply_defaults, validate_inputs, CapabilityError, Condition, UserInput, UserInputValue,
    Variable, VariableRef, INTERNAL_NAMESPACE,
};
use cq_events::{EventConstructorResolution, EventsManager, VARIABLE_VALUE_CHANGED};
use futures::future::BoxFuture;
use tracing::debug;

use crate::builtin::{builtin_conditions, VariableBoundCondition};
use crate::error::{AutomationError, AutomationResult};
use crate::link::{ActionEntry, Chain, ConditionEntry, LinkArena, LinkId};
use crate::listener::{ActionStep, ConditionStep, EventListener, Step};

/// Resolved once per build
struct BuildContext {
    listener_id: String,
    /// Addon owning the watched variable
    home: Arc<AddonHandle>,
    variable: Arc<dyn Variable>,
    variable_conditions: Vec<Arc<dyn Condition>>,
}

pub struct ChainBuilder {
    addons: Arc<AddonsManager>,
    events: Arc<EventsManager>,
    builtins: Vec<Arc<dyn Condition>>,
    max_depth: usize,
}

impl ChainBuilder {
    pub fn new(addons: Arc<AddonsManager>, events: Arc<EventsManager>, max_depth: usize) -> Self {
        Self {
            addons,
            events,
            builtins: builtin_conditions(),
            max_depth,
        }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolve every step of `listener` and construct its trigger event
    ///
    /// Nothing is armed; the returned chain's event has no trigger listeners.
    pub async fn build(&self, listener: &EventListener) -> AutomationResult<Chain> {
        let home = self.addons.resolve_instance(&AddonResolution {
            module: listener.module_id.clone(),
            instance_id: listener.instance_id.clone(),
        })?;

        let variable = home
            .find_variable(&listener.variable_id)
            .await
            .map_err(|source| fetch_error(&home, "variables", source))?
            .ok_or_else(|| {
                AutomationError::NotFound(format!(
                    "no variable with id {} found in addon {}",
                    listener.variable_id, listener.module_id
                ))
            })?;
        let variable_conditions = home
            .variable_conditions(&listener.variable_id)
            .await
            .map_err(|source| fetch_error(&home, "conditions", source))?;

        let context = BuildContext {
            listener_id: listener.id.clone(),
            home,
            variable,
            variable_conditions,
        };

        let mut arena = LinkArena::new();
        let root = self.build_link(&context, &mut arena, &listener.steps, 1).await?;

        let reference = VariableRef::new(&listener.module_id, &listener.variable_id)
            .with_instance(context.home.instance_id());
        let trigger = self
            .events
            .construct_event(
                &EventConstructorResolution::internal(VARIABLE_VALUE_CHANGED),
                &[UserInputValue::new("variable", reference.to_value())],
            )
            .await?;

        debug!(
            listener_id = %listener.id,
            links = arena.len(),
            depth = arena.depth(root),
            "Built chain"
        );
        Chain::new(trigger, arena, root)
    }

    fn build_link<'a>(
        &'a self,
        context: &'a BuildContext,
        arena: &'a mut LinkArena,
        steps: &'a [Step],
        depth: usize,
    ) -> BoxFuture<'a, AutomationResult<LinkId>> {
        Box::pin(async move {
            if depth > self.max_depth {
                return Err(AutomationError::InvalidDefinition(format!(
                    "event listener {} nests deeper than {} links",
                    context.listener_id, self.max_depth
                )));
            }

            let mut actions = Vec::new();
            let mut conditions = Vec::new();

            for step in steps {
                match step {
                    Step::Action(step) => actions.push(self.resolve_action(context, step).await?),
                    Step::Condition(step) => {
                        // Children first, so they already exist when the parent is pushed
                        let next = self
                            .build_link(context, arena, step.next.as_slice(), depth + 1)
                            .await?;
                        conditions.push(self.resolve_condition(context, step, next).await?);
                    }
                }
            }

            arena.push(actions, conditions)
        })
    }

    fn step_addon(
        &self,
        context: &BuildContext,
        module_id: &Option<String>,
        instance_id: &Option<String>,
    ) -> AutomationResult<Arc<AddonHandle>> {
        match module_id {
            None => Ok(context.home.clone()),
            Some(module) => Ok(self.addons.resolve_instance(&AddonResolution {
                module: module.clone(),
                instance_id: instance_id.clone(),
            })?),
        }
    }

    async fn resolve_action(
        &self,
        context: &BuildContext,
        step: &ActionStep,
    ) -> AutomationResult<ActionEntry> {
        let addon = self.step_addon(context, &step.module_id, &step.instance_id)?;
        let action = addon
            .find_action(&step.action_id)
            .await
            .map_err(|source| fetch_error(&addon, "actions", source))?
            .ok_or_else(|| {
                AutomationError::NotFound(format!(
                    "no action with id {} found in addon {}",
                    step.action_id,
                    addon.module()
                ))
            })?;

        let inputs = checked_inputs(&step.action_id, action.inputs(), &step.user_inputs).await?;
        Ok(ActionEntry::new(action, inputs).owned_by(owner(&addon)))
    }

    async fn resolve_condition(
        &self,
        context: &BuildContext,
        step: &ConditionStep,
        next: LinkId,
    ) -> AutomationResult<ConditionEntry> {
        let addon = self.step_addon(context, &step.module_id, &step.instance_id)?;
        let same_addon = addon.instance_id() == context.home.instance_id();

        let from_variable = same_addon
            .then(|| {
                context
                    .variable_conditions
                    .iter()
                    .find(|condition| condition.unique_id() == step.condition_id)
                    .cloned()
            })
            .flatten();

        let (condition, owner_name) = match from_variable {
            Some(condition) => (condition, owner(&addon)),
            None => match addon
                .find_condition(&step.condition_id)
                .await
                .map_err(|source| fetch_error(&addon, "conditions", source))?
            {
                Some(condition) => (condition, owner(&addon)),
                None => {
                    let builtin = self
                        .builtins
                        .iter()
                        .find(|condition| condition.unique_id() == step.condition_id)
                        .cloned()
                        .ok_or_else(|| {
                            AutomationError::NotFound(format!(
                                "no condition with id {} found in addon {} or the built-ins",
                                step.condition_id,
                                addon.module()
                            ))
                        })?;
                    let bound: Arc<dyn Condition> =
                        Arc::new(VariableBoundCondition::new(context.variable.clone(), builtin));
                    (bound, INTERNAL_NAMESPACE.to_string())
                }
            },
        };

        let inputs =
            checked_inputs(&step.condition_id, condition.inputs(), &step.user_inputs).await?;
        Ok(ConditionEntry::new(condition, inputs, next).owned_by(owner_name))
    }
}

async fn checked_inputs(
    capability: &str,
    schema: &[UserInput],
    supplied: &[UserInputValue],
) -> AutomationResult<Vec<UserInputValue>> {
    let inputs = apply_defaults(schema, supplied);
    validate_inputs(schema, &inputs)
        .await
        .map_err(|source| AutomationError::Validation {
            capability: capability.to_string(),
            source,
        })?;
    Ok(inputs)
}

fn owner(addon: &AddonHandle) -> String {
    format!("{}/{}", addon.module(), addon.instance_id())
}

fn fetch_error(addon: &AddonHandle, collection: &str, source: CapabilityError) -> AutomationError {
    AutomationError::Capability {
        context: format!(
            "failed to fetch {} of addon {} instance {}",
            collection,
            addon.module(),
            addon.instance_id()
        ),
        source,
    }
}
