//! Links and chains

use std::fmt;
use std::sync::Arc;

use cq_core::{Action, Condition, Event, UserInputValue};

use crate::error::{AutomationError, AutomationResult};

/// Index of a link within its [`LinkArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(usize);

impl LinkId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// An action bound to its inputs
#[derive(Clone)]
pub struct ActionEntry {
    pub action: Arc<dyn Action>,
    pub inputs: Vec<UserInputValue>,
    /// Addon the action belongs to, for reporting
    pub owner: String,
}

impl ActionEntry {
    pub fn new(action: Arc<dyn Action>, inputs: Vec<UserInputValue>) -> Self {
        Self {
            action,
            inputs,
            owner: String::new(),
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}

/// A condition bound to its inputs, guarding a child link
#[derive(Clone)]
pub struct ConditionEntry {
    pub condition: Arc<dyn Condition>,
    pub inputs: Vec<UserInputValue>,
    pub next: LinkId,
    pub owner: String,
}

impl ConditionEntry {
    pub fn new(condition: Arc<dyn Condition>, inputs: Vec<UserInputValue>, next: LinkId) -> Self {
        Self {
            condition,
            inputs,
            next,
            owner: String::new(),
        }
    }

    pub fn owned_by(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }
}

/// A node of the decision tree
pub struct Link {
    id: LinkId,
    actions: Vec<ActionEntry>,
    conditions: Vec<ConditionEntry>,
}

impl Link {
    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn actions(&self) -> &[ActionEntry] {
        &self.actions
    }

    pub fn conditions(&self) -> &[ConditionEntry] {
        &self.conditions
    }

    /// A link without conditions ends its branch
    pub fn is_leaf(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Immutable storage for the links of one decision tree
///
/// A link can only point at links already in the arena, so every child is
/// built before its parent and the tree has no cycles.
#[derive(Default)]
pub struct LinkArena {
    links: Vec<Link>,
}

impl LinkArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        actions: Vec<ActionEntry>,
        conditions: Vec<ConditionEntry>,
    ) -> AutomationResult<LinkId> {
        let id = LinkId(self.links.len());

        if let Some(entry) = conditions.iter().find(|entry| entry.next.0 >= id.0) {
            return Err(AutomationError::InvalidDefinition(format!(
                "{} guards unknown {}",
                entry.condition.unique_id(),
                entry.next
            )));
        }

        self.links.push(Link {
            id,
            actions,
            conditions,
        });
        Ok(id)
    }

    /// Push a link without conditions
    pub fn leaf(&mut self, actions: Vec<ActionEntry>) -> LinkId {
        let id = LinkId(self.links.len());
        self.links.push(Link {
            id,
            actions,
            conditions: Vec::new(),
        });
        id
    }

    pub fn get(&self, id: LinkId) -> Option<&Link> {
        self.links.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of links on the longest path starting at `root`
    pub fn depth(&self, root: LinkId) -> usize {
        // Children always have lower ids, so one pass in id order suffices
        let mut depths = vec![0usize; self.links.len()];
        for link in &self.links {
            depths[link.id.0] = 1 + link
                .conditions
                .iter()
                .map(|entry| depths[entry.next.0])
                .max()
                .unwrap_or(0);
        }
        depths.get(root.0).copied().unwrap_or(0)
    }
}

/// A decision tree armed on an event
pub struct Chain {
    starting_event: Arc<dyn Event>,
    arena: LinkArena,
    starting_link: LinkId,
}

impl Chain {
    pub fn new(
        starting_event: Arc<dyn Event>,
        arena: LinkArena,
        starting_link: LinkId,
    ) -> AutomationResult<Self> {
        if arena.get(starting_link).is_none() {
            return Err(AutomationError::InvalidDefinition(format!(
                "starting {} is not in the arena",
                starting_link
            )));
        }

        Ok(Self {
            starting_event,
            arena,
            starting_link,
        })
    }

    pub fn starting_event(&self) -> &Arc<dyn Event> {
        &self.starting_event
    }

    pub fn starting_link(&self) -> LinkId {
        self.starting_link
    }

    pub fn arena(&self) -> &LinkArena {
        &self.arena
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chain")
            .field("starting_event", &self.starting_event)
            .field("links", &self.arena.len())
            .field("starting_link", &self.starting_link)
            .finish()
    }
}
