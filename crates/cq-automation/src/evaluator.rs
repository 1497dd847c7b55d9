//! Decision tree evaluation

use std::fmt;
use std::future::Future;
use std::time::Duration;

use cq_core::CapabilityResult;
use futures::future::BoxFuture;
use tracing::{debug, error, trace};

use crate::link::{Chain, LinkArena, LinkId};

#[derive(Debug, Clone, Copy, Default)]
pub struct EvaluatorOptions {
    /// Upper bound for a single condition or action call
    ///
    /// A call that runs longer is dropped. A timed-out condition counts as
    /// false, a timed-out action as failed.
    pub call_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Condition,
    Action,
}

/// A condition or action that failed during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationFailure {
    pub kind: FailureKind,
    pub link: LinkId,
    pub capability_id: String,
    pub owner: String,
    pub message: String,
}

impl fmt::Display for EvaluationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FailureKind::Condition => "condition",
            FailureKind::Action => "action",
        };
        write!(
            f,
            "{} {} of {} failed in {}: {}",
            kind, self.capability_id, self.owner, self.link, self.message
        )
    }
}

/// What happened during one evaluation pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    /// Links in the order they were entered
    pub links_entered: Vec<LinkId>,
    /// Ids of actions that completed, in the order they ran
    pub actions_performed: Vec<String>,
    pub failures: Vec<EvaluationFailure>,
}

impl EvaluationReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Walks decision trees
///
/// Failures never stop a pass; they are logged and collected in the
/// [`EvaluationReport`].
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    options: EvaluatorOptions,
}

impl Evaluator {
    pub fn new(options: EvaluatorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EvaluatorOptions {
        &self.options
    }

    /// Evaluate a chain from its starting link
    pub async fn run_chain(&self, chain: &Chain) -> EvaluationReport {
        self.evaluate(chain.arena(), chain.starting_link()).await
    }

    /// Evaluate the tree below `start`
    pub async fn evaluate(&self, arena: &LinkArena, start: LinkId) -> EvaluationReport {
        let mut report = EvaluationReport::default();
        self.enter(arena, start, &mut report).await;

        debug!(
            links = report.links_entered.len(),
            actions = report.actions_performed.len(),
            failures = report.failures.len(),
            "Evaluation pass finished"
        );
        report
    }

    fn enter<'a>(
        &'a self,
        arena: &'a LinkArena,
        id: LinkId,
        report: &'a mut EvaluationReport,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let Some(link) = arena.get(id) else {
                return;
            };
            trace!(link_id = %id, "Entering link");
            report.links_entered.push(id);

            for entry in link.actions() {
                let action_id = entry.action.unique_id();
                match self.call(entry.action.perform(&entry.inputs)).await {
                    Ok(()) => {
                        trace!(link_id = %id, action_id, "Action performed");
                        report.actions_performed.push(action_id.to_string());
                    }
                    Err(message) => {
                        error!(
                            link_id = %id,
                            action_id,
                            owner = %entry.owner,
                            error = %message,
                            "Action failed"
                        );
                        report.failures.push(EvaluationFailure {
                            kind: FailureKind::Action,
                            link: id,
                            capability_id: action_id.to_string(),
                            owner: entry.owner.clone(),
                            message,
                        });
                    }
                }
            }

            for entry in link.conditions() {
                let condition_id = entry.condition.unique_id();
                let passed = match self.call(entry.condition.evaluate(&entry.inputs)).await {
                    Ok(passed) => passed,
                    Err(message) => {
                        error!(
                            link_id = %id,
                            condition_id,
                            owner = %entry.owner,
                            error = %message,
                            "Condition failed, treating as false"
                        );
                        report.failures.push(EvaluationFailure {
                            kind: FailureKind::Condition,
                            link: id,
                            capability_id: condition_id.to_string(),
                            owner: entry.owner.clone(),
                            message,
                        });
                        false
                    }
                };

                trace!(link_id = %id, condition_id, passed, "Condition evaluated");
                if passed {
                    self.enter(arena, entry.next, report).await;
                }
            }
        })
    }

    async fn call<T>(&self, call: impl Future<Output = CapabilityResult<T>>) -> Result<T, String> {
        match self.options.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err(format!("timed out after {:?}", limit)),
            },
            None => call.await.map_err(|e| e.to_string()),
        }
    }
}
