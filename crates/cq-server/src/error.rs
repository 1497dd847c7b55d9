use cq_addons::AddonsError;
use cq_automation::AutomationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to load addons: {0}")]
    Addons(#[from] AddonsError),

    #[error("failed to load event listeners: {0}")]
    Automations(#[from] AutomationError),
}

pub type ServerResult<T> = Result<T, ServerError>;
