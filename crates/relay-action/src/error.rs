//! Error types for the action engine.

use relay_core::StoreError;

use crate::types::ApprovalStatus;

/// Errors from approval lifecycle management and action execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("action approval not found: {0}")]
    NotFound(String),
    #[error("action approval is not pending: {0}")]
    NotReady(String),
    #[error("invalid approval transition: {0} -> {1}")]
    InvalidTransition(ApprovalStatus, ApprovalStatus),
    #[error("action already executed: {0}")]
    AlreadyExecuted(String),
    #[error("action plugin not found: {0}")]
    PluginNotFound(String),
    /// Carries the executor's own message, e.g. `command failed: ...; output=...`.
    #[error("{0}")]
    ExecutionFailed(String),
    #[error("invalid action payload: {0}")]
    InvalidPayload(String),
    #[error("command not allowed: {0}")]
    NotAllowed(String),
    #[error("action execution timed out after {0} seconds")]
    Timeout(u64),
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ActionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ApprovalNotFound(id) => ActionError::NotFound(id),
            StoreError::ApprovalNotReady(id) => ActionError::NotReady(id),
            other => ActionError::Store(other),
        }
    }
}
