//! Error types for the gateway.

use relay_action::ActionError;
use relay_core::StoreError;
use relay_triage::TriageError;
use thiserror::Error;

use crate::retriever::RetrievalError;
use crate::tools::ToolError;

/// Hard failures while handling a message.
///
/// Expected outcomes (usage errors, access denied, not found) are replies,
/// not errors. Anything surfacing here means the message was not handled.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Triage error: {0}")]
    Triage(#[from] TriageError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),
}
