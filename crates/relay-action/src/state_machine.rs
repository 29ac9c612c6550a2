//! Approval state machine with validated transitions.
//!
//! Pending -> Approved | Denied. Approved records take exactly one
//! execution outcome.

use crate::error::ActionError;
use crate::types::{ActionApproval, ApprovalStatus};

/// Validate that a status transition is allowed.
///
/// Valid transitions:
/// - Pending -> Approved
/// - Pending -> Denied
pub fn validate_transition(from: ApprovalStatus, to: ApprovalStatus) -> Result<(), ActionError> {
    let valid = matches!(
        (from, to),
        (ApprovalStatus::Pending, ApprovalStatus::Approved)
            | (ApprovalStatus::Pending, ApprovalStatus::Denied)
    );

    if valid {
        Ok(())
    } else {
        Err(ActionError::InvalidTransition(from, to))
    }
}

/// Validate that a decision may be applied to `record`.
///
/// Anything not pending is reported as not ready, so a second approve or
/// deny is never a silent no-op.
pub fn validate_decision(record: &ActionApproval, to: ApprovalStatus) -> Result<(), ActionError> {
    validate_transition(record.status, to).map_err(|_| ActionError::NotReady(record.id.clone()))
}

/// Validate that `record` may be executed: approved and not yet executed.
pub fn validate_execution(record: &ActionApproval) -> Result<(), ActionError> {
    if record.status != ApprovalStatus::Approved {
        return Err(ActionError::NotReady(record.id.clone()));
    }
    if record.execution.is_some() {
        return Err(ActionError::AlreadyExecuted(record.id.clone()));
    }
    Ok(())
}
