//! Persistence interface for approval records and identities.
//!
//! [`memory::MemoryApprovalStore`] is the in-process implementation used by
//! the CLI connector and tests.

pub mod memory;

use async_trait::async_trait;
use relay_core::{StoreError, UserIdentity};

use crate::types::{ActionApproval, ExecutionUpdate, NewActionApproval, PendingScope};

/// Storage the approval engine depends on.
///
/// Single-record operations are atomic. Listing contract: pending records
/// come back **oldest first** (creation order), holding the newest `limit`
/// matches, so the last element is always the most recent request.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Record a new `pending` approval and assign its id.
    async fn create_action_approval(
        &self,
        new: NewActionApproval,
    ) -> Result<ActionApproval, StoreError>;

    /// `pending -> approved`. Fails with `ApprovalNotFound` or
    /// `ApprovalNotReady`.
    async fn approve_action_approval(
        &self,
        id: &str,
        approver_user_id: &str,
    ) -> Result<ActionApproval, StoreError>;

    /// `pending -> denied` with a reason.
    async fn deny_action_approval(
        &self,
        id: &str,
        approver_user_id: &str,
        reason: &str,
    ) -> Result<ActionApproval, StoreError>;

    /// Write the execution outcome of an approved record. Idempotent per id:
    /// a record that already has an outcome is returned unchanged.
    async fn update_action_execution(
        &self,
        update: ExecutionUpdate,
    ) -> Result<ActionApproval, StoreError>;

    async fn list_pending_action_approvals(
        &self,
        scope: &PendingScope,
        limit: usize,
    ) -> Result<Vec<ActionApproval>, StoreError>;

    async fn list_pending_action_approvals_global(
        &self,
        limit: usize,
    ) -> Result<Vec<ActionApproval>, StoreError>;

    /// Fails with `IdentityNotFound` if the user never linked an identity.
    async fn lookup_user_identity(
        &self,
        connector: &str,
        user_id: &str,
    ) -> Result<UserIdentity, StoreError>;
}
