//! Persistence the gateway needs beyond action approvals.

pub mod memory;

use async_trait::async_trait;
use relay_action::ApprovalStore;
use relay_core::StoreError;

use crate::types::{
    ContextRecord, NewObjective, NewTask, Objective, PairingApproval, PairingRequest, TaskRecord,
    TaskRoutingUpdate,
};

/// Contexts, tasks, pairing and objectives, on top of [`ApprovalStore`].
#[async_trait]
pub trait Store: ApprovalStore {
    /// Get or create the context for a connector conversation. Repeated
    /// calls return the same record.
    async fn ensure_context(
        &self,
        connector: &str,
        external_id: &str,
        display_name: &str,
    ) -> Result<ContextRecord, StoreError>;

    async fn set_context_admin(&self, context_id: &str, enabled: bool) -> Result<(), StoreError>;

    /// Replace the context's system prompt; an empty prompt clears it.
    async fn set_context_system_prompt(
        &self,
        context_id: &str,
        prompt: &str,
    ) -> Result<(), StoreError>;

    async fn create_task(&self, task: NewTask) -> Result<TaskRecord, StoreError>;

    /// Fails with `TaskNotFound`.
    async fn lookup_task(&self, task_id: &str) -> Result<TaskRecord, StoreError>;

    async fn update_task_routing(&self, update: TaskRoutingUpdate) -> Result<TaskRecord, StoreError>;

    /// Approve a pending pairing token and link the connector user with
    /// `role`. Unknown or already decided tokens fail with `PairingNotFound`.
    async fn approve_pairing(
        &self,
        token: &str,
        approver_user_id: &str,
        role: &str,
    ) -> Result<PairingApproval, StoreError>;

    async fn deny_pairing(
        &self,
        token: &str,
        approver_user_id: &str,
        reason: &str,
    ) -> Result<PairingRequest, StoreError>;

    async fn create_objective(&self, objective: NewObjective) -> Result<Objective, StoreError>;
}
