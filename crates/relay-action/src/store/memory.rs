//! In-memory approval store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use relay_core::{StoreError, Timestamp, UserIdentity};
use uuid::Uuid;

use crate::state_machine::{validate_decision, validate_execution};
use crate::store::ApprovalStore;
use crate::types::{
    ActionApproval, ApprovalStatus, ExecutionUpdate, NewActionApproval, PendingScope,
};

/// Approval records and linked identities held behind mutexes.
///
/// Records are kept in creation order, which is also the listing order.
#[derive(Default)]
pub struct MemoryApprovalStore {
    approvals: Mutex<Vec<ActionApproval>>,
    identities: Mutex<HashMap<(String, String), UserIdentity>>,
}

impl MemoryApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link `(connector, user_id)` to a role.
    pub fn link_identity(&self, connector: &str, user_id: &str, role: &str) -> Result<(), StoreError> {
        let identity = UserIdentity {
            user_id: user_id.trim().to_string(),
            role: role.trim().to_lowercase(),
        };
        lock(&self.identities)?.insert(identity_key(connector, user_id), identity);
        Ok(())
    }

    /// Fetch one record by id.
    pub fn get(&self, id: &str) -> Result<ActionApproval, StoreError> {
        lock(&self.approvals)?
            .iter()
            .find(|a| a.id == id.trim())
            .cloned()
            .ok_or_else(|| StoreError::ApprovalNotFound(id.trim().to_string()))
    }

    fn decide(
        &self,
        id: &str,
        to: ApprovalStatus,
        approver_user_id: &str,
        reason: Option<&str>,
    ) -> Result<ActionApproval, StoreError> {
        let mut approvals = lock(&self.approvals)?;
        let id = id.trim();
        let record = approvals
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::ApprovalNotFound(id.to_string()))?;
        validate_decision(record, to).map_err(|_| StoreError::ApprovalNotReady(id.to_string()))?;
        record.status = to;
        record.approver_user_id = Some(approver_user_id.trim().to_string());
        record.denied_reason = reason.map(str::to_string);
        Ok(record.clone())
    }
}

fn identity_key(connector: &str, user_id: &str) -> (String, String) {
    (connector.trim().to_lowercase(), user_id.trim().to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|e| StoreError::Backend(format!("Lock poisoned: {}", e)))
}

/// Newest `limit` of `items`, oldest first.
fn newest<T>(mut items: Vec<T>, limit: usize) -> Vec<T> {
    if items.len() > limit {
        items.drain(..items.len() - limit);
    }
    items
}

#[async_trait]
impl ApprovalStore for MemoryApprovalStore {
    async fn create_action_approval(
        &self,
        new: NewActionApproval,
    ) -> Result<ActionApproval, StoreError> {
        let record = ActionApproval {
            id: format!("act_{}", Uuid::new_v4().simple()),
            workspace_id: new.workspace_id,
            context_id: new.context_id,
            connector: new.connector.trim().to_lowercase(),
            external_id: new.external_id.trim().to_string(),
            requester_user_id: new.requester_user_id,
            action_type: new.action_type,
            target: new.target,
            summary: new.summary,
            payload: new.payload,
            status: ApprovalStatus::Pending,
            approver_user_id: None,
            denied_reason: None,
            execution: None,
            created_at: Timestamp::now(),
        };
        lock(&self.approvals)?.push(record.clone());
        Ok(record)
    }

    async fn approve_action_approval(
        &self,
        id: &str,
        approver_user_id: &str,
    ) -> Result<ActionApproval, StoreError> {
        self.decide(id, ApprovalStatus::Approved, approver_user_id, None)
    }

    async fn deny_action_approval(
        &self,
        id: &str,
        approver_user_id: &str,
        reason: &str,
    ) -> Result<ActionApproval, StoreError> {
        self.decide(id, ApprovalStatus::Denied, approver_user_id, Some(reason.trim()))
    }

    async fn update_action_execution(
        &self,
        update: ExecutionUpdate,
    ) -> Result<ActionApproval, StoreError> {
        let mut approvals = lock(&self.approvals)?;
        let id = update.approval_id.trim();
        let record = approvals
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::ApprovalNotFound(id.to_string()))?;
        if record.execution.is_some() {
            return Ok(record.clone());
        }
        validate_execution(record).map_err(|_| StoreError::ApprovalNotReady(id.to_string()))?;
        record.execution = Some(update.record);
        Ok(record.clone())
    }

    async fn list_pending_action_approvals(
        &self,
        scope: &PendingScope,
        limit: usize,
    ) -> Result<Vec<ActionApproval>, StoreError> {
        let approvals = lock(&self.approvals)?;
        let matches = approvals
            .iter()
            .filter(|a| a.is_pending() && a.scope() == *scope)
            .cloned()
            .collect();
        Ok(newest(matches, limit))
    }

    async fn list_pending_action_approvals_global(
        &self,
        limit: usize,
    ) -> Result<Vec<ActionApproval>, StoreError> {
        let approvals = lock(&self.approvals)?;
        let matches = approvals.iter().filter(|a| a.is_pending()).cloned().collect();
        Ok(newest(matches, limit))
    }

    async fn lookup_user_identity(
        &self,
        connector: &str,
        user_id: &str,
    ) -> Result<UserIdentity, StoreError> {
        lock(&self.identities)?
            .get(&identity_key(connector, user_id))
            .cloned()
            .ok_or_else(|| StoreError::IdentityNotFound {
                connector: connector.trim().to_lowercase(),
                user_id: user_id.trim().to_string(),
            })
    }
}
