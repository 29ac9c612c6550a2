//! In-memory gateway store for the CLI connector and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use relay_action::store::memory::MemoryApprovalStore;
use relay_action::{ActionApproval, ApprovalStore, ExecutionUpdate, NewActionApproval, PendingScope};
use relay_core::{StoreError, Timestamp, UserIdentity};
use uuid::Uuid;

use crate::store::Store;
use crate::types::{
    ContextRecord, NewObjective, NewTask, Objective, PairingApproval, PairingRequest,
    PairingStatus, TaskRecord, TaskRoutingUpdate, TaskStatus,
};

/// Everything the gateway persists, held behind mutexes.
///
/// Approvals and identities live in a [`MemoryApprovalStore`]; paired users
/// are linked under their connector user id.
pub struct InMemoryStore {
    workspace_id: String,
    approvals: MemoryApprovalStore,
    contexts: Mutex<HashMap<(String, String), ContextRecord>>,
    tasks: Mutex<HashMap<String, TaskRecord>>,
    pairings: Mutex<HashMap<String, PairingRequest>>,
    objectives: Mutex<Vec<Objective>>,
}

impl InMemoryStore {
    /// Store whose new contexts belong to `workspace_id`.
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            approvals: MemoryApprovalStore::new(),
            contexts: Mutex::new(HashMap::new()),
            tasks: Mutex::new(HashMap::new()),
            pairings: Mutex::new(HashMap::new()),
            objectives: Mutex::new(Vec::new()),
        }
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    /// Link a connector user to a role directly, bypassing pairing.
    pub fn link_identity(&self, connector: &str, user_id: &str, role: &str) -> Result<(), StoreError> {
        self.approvals.link_identity(connector, user_id, role)
    }

    /// Open a pairing request and return it with its token.
    pub fn create_pairing_request(
        &self,
        connector: &str,
        connector_user_id: &str,
        display_name: &str,
    ) -> Result<PairingRequest, StoreError> {
        let token = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        let request = PairingRequest {
            token: token.clone(),
            connector: connector.trim().to_lowercase(),
            connector_user_id: connector_user_id.trim().to_string(),
            display_name: display_name.trim().to_string(),
            status: PairingStatus::Pending,
            approver_user_id: None,
            denied_reason: None,
            created_at: Timestamp::now(),
        };
        lock(&self.pairings)?.insert(token, request.clone());
        Ok(request)
    }

    pub fn get_action_approval(&self, id: &str) -> Result<ActionApproval, StoreError> {
        self.approvals.get(id)
    }

    /// Look up a context by id.
    pub fn get_context(&self, context_id: &str) -> Result<Option<ContextRecord>, StoreError> {
        Ok(lock(&self.contexts)?
            .values()
            .find(|c| c.id == context_id)
            .cloned())
    }

    pub fn objectives(&self) -> Result<Vec<Objective>, StoreError> {
        Ok(lock(&self.objectives)?.clone())
    }

    pub fn tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let mut tasks: Vec<TaskRecord> = lock(&self.tasks)?.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(tasks)
    }

    fn update_context<F>(&self, context_id: &str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ContextRecord),
    {
        let mut contexts = lock(&self.contexts)?;
        let context = contexts
            .values_mut()
            .find(|c| c.id == context_id)
            .ok_or_else(|| StoreError::Backend(format!("context not found: {}", context_id)))?;
        apply(context);
        Ok(())
    }

    fn decide_pairing(
        &self,
        token: &str,
        to: PairingStatus,
        approver_user_id: &str,
        reason: Option<&str>,
    ) -> Result<PairingRequest, StoreError> {
        let token = token.trim().to_uppercase();
        let mut pairings = lock(&self.pairings)?;
        let request = pairings
            .get_mut(&token)
            .filter(|r| r.status == PairingStatus::Pending)
            .ok_or_else(|| StoreError::PairingNotFound(token.clone()))?;
        request.status = to;
        request.approver_user_id = Some(approver_user_id.trim().to_string());
        request.denied_reason = reason.map(str::to_string);
        Ok(request.clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|e| StoreError::Backend(format!("Lock poisoned: {}", e)))
}

#[async_trait]
impl ApprovalStore for InMemoryStore {
    async fn create_action_approval(
        &self,
        new: NewActionApproval,
    ) -> Result<ActionApproval, StoreError> {
        self.approvals.create_action_approval(new).await
    }

    async fn approve_action_approval(
        &self,
        id: &str,
        approver_user_id: &str,
    ) -> Result<ActionApproval, StoreError> {
        self.approvals.approve_action_approval(id, approver_user_id).await
    }

    async fn deny_action_approval(
        &self,
        id: &str,
        approver_user_id: &str,
        reason: &str,
    ) -> Result<ActionApproval, StoreError> {
        self.approvals
            .deny_action_approval(id, approver_user_id, reason)
            .await
    }

    async fn update_action_execution(
        &self,
        update: ExecutionUpdate,
    ) -> Result<ActionApproval, StoreError> {
        self.approvals.update_action_execution(update).await
    }

    async fn list_pending_action_approvals(
        &self,
        scope: &PendingScope,
        limit: usize,
    ) -> Result<Vec<ActionApproval>, StoreError> {
        self.approvals.list_pending_action_approvals(scope, limit).await
    }

    async fn list_pending_action_approvals_global(
        &self,
        limit: usize,
    ) -> Result<Vec<ActionApproval>, StoreError> {
        self.approvals.list_pending_action_approvals_global(limit).await
    }

    async fn lookup_user_identity(
        &self,
        connector: &str,
        user_id: &str,
    ) -> Result<UserIdentity, StoreError> {
        self.approvals.lookup_user_identity(connector, user_id).await
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ensure_context(
        &self,
        connector: &str,
        external_id: &str,
        display_name: &str,
    ) -> Result<ContextRecord, StoreError> {
        let key = (connector.trim().to_lowercase(), external_id.trim().to_string());
        let mut contexts = lock(&self.contexts)?;
        let context = contexts.entry(key).or_insert_with_key(|(connector, external_id)| {
            let record = ContextRecord {
                id: format!("ctx_{}", Uuid::new_v4().simple()),
                workspace_id: self.workspace_id.clone(),
                connector: connector.clone(),
                external_id: external_id.clone(),
                display_name: String::new(),
                is_admin: false,
                system_prompt: String::new(),
            };
            tracing::debug!(context_id = %record.id, connector = %connector, "Context created");
            record
        });
        let display_name = display_name.trim();
        if !display_name.is_empty() {
            context.display_name = display_name.to_string();
        }
        Ok(context.clone())
    }

    async fn set_context_admin(&self, context_id: &str, enabled: bool) -> Result<(), StoreError> {
        self.update_context(context_id, |c| c.is_admin = enabled)
    }

    async fn set_context_system_prompt(
        &self,
        context_id: &str,
        prompt: &str,
    ) -> Result<(), StoreError> {
        self.update_context(context_id, |c| c.system_prompt = prompt.trim().to_string())
    }

    async fn create_task(&self, task: NewTask) -> Result<TaskRecord, StoreError> {
        let record = TaskRecord {
            id: format!("task_{}", Uuid::new_v4().simple()),
            workspace_id: task.workspace_id,
            context_id: task.context_id,
            title: task.title,
            prompt: task.prompt,
            status: TaskStatus::Queued,
            route_class: task.route_class,
            priority: task.priority,
            due_at: task.due_at,
            lane: task.lane,
            source_connector: task.source_connector,
            source_external_id: task.source_external_id,
            source_user_id: task.source_user_id,
            source_text: task.source_text,
            created_at: Timestamp::now(),
        };
        lock(&self.tasks)?.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn lookup_task(&self, task_id: &str) -> Result<TaskRecord, StoreError> {
        let task_id = task_id.trim();
        lock(&self.tasks)?
            .get(task_id)
            .cloned()
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))
    }

    async fn update_task_routing(&self, update: TaskRoutingUpdate) -> Result<TaskRecord, StoreError> {
        let task_id = update.task_id.trim();
        let mut tasks = lock(&self.tasks)?;
        let task = tasks
            .get_mut(task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        task.route_class = update.route_class;
        task.priority = update.priority;
        task.due_at = update.due_at;
        task.lane = update.lane;
        Ok(task.clone())
    }

    async fn approve_pairing(
        &self,
        token: &str,
        approver_user_id: &str,
        role: &str,
    ) -> Result<PairingApproval, StoreError> {
        let request = self.decide_pairing(token, PairingStatus::Approved, approver_user_id, None)?;
        self.approvals
            .link_identity(&request.connector, &request.connector_user_id, role)?;
        Ok(PairingApproval {
            user_id: request.connector_user_id.clone(),
            request,
        })
    }

    async fn deny_pairing(
        &self,
        token: &str,
        approver_user_id: &str,
        reason: &str,
    ) -> Result<PairingRequest, StoreError> {
        self.decide_pairing(token, PairingStatus::Denied, approver_user_id, Some(reason.trim()))
    }

    async fn create_objective(&self, objective: NewObjective) -> Result<Objective, StoreError> {
        let record = Objective {
            id: format!("obj_{}", Uuid::new_v4().simple()),
            workspace_id: objective.workspace_id,
            context_id: objective.context_id,
            title: objective.title,
            prompt: objective.prompt,
            active: true,
            created_at: Timestamp::now(),
        };
        lock(&self.objectives)?.push(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_triage::{TriageClass, TriagePriority};

    fn new_task(context_id: &str) -> NewTask {
        NewTask {
            workspace_id: "ws".into(),
            context_id: context_id.into(),
            title: "Fix login".into(),
            prompt: "Fix the login page".into(),
            route_class: TriageClass::Issue,
            priority: TriagePriority::P1,
            due_at: Some(Timestamp(100)),
            lane: "support".into(),
            source_connector: "cli".into(),
            source_external_id: "local".into(),
            source_user_id: "u1".into(),
            source_text: "login is broken".into(),
        }
    }

    #[tokio::test]
    async fn test_ensure_context_is_stable() {
        let store = InMemoryStore::new("ws");
        let first = store.ensure_context("Telegram", "100", "Ops").await.unwrap();
        let second = store.ensure_context("telegram", " 100 ", "").await.unwrap();
        assert_eq!(first.id, second.id);
        assert!(first.id.starts_with("ctx_"));
        assert_eq!(second.workspace_id, "ws");
        assert_eq!(second.connector, "telegram");
        assert_eq!(second.display_name, "Ops");

        let other = store.ensure_context("telegram", "200", "").await.unwrap();
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_context_admin_and_prompt() {
        let store = InMemoryStore::new("ws");
        let ctx = store.ensure_context("cli", "local", "").await.unwrap();
        store.set_context_admin(&ctx.id, true).await.unwrap();
        store
            .set_context_system_prompt(&ctx.id, "  Be brief.  ")
            .await
            .unwrap();
        let stored = store.ensure_context("cli", "local", "").await.unwrap();
        assert!(stored.is_admin);
        assert_eq!(stored.system_prompt, "Be brief.");

        store.set_context_system_prompt(&ctx.id, "").await.unwrap();
        let cleared = store.get_context(&ctx.id).unwrap().unwrap();
        assert!(cleared.system_prompt.is_empty());

        let err = store.set_context_admin("ctx_missing", true).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
    }

    #[tokio::test]
    async fn test_task_create_lookup_update() {
        let store = InMemoryStore::new("ws");
        let task = store.create_task(new_task("ctx_1")).await.unwrap();
        assert!(task.id.starts_with("task_"));
        assert_eq!(task.status, TaskStatus::Queued);

        let found = store.lookup_task(&task.id).await.unwrap();
        assert_eq!(found, task);

        let updated = store
            .update_task_routing(TaskRoutingUpdate {
                task_id: task.id.clone(),
                route_class: TriageClass::Noise,
                priority: TriagePriority::P3,
                due_at: None,
                lane: "backlog".into(),
            })
            .await
            .unwrap();
        assert_eq!(updated.route_class, TriageClass::Noise);
        assert_eq!(updated.due_at, None);
        assert_eq!(updated.title, "Fix login");

        assert_eq!(
            store.lookup_task("task_missing").await.unwrap_err(),
            StoreError::TaskNotFound("task_missing".into())
        );
    }

    #[tokio::test]
    async fn test_approve_pairing_links_identity() {
        let store = InMemoryStore::new("ws");
        let request = store
            .create_pairing_request("Telegram", "42", "Alice")
            .unwrap();
        assert_eq!(request.token.len(), 8);
        assert_eq!(request.token, request.token.to_uppercase());

        let approval = store
            .approve_pairing(&request.token.to_lowercase(), "admin-1", "admin")
            .await
            .unwrap();
        assert_eq!(approval.user_id, "42");
        assert_eq!(approval.request.status, PairingStatus::Approved);
        assert_eq!(approval.request.approver_user_id.as_deref(), Some("admin-1"));

        let identity = store.lookup_user_identity("telegram", "42").await.unwrap();
        assert!(identity.is_admin());

        // A decided token cannot be reused.
        let err = store
            .approve_pairing(&request.token, "admin-1", "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PairingNotFound(_)));
    }

    #[tokio::test]
    async fn test_deny_pairing() {
        let store = InMemoryStore::new("ws");
        let request = store.create_pairing_request("discord", "7", "Bob").unwrap();
        let denied = store
            .deny_pairing(&request.token, "admin-1", "unknown user")
            .await
            .unwrap();
        assert_eq!(denied.status, PairingStatus::Denied);
        assert_eq!(denied.denied_reason.as_deref(), Some("unknown user"));
        assert!(store.lookup_user_identity("discord", "7").await.is_err());

        let err = store.deny_pairing("NOPE1234", "admin-1", "x").await.unwrap_err();
        assert_eq!(err, StoreError::PairingNotFound("NOPE1234".into()));
    }

    #[tokio::test]
    async fn test_create_objective() {
        let store = InMemoryStore::new("ws");
        let objective = store
            .create_objective(NewObjective {
                workspace_id: "ws".into(),
                context_id: "ctx_1".into(),
                title: "Monitor: releases".into(),
                prompt: "watch releases".into(),
            })
            .await
            .unwrap();
        assert!(objective.id.starts_with("obj_"));
        assert!(objective.active);
        assert_eq!(store.objectives().unwrap().len(), 1);
    }
}
