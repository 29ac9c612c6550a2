//! The approval engine.
//!
//! Owns the lifecycle of sensitive-action requests on top of an
//! [`ApprovalStore`]: creation with the auto-approval policy, admin
//! approve/deny, exactly-once execution recording and bulk operations.

use std::sync::Arc;

use relay_core::config::ApprovalConfig;
use relay_core::{MessageInput, RequestContext, StoreError, Timestamp, UserIdentity};

use crate::error::ActionError;
use crate::executor::ActionExecutor;
use crate::grant::{GrantKey, SensitiveApprovalGrants};
use crate::outcome::{format_execution_reply, humanize_execution_failure, pending_request_notice};
use crate::reference::{list_pending_with_fallback, PENDING_LISTING_LIMIT};
use crate::state_machine::validate_execution;
use crate::store::ApprovalStore;
use crate::types::{
    ActionApproval, ActionProposal, ExecutionStatus, ExecutionUpdate, NewActionApproval,
    PendingScope,
};

/// Execution message recorded when no executor is wired in.
pub const NO_EXECUTOR_MESSAGE: &str = "no executor is configured for this workspace";

/// Result of checking whether a caller may approve or deny.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdminCheck {
    Granted(UserIdentity),
    NotLinked,
    NotAdmin,
}

impl AdminCheck {
    /// Fixed access-denied reply, `None` when granted.
    pub fn denial_reply(&self) -> Option<&'static str> {
        match self {
            AdminCheck::Granted(_) => None,
            AdminCheck::NotLinked => Some("Access denied: link your admin identity first."),
            AdminCheck::NotAdmin => Some("Access denied: admin role required."),
        }
    }
}

/// An approved action together with its recorded execution.
#[derive(Clone, Debug, PartialEq)]
pub struct ApprovalOutcome {
    pub approval: ActionApproval,
    /// User-facing description of the execution outcome.
    pub reply: String,
}

impl ApprovalOutcome {
    fn new(approval: ActionApproval) -> Self {
        let reply = format_execution_reply(&approval);
        Self { approval, reply }
    }

    pub fn status(&self) -> Option<ExecutionStatus> {
        self.approval.execution_status()
    }
}

/// What happened to a new action request.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestOutcome {
    /// Left pending for an admin.
    PendingApproval {
        approval: ActionApproval,
        notice: String,
    },
    /// Auto-approved and executed.
    Executed(ApprovalOutcome),
}

/// Aggregate result of approving or denying every pending action in scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub succeeded: Vec<String>,
    /// `(action id, failure detail)` pairs.
    pub failed: Vec<(String, String)>,
}

impl BulkReport {
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }

    pub fn approve_reply(&self) -> String {
        if self.is_empty() {
            return "No pending actions to approve.".to_string();
        }
        self.render("Approved")
    }

    pub fn deny_reply(&self) -> String {
        if self.is_empty() {
            return "No pending actions to deny.".to_string();
        }
        self.render("Denied")
    }

    fn render(&self, verb: &str) -> String {
        let mut reply = format!("{} {} actions.", verb, self.succeeded.len());
        if !self.failed.is_empty() {
            let lines = self
                .failed
                .iter()
                .map(|(id, detail)| format!("{}: {}", id, detail))
                .collect::<Vec<_>>()
                .join("\n");
            reply.push_str(&format!("\nFailed: {}\n{}", self.failed.len(), lines));
        }
        reply
    }
}

/// Approval lifecycle over a store, an optional executor and the shared
/// sensitive-tool grant store.
pub struct ApprovalEngine<S: ApprovalStore> {
    store: Arc<S>,
    executor: Option<Arc<dyn ActionExecutor>>,
    grants: Arc<SensitiveApprovalGrants>,
    config: ApprovalConfig,
}

impl<S: ApprovalStore> ApprovalEngine<S> {
    /// Engine with no executor; approved actions are recorded as skipped.
    pub fn new(store: Arc<S>, config: ApprovalConfig) -> Self {
        let grants = Arc::new(SensitiveApprovalGrants::new(config.sensitive_approval_ttl()));
        Self {
            store,
            executor: None,
            grants,
            config,
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Share an existing grant store, e.g. with the tool registry.
    pub fn with_grants(mut self, grants: Arc<SensitiveApprovalGrants>) -> Self {
        self.grants = grants;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn grants(&self) -> &Arc<SensitiveApprovalGrants> {
        &self.grants
    }

    pub fn config(&self) -> &ApprovalConfig {
        &self.config
    }

    pub fn has_executor(&self) -> bool {
        self.executor.is_some()
    }

    // =========================================================================
    // Authorization
    // =========================================================================

    /// Look up the caller and require an admin role.
    pub async fn authorize_admin(&self, input: &MessageInput) -> Result<AdminCheck, ActionError> {
        match self
            .store
            .lookup_user_identity(&input.connector, &input.from_user_id)
            .await
        {
            Ok(identity) if identity.is_admin() => Ok(AdminCheck::Granted(identity)),
            Ok(_) => Ok(AdminCheck::NotAdmin),
            Err(StoreError::IdentityNotFound { .. }) => Ok(AdminCheck::NotLinked),
            Err(e) => Err(e.into()),
        }
    }

    /// The system worker is always auto-approved; anyone else only with an
    /// admin role. Lookup failures count as "not auto-approved".
    pub async fn can_auto_approve(&self, input: &MessageInput) -> bool {
        let user_id = input.from_user_id.trim();
        if user_id == self.config.system_worker_id {
            return true;
        }
        match self
            .store
            .lookup_user_identity(&input.connector, user_id)
            .await
        {
            Ok(identity) => identity.is_admin(),
            Err(StoreError::IdentityNotFound { .. }) => false,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Identity lookup failed during auto-approval check");
                false
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Create a pending approval for `proposal`, then auto-approve and
    /// execute it when the caller qualifies.
    pub async fn request(
        &self,
        ctx: &RequestContext,
        proposal: ActionProposal,
        now: Timestamp,
    ) -> Result<RequestOutcome, ActionError> {
        let approval = self
            .store
            .create_action_approval(NewActionApproval::from_proposal(ctx, proposal))
            .await?;
        tracing::info!(
            action_id = %approval.id,
            action_type = %approval.action_type,
            connector = %approval.connector,
            "Action approval created"
        );

        if !self.can_auto_approve(&ctx.input).await {
            let notice = pending_request_notice(&approval.id);
            return Ok(RequestOutcome::PendingApproval { approval, notice });
        }

        let approved = self
            .store
            .approve_action_approval(&approval.id, &self.config.auto_approver_id)
            .await?;
        tracing::info!(action_id = %approved.id, approver = %self.config.auto_approver_id, "Action auto-approved");
        let executed = self.execute_and_record(approved, now).await?;
        Ok(RequestOutcome::Executed(ApprovalOutcome::new(executed)))
    }

    /// Approve `id` on behalf of the sender of `input`, mint a sensitive-tool
    /// grant for that conversation and execute the action.
    ///
    /// Callers check the admin role first; this only enforces the state
    /// machine.
    pub async fn approve_and_execute(
        &self,
        input: &MessageInput,
        approver_user_id: &str,
        id: &str,
        now: Timestamp,
    ) -> Result<ApprovalOutcome, ActionError> {
        let approved = self
            .store
            .approve_action_approval(id, approver_user_id)
            .await?;
        tracing::info!(action_id = %approved.id, approver = %approver_user_id, "Action approved");

        if let Some(key) = GrantKey::from_input(input) {
            let expires = self.grants.grant(&key, now);
            tracing::debug!(grant = %key.as_str(), expires_at = expires.0, "Sensitive tool approval granted");
        }

        let executed = self.execute_and_record(approved, now).await?;
        Ok(ApprovalOutcome::new(executed))
    }

    /// Run an approved record through the executor and write exactly one
    /// execution update: `skipped` without an executor, `failed` with the
    /// executor's error text, `succeeded` otherwise.
    pub async fn execute_and_record(
        &self,
        record: ActionApproval,
        now: Timestamp,
    ) -> Result<ActionApproval, ActionError> {
        validate_execution(&record)?;

        let update = match &self.executor {
            None => ExecutionUpdate::new(
                &record.id,
                ExecutionStatus::Skipped,
                NO_EXECUTOR_MESSAGE,
                "",
                now,
            ),
            Some(executor) => match executor.execute(&record).await {
                Ok(result) => ExecutionUpdate::new(
                    &record.id,
                    ExecutionStatus::Succeeded,
                    result.message,
                    result.plugin,
                    now,
                ),
                Err(e) => {
                    tracing::warn!(action_id = %record.id, error = %e, "Action execution failed");
                    ExecutionUpdate::new(&record.id, ExecutionStatus::Failed, e.to_string(), "", now)
                }
            },
        };

        let status = update.record.status;
        let updated = self.store.update_action_execution(update).await?;
        tracing::info!(action_id = %updated.id, status = %status, "Action execution recorded");
        Ok(updated)
    }

    /// Deny `id`. A missing or blank reason becomes the configured default.
    pub async fn deny(
        &self,
        approver_user_id: &str,
        id: &str,
        reason: Option<&str>,
    ) -> Result<ActionApproval, ActionError> {
        let reason = match reason.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => self.config.default_deny_reason.as_str(),
        };
        let denied = self
            .store
            .deny_action_approval(id, approver_user_id, reason)
            .await?;
        tracing::info!(action_id = %denied.id, approver = %approver_user_id, reason = %reason, "Action denied");
        Ok(denied)
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Approve and execute every pending action in the caller's scope, or
    /// globally when the scope has none. Items are processed in listing
    /// order; one failure never stops the batch.
    pub async fn approve_all(
        &self,
        input: &MessageInput,
        approver_user_id: &str,
        now: Timestamp,
    ) -> Result<BulkReport, ActionError> {
        let items = self.pending_for_bulk(input).await?;
        let mut report = BulkReport::default();
        for item in items {
            match self
                .approve_and_execute(input, approver_user_id, &item.id, now)
                .await
            {
                Ok(outcome) if outcome.status() == Some(ExecutionStatus::Failed) => {
                    let detail = outcome
                        .approval
                        .execution
                        .as_ref()
                        .and_then(|e| humanize_execution_failure(&e.message))
                        .unwrap_or_else(|| "execution failed".to_string());
                    report.failed.push((item.id, detail));
                }
                Ok(_) => report.succeeded.push(item.id),
                Err(e) => report.failed.push((item.id, e.to_string())),
            }
        }
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Bulk approval finished"
        );
        Ok(report)
    }

    /// Deny every pending action in the caller's scope, or globally when
    /// the scope has none.
    pub async fn deny_all(
        &self,
        input: &MessageInput,
        approver_user_id: &str,
        reason: Option<&str>,
    ) -> Result<BulkReport, ActionError> {
        let items = self.pending_for_bulk(input).await?;
        let mut report = BulkReport::default();
        for item in items {
            match self.deny(approver_user_id, &item.id, reason).await {
                Ok(_) => report.succeeded.push(item.id),
                Err(e) => report.failed.push((item.id, e.to_string())),
            }
        }
        tracing::info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Bulk denial finished"
        );
        Ok(report)
    }

    async fn pending_for_bulk(&self, input: &MessageInput) -> Result<Vec<ActionApproval>, ActionError> {
        list_pending_with_fallback(
            self.store.as_ref(),
            &PendingScope::from_input(input),
            PENDING_LISTING_LIMIT,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{ActionPlugin, PluginRegistry};
    use crate::store::memory::MemoryApprovalStore;
    use crate::types::{ActionType, ApprovalStatus, ExecutionResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Succeeds for every target except `boom`.
    struct ScriptedPlugin {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ActionPlugin for ScriptedPlugin {
        fn plugin_key(&self) -> &str {
            "scripted"
        }

        fn action_types(&self) -> Vec<String> {
            vec!["run_command".to_string()]
        }

        async fn execute(&self, approval: &ActionApproval) -> Result<ExecutionResult, ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if approval.target == "boom" {
                return Err(ActionError::ExecutionFailed(
                    "command failed: exit status: 2; output=kaboom".to_string(),
                ));
            }
            Ok(ExecutionResult {
                plugin: String::new(),
                message: format!("command succeeded: {}; output=ok", approval.target),
            })
        }
    }

    fn input(user: &str) -> MessageInput {
        MessageInput::new("cli", "room", user, "")
    }

    fn ctx(user: &str) -> RequestContext {
        RequestContext::new(input(user), "ws", "ctx")
    }

    fn engine() -> (Arc<MemoryApprovalStore>, ApprovalEngine<MemoryApprovalStore>) {
        let store = Arc::new(MemoryApprovalStore::new());
        store.link_identity("cli", "root", "admin").unwrap();
        store.link_identity("cli", "bob", "member").unwrap();
        let engine = ApprovalEngine::new(Arc::clone(&store), ApprovalConfig::default());
        (store, engine)
    }

    fn with_plugin(
        engine: ApprovalEngine<MemoryApprovalStore>,
    ) -> (ApprovalEngine<MemoryApprovalStore>, Arc<ScriptedPlugin>) {
        let plugin = Arc::new(ScriptedPlugin {
            calls: AtomicUsize::new(0),
        });
        let registry = PluginRegistry::new().with_plugin(plugin.clone());
        (engine.with_executor(Arc::new(registry)), plugin)
    }

    async fn pending(engine: &ApprovalEngine<MemoryApprovalStore>, target: &str) -> String {
        match engine
            .request(&ctx("bob"), ActionProposal::new(ActionType::RunCommand, target), Timestamp(100))
            .await
            .unwrap()
        {
            RequestOutcome::PendingApproval { approval, .. } => approval.id,
            other => panic!("expected pending approval, got {:?}", other),
        }
    }

    // =====================================================================
    // Authorization
    // =====================================================================

    #[tokio::test]
    async fn test_authorize_admin() {
        let (_, engine) = engine();
        assert!(matches!(
            engine.authorize_admin(&input("root")).await.unwrap(),
            AdminCheck::Granted(_)
        ));
        let check = engine.authorize_admin(&input("bob")).await.unwrap();
        assert_eq!(check, AdminCheck::NotAdmin);
        assert_eq!(check.denial_reply().unwrap(), "Access denied: admin role required.");
        let check = engine.authorize_admin(&input("ghost")).await.unwrap();
        assert_eq!(check, AdminCheck::NotLinked);
        assert_eq!(
            check.denial_reply().unwrap(),
            "Access denied: link your admin identity first."
        );
    }

    #[tokio::test]
    async fn test_auto_approval_policy() {
        let (_, engine) = engine();
        assert!(engine.can_auto_approve(&input("system:task-worker")).await);
        assert!(engine.can_auto_approve(&input("root")).await);
        assert!(!engine.can_auto_approve(&input("bob")).await);
        assert!(!engine.can_auto_approve(&input("ghost")).await);
    }

    // =====================================================================
    // Request
    // =====================================================================

    #[tokio::test]
    async fn test_request_from_member_stays_pending() {
        let (store, engine) = engine();
        let outcome = engine
            .request(&ctx("bob"), ActionProposal::new("run_command", "ls"), Timestamp(100))
            .await
            .unwrap();
        let RequestOutcome::PendingApproval { approval, notice } = outcome else {
            panic!("expected pending");
        };
        assert_eq!(approval.status, ApprovalStatus::Pending);
        assert_eq!(approval.summary, "run_command ls");
        assert!(notice.contains(&approval.id));
        assert!(notice.starts_with("Action request created: "));
        assert!(store.get(&approval.id).unwrap().execution.is_none());
    }

    #[tokio::test]
    async fn test_request_from_worker_auto_executes() {
        let (store, engine) = engine();
        let (engine, plugin) = with_plugin(engine);
        let outcome = engine
            .request(
                &ctx("system:task-worker"),
                ActionProposal::new("run_command", "ls"),
                Timestamp(100),
            )
            .await
            .unwrap();
        let RequestOutcome::Executed(outcome) = outcome else {
            panic!("expected execution");
        };
        assert_eq!(outcome.status(), Some(ExecutionStatus::Succeeded));
        assert_eq!(outcome.approval.approver_user_id.as_deref(), Some("system:agent"));
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 1);
        let stored = store.get(&outcome.approval.id).unwrap();
        assert_eq!(stored.execution.unwrap().plugin, "scripted");
        assert!(outcome.reply.contains("ran it with `scripted`"));
    }

    // =====================================================================
    // Approve / execute
    // =====================================================================

    #[tokio::test]
    async fn test_approve_without_executor_is_skipped() {
        let (_, engine) = engine();
        let id = pending(&engine, "ls").await;
        let outcome = engine
            .approve_and_execute(&input("root"), "root", &id, Timestamp(200))
            .await
            .unwrap();
        assert_eq!(outcome.status(), Some(ExecutionStatus::Skipped));
        assert!(outcome.reply.contains("approved"));
        assert!(outcome
            .reply
            .contains("Outcome: no executor is configured for this workspace"));
    }

    #[tokio::test]
    async fn test_approve_grants_sensitive_tool_approval() {
        let (_, engine) = engine();
        let id = pending(&engine, "ls").await;
        engine
            .approve_and_execute(&input("root"), "root", &id, Timestamp(200))
            .await
            .unwrap();
        let key = GrantKey::from_input(&input("root")).unwrap();
        assert!(engine.grants().consume(&key, Timestamp(201)));
        assert!(!engine.grants().consume(&key, Timestamp(202)));
    }

    #[tokio::test]
    async fn test_executor_failure_is_recorded_not_propagated() {
        let (store, engine) = engine();
        let (engine, _) = with_plugin(engine);
        let id = pending(&engine, "boom").await;
        let outcome = engine
            .approve_and_execute(&input("root"), "root", &id, Timestamp(200))
            .await
            .unwrap();
        assert_eq!(outcome.status(), Some(ExecutionStatus::Failed));
        assert_eq!(
            outcome.reply,
            format!(
                "I approved action `{}`, but execution failed. Outcome: exit status: 2. Output: kaboom",
                id
            )
        );
        let stored = store.get(&id).unwrap().execution.unwrap();
        assert_eq!(stored.message, "command failed: exit status: 2; output=kaboom");
    }

    #[tokio::test]
    async fn test_unknown_plugin_is_failed_execution() {
        let (_, engine) = engine();
        let (engine, _) = with_plugin(engine);
        let id = match engine
            .request(&ctx("bob"), ActionProposal::new("webhook", "https://example.com"), Timestamp(1))
            .await
            .unwrap()
        {
            RequestOutcome::PendingApproval { approval, .. } => approval.id,
            other => panic!("unexpected {:?}", other),
        };
        let outcome = engine
            .approve_and_execute(&input("root"), "root", &id, Timestamp(2))
            .await
            .unwrap();
        assert_eq!(outcome.status(), Some(ExecutionStatus::Failed));
        assert!(outcome.reply.contains("action plugin not found: webhook"));
    }

    #[tokio::test]
    async fn test_approve_twice_is_not_ready() {
        let (_, engine) = engine();
        let id = pending(&engine, "ls").await;
        engine
            .approve_and_execute(&input("root"), "root", &id, Timestamp(200))
            .await
            .unwrap();
        let err = engine
            .approve_and_execute(&input("root"), "root", &id, Timestamp(201))
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::NotReady(id));
    }

    #[tokio::test]
    async fn test_approve_unknown_is_not_found() {
        let (_, engine) = engine();
        let err = engine
            .approve_and_execute(&input("root"), "root", "act_missing", Timestamp(1))
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::NotFound("act_missing".into()));
    }

    #[tokio::test]
    async fn test_execute_and_record_refuses_pending_and_repeat() {
        let (store, engine) = engine();
        let id = pending(&engine, "ls").await;
        let record = store.get(&id).unwrap();
        let err = engine.execute_and_record(record, Timestamp(1)).await.unwrap_err();
        assert_eq!(err, ActionError::NotReady(id.clone()));

        let outcome = engine
            .approve_and_execute(&input("root"), "root", &id, Timestamp(2))
            .await
            .unwrap();
        let err = engine
            .execute_and_record(outcome.approval, Timestamp(3))
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::AlreadyExecuted(id));
    }

    // =====================================================================
    // Deny
    // =====================================================================

    #[tokio::test]
    async fn test_deny_default_reason() {
        let (_, engine) = engine();
        let id = pending(&engine, "ls").await;
        let denied = engine.deny("root", &id, Some("  ")).await.unwrap();
        assert_eq!(denied.status, ApprovalStatus::Denied);
        assert_eq!(denied.denied_reason.as_deref(), Some("denied by admin"));

        let err = engine.deny("root", &id, None).await.unwrap_err();
        assert_eq!(err, ActionError::NotReady(id));
    }

    #[tokio::test]
    async fn test_deny_with_reason() {
        let (_, engine) = engine();
        let id = pending(&engine, "ls").await;
        let denied = engine.deny("root", &id, Some("unsafe command")).await.unwrap();
        assert_eq!(denied.denied_reason.as_deref(), Some("unsafe command"));
        assert_eq!(denied.approver_user_id.as_deref(), Some("root"));
    }

    // =====================================================================
    // Bulk
    // =====================================================================

    #[tokio::test]
    async fn test_approve_all_isolates_failures() {
        let (_, engine) = engine();
        let (engine, plugin) = with_plugin(engine);
        let first = pending(&engine, "ls").await;
        let bad = pending(&engine, "boom").await;
        let third = pending(&engine, "pwd").await;

        let report = engine
            .approve_all(&input("root"), "root", Timestamp(300))
            .await
            .unwrap();
        assert_eq!(report.succeeded, vec![first, third]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, bad);
        assert_eq!(plugin.calls.load(Ordering::SeqCst), 3);

        let reply = report.approve_reply();
        assert!(reply.starts_with("Approved 2 actions.\nFailed: 1\n"));
        assert!(reply.contains(&bad));
    }

    #[tokio::test]
    async fn test_approve_all_empty() {
        let (_, engine) = engine();
        let report = engine
            .approve_all(&input("root"), "root", Timestamp(1))
            .await
            .unwrap();
        assert!(report.is_empty());
        assert_eq!(report.approve_reply(), "No pending actions to approve.");
    }

    #[tokio::test]
    async fn test_deny_all_falls_back_to_global() {
        let (store, engine) = engine();
        let id = pending(&engine, "ls").await;
        let elsewhere = MessageInput::new("cli", "other-room", "root", "");
        let report = engine.deny_all(&elsewhere, "root", None).await.unwrap();
        assert_eq!(report.succeeded, vec![id.clone()]);
        assert_eq!(report.deny_reply(), "Denied 1 actions.");
        assert_eq!(store.get(&id).unwrap().status, ApprovalStatus::Denied);
    }

    #[test]
    fn test_bulk_report_rendering() {
        let report = BulkReport {
            succeeded: vec!["act_a".into()],
            failed: vec![
                ("act_b".into(), "action approval is not pending: act_b".into()),
                ("act_c".into(), "timeout".into()),
            ],
        };
        assert_eq!(
            report.deny_reply(),
            "Denied 1 actions.\nFailed: 2\nact_b: action approval is not pending: act_b\nact_c: timeout"
        );
    }
}
