use std::sync::Arc;

use async_trait::async_trait;
use relay_action::{ActionProposal, ApprovalEngine, RequestOutcome};
use relay_core::{RequestContext, Timestamp};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::store::Store;
use crate::tools::{decode_args, invalid_args, Tool, ToolError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunActionArgs {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default)]
    target: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    payload: Option<Map<String, Value>>,
}

/// Requests an external action through the approval engine.
///
/// The engine decides between leaving the request pending and running it
/// right away, so the tool itself is not privileged.
pub struct RunActionTool<S: Store> {
    engine: Arc<ApprovalEngine<S>>,
}

impl<S: Store> RunActionTool<S> {
    pub fn new(engine: Arc<ApprovalEngine<S>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<S: Store + 'static> Tool for RunActionTool<S> {
    fn name(&self) -> &str {
        "run_action"
    }

    fn describe(&self) -> &str {
        "Request an external action such as run_command or webhook. Runs after admin approval."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "type": {"type": "string"},
                "target": {"type": "string"},
                "summary": {"type": "string"},
                "payload": {"type": "object"}
            },
            "required": ["type"],
            "additionalProperties": false
        })
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let args: RunActionArgs = decode_args(self.name(), args)?;
        if args.action_type.trim().is_empty() {
            return Err(invalid_args(self.name(), "type is required"));
        }
        if args.action_type.trim().eq_ignore_ascii_case("webhook") && args.target.trim().is_empty() {
            return Err(invalid_args(self.name(), "target is required for webhook"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        args: Value,
        now: Timestamp,
    ) -> Result<String, ToolError> {
        let args: RunActionArgs = decode_args(self.name(), &args)?;
        let proposal = ActionProposal::new(args.action_type.as_str(), args.target.trim())
            .with_summary(args.summary.trim())
            .with_payload(args.payload.unwrap_or_default());

        match self.engine.request(ctx, proposal, now).await? {
            RequestOutcome::PendingApproval { notice, .. } => Ok(notice),
            RequestOutcome::Executed(outcome) => Ok(outcome.reply),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use relay_action::{ApprovalStore, PendingScope};
    use relay_core::config::ApprovalConfig;
    use relay_core::MessageInput;

    fn setup() -> (Arc<InMemoryStore>, RunActionTool<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new("ws"));
        let engine = Arc::new(ApprovalEngine::new(Arc::clone(&store), ApprovalConfig::default()));
        (store, RunActionTool::new(engine))
    }

    fn ctx(user: &str) -> RequestContext {
        RequestContext::new(MessageInput::new("cli", "local", user, ""), "ws", "ctx_1")
    }

    #[test]
    fn test_validation() {
        let (_, tool) = setup();
        assert!(tool.validate(&json!({"type": "run_command", "target": "ls"})).is_ok());
        assert!(tool.validate(&json!({"type": " "})).is_err());
        assert!(tool.validate(&json!({"target": "ls"})).is_err());
        assert!(tool.validate(&json!({"type": "webhook"})).is_err());
        assert!(tool.validate(&json!({"type": "run_command", "cmd": "ls"})).is_err());
    }

    #[tokio::test]
    async fn test_non_admin_request_stays_pending() {
        let (store, tool) = setup();
        let out = tool
            .execute(
                &ctx("u1"),
                json!({"type": "run_command", "target": "ls", "summary": "List files"}),
                Timestamp(0),
            )
            .await
            .unwrap();
        assert!(out.starts_with("Action request created: act_"));

        let pending = store
            .list_pending_action_approvals(&PendingScope::new("cli", "local"), 10)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].summary, "List files");
    }

    #[tokio::test]
    async fn test_system_worker_request_executes() {
        let (store, tool) = setup();
        let out = tool
            .execute(
                &ctx("system:task-worker"),
                json!({"type": "run_command", "target": "ls"}),
                Timestamp(0),
            )
            .await
            .unwrap();
        assert!(out.starts_with("I approved action `act_"));
        assert!(out.contains("but it was not run"));
        let pending = store.list_pending_action_approvals_global(10).await.unwrap();
        assert!(pending.is_empty());
    }
}
