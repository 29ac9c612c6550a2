//! Tools the agent runtime may call on a user's behalf.
//!
//! Every call goes through [`ToolRegistry::invoke`]: lookup by name, argument
//! validation, then the approval gate for privileged tools. A privileged
//! call succeeds only for the system worker or when it consumes the
//! caller's one-shot sensitive grant.

pub mod lookup_task;
pub mod run_action;
pub mod update_task_routing;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use relay_action::{ActionError, GrantKey, SensitiveApprovalGrants};
use relay_core::{RequestContext, StoreError, Timestamp};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use lookup_task::LookupTaskTool;
pub use run_action::RunActionTool;
pub use update_task_routing::UpdateTaskRoutingTool;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid args for {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },

    #[error("approval required: {0} needs an admin approval in this conversation")]
    ApprovalRequired(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("action error: {0}")]
    Action(#[from] ActionError),

    #[error("{0}")]
    Failed(String),
}

/// A callable capability.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn describe(&self) -> &str;

    /// JSON schema of the arguments object.
    fn parameters_schema(&self) -> Value;

    /// Privileged tools need the system worker or a sensitive grant.
    fn requires_approval(&self) -> bool {
        false
    }

    /// Reject malformed arguments before any approval is consumed.
    fn validate(&self, args: &Value) -> Result<(), ToolError>;

    async fn execute(
        &self,
        ctx: &RequestContext,
        args: Value,
        now: Timestamp,
    ) -> Result<String, ToolError>;
}

/// Decode `args` into a strict argument struct.
pub(crate) fn decode_args<T: DeserializeOwned>(tool: &str, args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::InvalidArgs {
        tool: tool.to_string(),
        reason: e.to_string(),
    })
}

pub(crate) fn invalid_args(tool: &str, reason: impl Into<String>) -> ToolError {
    ToolError::InvalidArgs {
        tool: tool.to_string(),
        reason: reason.into(),
    }
}

/// Tools keyed by name, sharing the grant store with the approval engine.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    grants: Arc<SensitiveApprovalGrants>,
    system_worker_id: String,
}

impl ToolRegistry {
    pub fn new(grants: Arc<SensitiveApprovalGrants>, system_worker_id: impl Into<String>) -> Self {
        Self {
            tools: HashMap::new(),
            grants,
            system_worker_id: system_worker_id.into(),
        }
    }

    /// Register `tool`, replacing any tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().trim().to_string();
        tracing::debug!(tool = %name, privileged = tool.requires_approval(), "Registered tool");
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name.trim())
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// `name: description` lines for prompt construction, sorted by name.
    pub fn describe_all(&self) -> String {
        self.names()
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| format!("- {}: {}", tool.name(), tool.describe()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Validate, gate and run one tool call.
    pub async fn invoke(
        &self,
        ctx: &RequestContext,
        name: &str,
        args: Value,
        now: Timestamp,
    ) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.trim().to_string()))?;
        tool.validate(&args)?;

        if tool.requires_approval() && !self.approval_satisfied(ctx, now) {
            tracing::info!(tool = %tool.name(), user_id = %ctx.input.from_user_id, "Privileged tool call refused without approval");
            return Err(ToolError::ApprovalRequired(tool.name().to_string()));
        }

        tracing::debug!(tool = %tool.name(), "Executing tool");
        tool.execute(ctx, args, now).await
    }

    fn approval_satisfied(&self, ctx: &RequestContext, now: Timestamp) -> bool {
        if ctx.input.from_user_id.trim() == self.system_worker_id {
            return true;
        }
        match GrantKey::from_input(&ctx.input) {
            Some(key) => self.grants.consume(&key, now),
            None => false,
        }
    }
}
