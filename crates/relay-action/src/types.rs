//! Core types for the action-approval engine.

use std::fmt;
use std::str::FromStr;

use relay_core::{MessageInput, RequestContext, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Enums
// =============================================================================

/// Decision state of an approval record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Denied => write!(f, "denied"),
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "denied" => Ok(ApprovalStatus::Denied),
            _ => Err(format!("Unknown approval status: {}", s)),
        }
    }
}

/// Outcome of running an approved action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Approved but not run, e.g. no executor configured.
    Skipped,
    Succeeded,
    Failed,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Skipped => write!(f, "skipped"),
            ExecutionStatus::Succeeded => write!(f, "succeeded"),
            ExecutionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "skipped" => Ok(ExecutionStatus::Skipped),
            "succeeded" => Ok(ExecutionStatus::Succeeded),
            "failed" => Ok(ExecutionStatus::Failed),
            _ => Err(format!("Unknown execution status: {}", s)),
        }
    }
}

/// Kind of action an approval authorizes.
///
/// Types not built in are carried as [`ActionType::Plugin`] and dispatched to
/// whichever executor plugin registered them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    RunCommand,
    SendEmail,
    Webhook,
    Plugin(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::RunCommand => "run_command",
            ActionType::SendEmail => "send_email",
            ActionType::Webhook => "webhook",
            ActionType::Plugin(name) => name,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        let normalized = normalize_action_type(value);
        match normalized.as_str() {
            "run_command" => ActionType::RunCommand,
            "send_email" => ActionType::SendEmail,
            "webhook" => ActionType::Webhook,
            _ => ActionType::Plugin(normalized),
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        ActionType::from(value.as_str())
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.as_str().to_string()
    }
}

/// Lower-case, trim and map `-` to `_` so `run-command` and `run_command` agree.
pub fn normalize_action_type(value: &str) -> String {
    value.trim().to_lowercase().replace('-', "_")
}

// =============================================================================
// Records
// =============================================================================

/// Conversation an approval belongs to, used to list pending approvals.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingScope {
    pub connector: String,
    pub external_id: String,
}

impl PendingScope {
    pub fn new(connector: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            connector: connector.into().trim().to_lowercase(),
            external_id: external_id.into().trim().to_string(),
        }
    }

    pub fn from_input(input: &MessageInput) -> Self {
        Self::new(input.connector.as_str(), input.external_id.as_str())
    }
}

/// Recorded outcome of executing an approved action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub status: ExecutionStatus,
    pub message: String,
    /// Key of the executor plugin that ran the action, if any.
    pub plugin: String,
    pub executed_at: Timestamp,
}

/// One request to perform a consequential action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionApproval {
    pub id: String,
    pub workspace_id: String,
    pub context_id: String,
    pub connector: String,
    pub external_id: String,
    pub requester_user_id: String,
    pub action_type: ActionType,
    /// Executable name, recipient or URL.
    pub target: String,
    pub summary: String,
    /// Opaque to the engine; interpreted by the executor plugin.
    pub payload: Map<String, Value>,
    pub status: ApprovalStatus,
    pub approver_user_id: Option<String>,
    pub denied_reason: Option<String>,
    /// Set once, after the record is approved.
    pub execution: Option<ExecutionRecord>,
    pub created_at: Timestamp,
}

impl ActionApproval {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    pub fn execution_status(&self) -> Option<ExecutionStatus> {
        self.execution.as_ref().map(|e| e.status)
    }

    pub fn scope(&self) -> PendingScope {
        PendingScope::new(self.connector.as_str(), self.external_id.as_str())
    }

    /// One-line label used in pending-action listings.
    pub fn describe(&self) -> String {
        let summary = self.summary.trim();
        if !summary.is_empty() {
            return summary.to_string();
        }
        let target = self.target.trim();
        if target.is_empty() {
            self.action_type.to_string()
        } else {
            format!("{} {}", self.action_type, target)
        }
    }
}

/// Input for creating a pending approval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewActionApproval {
    pub workspace_id: String,
    pub context_id: String,
    pub connector: String,
    pub external_id: String,
    pub requester_user_id: String,
    pub action_type: ActionType,
    pub target: String,
    pub summary: String,
    pub payload: Map<String, Value>,
}

impl NewActionApproval {
    pub fn from_proposal(ctx: &RequestContext, proposal: ActionProposal) -> Self {
        let summary = proposal.summary_or_default();
        Self {
            workspace_id: ctx.workspace_id.clone(),
            context_id: ctx.context_id.clone(),
            connector: ctx.input.connector.trim().to_lowercase(),
            external_id: ctx.input.external_id.trim().to_string(),
            requester_user_id: ctx.input.from_user_id.trim().to_string(),
            action_type: proposal.action_type,
            target: proposal.target,
            summary,
            payload: proposal.payload,
        }
    }
}

/// A single execution-outcome write for an approved action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionUpdate {
    pub approval_id: String,
    pub record: ExecutionRecord,
}

impl ExecutionUpdate {
    pub fn new(
        approval_id: impl Into<String>,
        status: ExecutionStatus,
        message: impl Into<String>,
        plugin: impl Into<String>,
        executed_at: Timestamp,
    ) -> Self {
        Self {
            approval_id: approval_id.into(),
            record: ExecutionRecord {
                status,
                message: message.into(),
                plugin: plugin.into(),
                executed_at,
            },
        }
    }
}

/// What an executor reports after running an action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub plugin: String,
    pub message: String,
}

/// An action someone wants to run, before it becomes an approval record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionProposal {
    pub action_type: ActionType,
    pub target: String,
    pub summary: String,
    pub payload: Map<String, Value>,
}

impl ActionProposal {
    pub fn new(action_type: impl Into<ActionType>, target: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            target: target.into(),
            summary: String::new(),
            payload: Map::new(),
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = payload;
        self
    }

    /// The summary, or `<type> <target>` when none was given.
    pub fn summary_or_default(&self) -> String {
        let summary = self.summary.trim();
        if !summary.is_empty() {
            return summary.to_string();
        }
        format!("{} {}", self.action_type, self.target.trim())
            .trim()
            .to_string()
    }
}
