//! Records the gateway persists besides action approvals.

use std::fmt;
use std::str::FromStr;

use relay_core::Timestamp;
use relay_triage::{RouteDecision, TriageClass, TriagePriority};
use serde::{Deserialize, Serialize};

// =============================================================================
// Contexts
// =============================================================================

/// One connector conversation and its workspace policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRecord {
    pub id: String,
    pub workspace_id: String,
    pub connector: String,
    pub external_id: String,
    pub display_name: String,
    /// Admin channels may override task routing.
    pub is_admin: bool,
    /// Extra system prompt for this conversation; empty when unset.
    pub system_prompt: String,
}

// =============================================================================
// Tasks
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Queued => write!(f, "queued"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queued" => Ok(TaskStatus::Queued),
            "running" => Ok(TaskStatus::Running),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "failed" => Ok(TaskStatus::Failed),
            _ => Err(format!("Unknown task status: {}", s)),
        }
    }
}

/// A routed unit of work.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub workspace_id: String,
    pub context_id: String,
    pub title: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub route_class: TriageClass,
    pub priority: TriagePriority,
    pub due_at: Option<Timestamp>,
    pub lane: String,
    pub source_connector: String,
    pub source_external_id: String,
    pub source_user_id: String,
    pub source_text: String,
    pub created_at: Timestamp,
}

/// Input for creating a task; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub workspace_id: String,
    pub context_id: String,
    pub title: String,
    pub prompt: String,
    pub route_class: TriageClass,
    pub priority: TriagePriority,
    pub due_at: Option<Timestamp>,
    pub lane: String,
    pub source_connector: String,
    pub source_external_id: String,
    pub source_user_id: String,
    pub source_text: String,
}

impl NewTask {
    /// Task for a triage decision, carrying its routing and provenance.
    pub fn from_decision(decision: &RouteDecision, title: String, prompt: String) -> Self {
        Self {
            workspace_id: decision.workspace_id.clone(),
            context_id: decision.context_id.clone(),
            title,
            prompt,
            route_class: decision.class,
            priority: decision.priority,
            due_at: decision.due_at,
            lane: decision.lane.clone(),
            source_connector: decision.source_connector.clone(),
            source_external_id: decision.source_external_id.clone(),
            source_user_id: decision.source_user_id.clone(),
            source_text: decision.source_text.clone(),
        }
    }
}

/// Replacement routing for an existing task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRoutingUpdate {
    pub task_id: String,
    pub route_class: TriageClass,
    pub priority: TriagePriority,
    /// `None` clears the deadline.
    pub due_at: Option<Timestamp>,
    pub lane: String,
}

// =============================================================================
// Pairing
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStatus {
    Pending,
    Approved,
    Denied,
}

impl fmt::Display for PairingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingStatus::Pending => write!(f, "pending"),
            PairingStatus::Approved => write!(f, "approved"),
            PairingStatus::Denied => write!(f, "denied"),
        }
    }
}

/// A connector user asking to be linked to an identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRequest {
    /// Upper-case one-time token the user shares with an admin.
    pub token: String,
    pub connector: String,
    pub connector_user_id: String,
    pub display_name: String,
    pub status: PairingStatus,
    pub approver_user_id: Option<String>,
    pub denied_reason: Option<String>,
    pub created_at: Timestamp,
}

/// Result of approving a pairing: the request and the linked user id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PairingApproval {
    pub request: PairingRequest,
    pub user_id: String,
}

// =============================================================================
// Objectives
// =============================================================================

/// A standing monitoring goal, scheduled elsewhere.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub workspace_id: String,
    pub context_id: String,
    pub title: String,
    pub prompt: String,
    pub active: bool,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewObjective {
    pub workspace_id: String,
    pub context_id: String,
    pub title: String,
    pub prompt: String,
}
