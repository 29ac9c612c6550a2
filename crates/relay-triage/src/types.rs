use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use relay_core::Timestamp;
use serde::{Deserialize, Serialize};

use crate::error::TriageError;

/// What an inbound message is about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageClass {
    Question,
    Issue,
    Task,
    Moderation,
    Noise,
}

impl TriageClass {
    pub const ALL: [TriageClass; 5] = [
        TriageClass::Question,
        TriageClass::Issue,
        TriageClass::Task,
        TriageClass::Moderation,
        TriageClass::Noise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriageClass::Question => "question",
            TriageClass::Issue => "issue",
            TriageClass::Task => "task",
            TriageClass::Moderation => "moderation",
            TriageClass::Noise => "noise",
        }
    }

    /// Tag used as the routed task title prefix.
    pub fn title_tag(&self) -> &'static str {
        match self {
            TriageClass::Issue => "[ISSUE]",
            TriageClass::Moderation => "[MODERATION]",
            TriageClass::Question => "[QUESTION]",
            TriageClass::Task | TriageClass::Noise => "[TASK]",
        }
    }
}

impl fmt::Display for TriageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriageClass {
    type Err = TriageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "question" => Ok(TriageClass::Question),
            "issue" => Ok(TriageClass::Issue),
            "task" => Ok(TriageClass::Task),
            "moderation" => Ok(TriageClass::Moderation),
            "noise" => Ok(TriageClass::Noise),
            _ => Err(TriageError::InvalidClass(s.to_string())),
        }
    }
}

/// Routing priority, `P1` being the most urgent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriagePriority {
    P1,
    P2,
    P3,
}

impl fmt::Display for TriagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriagePriority::P1 => write!(f, "p1"),
            TriagePriority::P2 => write!(f, "p2"),
            TriagePriority::P3 => write!(f, "p3"),
        }
    }
}

impl FromStr for TriagePriority {
    type Err = TriageError;

    /// Accepts `p1`..`p3` and the aliases high/urgent, medium/normal, low.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "p1" | "high" | "urgent" => Ok(TriagePriority::P1),
            "p2" | "medium" | "normal" => Ok(TriagePriority::P2),
            "p3" | "low" => Ok(TriagePriority::P3),
            _ => Err(TriageError::InvalidPriority(s.to_string())),
        }
    }
}

/// Result of [`crate::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Classification {
    pub class: TriageClass,
    pub reason: &'static str,
}

/// Triage output for one inbound message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecision {
    /// Filled in once the routed task is persisted.
    pub task_id: Option<String>,
    pub workspace_id: String,
    pub context_id: String,
    pub class: TriageClass,
    pub priority: TriagePriority,
    /// `None` means no deadline.
    pub due_at: Option<Timestamp>,
    pub due_window: Option<Duration>,
    pub lane: String,
    pub source_connector: String,
    pub source_external_id: String,
    pub source_user_id: String,
    pub source_text: String,
    pub reason: String,
}
