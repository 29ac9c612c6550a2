//! Replies for messages that ask *how* to handle pending approvals rather
//! than asking to handle them.

use relay_action::AdminCheck;

/// Listing size used to decide the next approval step.
pub const GUIDANCE_LISTING_LIMIT: usize = 5;

const PLAIN_LANGUAGE_REPLY: &str = "Use plain language like: \"show me pending approvals\" or \"what approvals are waiting right now?\". If you need to approve one, say: \"approve action <id>\" or \"approve the most recent pending action\".";

const PRIORITIZE_REPLY: &str = "First, list pending approvals and prioritize by risk and urgency: security-impacting actions first, then oldest blocked user requests. Approve one action at a time, confirm outcome, then move to the next.";

const LIST_PENDING_REPLY: &str = "Use `/pending-actions` to list pending approvals.";

const GUIDANCE_PHRASES: &[&str] = &[
    "what command",
    "which command",
    "exact command",
    "exact next command",
    "what should i run",
    "what do i run",
    "tell me the command",
    "next command i should run",
    "if approval is needed",
];

/// What kind of guidance a message asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Guidance {
    /// A reply that does not depend on stored state.
    Fixed(&'static str),
    /// The exact next approval command; needs the pending listing and the
    /// caller's role.
    ApprovalNextStep,
}

/// Detect a guidance question. `None` means the message is not one.
pub fn detect_guidance(text: &str) -> Option<Guidance> {
    let lower = text.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    if let Some(reply) = pending_approval_guidance(&lower) {
        return Some(Guidance::Fixed(reply));
    }
    if !looks_like_command_question(&lower) {
        return None;
    }
    if mentions_pending_approvals(&lower) {
        return Some(Guidance::Fixed(LIST_PENDING_REPLY));
    }
    if lower.contains("approval") || lower.contains("approve") {
        return Some(Guidance::ApprovalNextStep);
    }
    None
}

fn mentions_pending_approvals(lower: &str) -> bool {
    lower.contains("pending approval") || lower.contains("pending action")
}

fn pending_approval_guidance(lower: &str) -> Option<&'static str> {
    if !mentions_pending_approvals(lower) {
        return None;
    }
    let asks_how = [
        "without using slash",
        "plain language",
        "how can i ask",
        "how do i ask",
    ]
    .iter()
    .any(|p| lower.contains(p))
        || lower.starts_with("how ");
    if asks_how {
        return Some(PLAIN_LANGUAGE_REPLY);
    }
    if lower.contains("many pending") || lower.contains("what should i do first") {
        return Some(PRIORITIZE_REPLY);
    }
    None
}

fn looks_like_command_question(lower: &str) -> bool {
    !lower.starts_with('/') && GUIDANCE_PHRASES.iter().any(|p| lower.contains(p))
}

/// The resolved state behind [`Guidance::ApprovalNextStep`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NextStep {
    NonePending,
    Multiple { across_contexts: bool },
    Single { action_id: String, access: AdminCheck },
}

impl NextStep {
    pub fn reply(&self) -> String {
        match self {
            NextStep::NonePending => "No pending action approvals right now. After an action is queued, run `/pending-actions` and then `/approve-action <action-id>`.".to_string(),
            NextStep::Multiple { across_contexts } => {
                let scope = if *across_contexts { "all contexts" } else { "this context" };
                format!(
                    "Multiple pending actions found in {}. Run `/pending-actions`, then execute `/approve-action <action-id>` for the one you want.",
                    scope
                )
            }
            NextStep::Single { action_id, access } => match access {
                AdminCheck::NotLinked => format!(
                    "Pending action found: `{id}`.\nNext:\n1) Link your admin identity by sending `pair` and completing approval.\n2) Run `/approve-action {id}`.\nUse `/pending-actions` to verify.",
                    id = action_id
                ),
                AdminCheck::NotAdmin => format!(
                    "Pending action found: `{id}`.\nYou do not have admin approval rights in this context. Ask an admin to run `/approve-action {id}`.\nUse `/pending-actions` to verify.",
                    id = action_id
                ),
                AdminCheck::Granted(_) => format!(
                    "Run `/approve-action {}`.\nUse `/pending-actions` if you want to review all pending approvals first.",
                    action_id
                ),
            },
        }
    }
}
