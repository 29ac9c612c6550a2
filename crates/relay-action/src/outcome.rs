//! User-facing wording for approval and execution outcomes.

use relay_core::text::{compact_snippet, trim_prefix_ignore_case};

use crate::types::{ActionApproval, ExecutionStatus};

const WEBHOOK_PREFIX: &str = "webhook request completed with status";

/// Reply telling the requester an admin must approve `action_id`.
pub fn approval_request_notice(action_id: &str) -> String {
    let id = action_id.trim();
    let id = if id.is_empty() { "(unknown-action-request)" } else { id };
    format!(
        "Admin approval required. Reply 'approve' to execute action '{}', or 'deny' to reject.",
        id
    )
}

/// Reply returned by the tool surface when a request is left pending.
pub fn pending_request_notice(action_id: &str) -> String {
    format!(
        "Action request created: {}. I need an admin to approve this before I can continue.",
        action_id.trim()
    )
}

/// Describe what happened to an approved action.
pub fn format_execution_reply(record: &ActionApproval) -> String {
    let id = record.id.trim();
    let id = if id.is_empty() { "(unknown-action)" } else { id };
    let (status, message, plugin) = match &record.execution {
        Some(execution) => (
            execution.status,
            execution.message.as_str(),
            execution.plugin.as_str(),
        ),
        None => (ExecutionStatus::Skipped, "", ""),
    };

    match status {
        ExecutionStatus::Skipped => {
            let reason = humanize_execution_message(message)
                .unwrap_or_else(|| "No executor is configured for this workspace.".to_string());
            format!("I approved action `{}`, but it was not run. Outcome: {}", id, reason)
        }
        ExecutionStatus::Failed => {
            let detail = humanize_execution_failure(message)
                .unwrap_or_else(|| "Execution failed without additional details.".to_string());
            format!("I approved action `{}`, but execution failed. Outcome: {}", id, detail)
        }
        ExecutionStatus::Succeeded => {
            let plugin = match plugin.trim() {
                "" => "executor",
                p => p,
            };
            let outcome = humanize_execution_message(message)
                .unwrap_or_else(|| "Completed successfully.".to_string());
            format!(
                "I approved action `{}` and ran it with `{}`. Outcome: {}",
                id, plugin, outcome
            )
        }
    }
}

/// Strip machine prefixes from a success or skip message.
pub fn humanize_execution_message(message: &str) -> Option<String> {
    let original = message.trim();
    if original.is_empty() {
        return None;
    }
    let text = trim_prefix_ignore_case(original, "command succeeded:");
    let text = trim_prefix_ignore_case(text, "command completed:");
    let text = trim_prefix_ignore_case(text, WEBHOOK_PREFIX);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if original.to_lowercase().starts_with(WEBHOOK_PREFIX) {
        return Some(format!("Webhook request completed with status {}", text));
    }
    Some(compact_snippet(text))
}

/// Split a `command failed: <cause>; output=<output>` message into
/// `<cause>. Output: <output>`.
pub fn humanize_execution_failure(message: &str) -> Option<String> {
    let text = message.trim();
    if text.is_empty() {
        return None;
    }
    let text = trim_prefix_ignore_case(text, "command failed:");
    let detail = match text.split_once("; output=") {
        Some((cause, output)) => {
            let cause = compact_snippet(cause);
            let output = compact_snippet(output);
            match (cause.is_empty(), output.is_empty()) {
                (_, true) => cause,
                (true, false) => format!("Output: {}", output),
                (false, false) => format!("{}. Output: {}", cause, output),
            }
        }
        None => compact_snippet(text),
    };
    (!detail.is_empty()).then_some(detail)
}
