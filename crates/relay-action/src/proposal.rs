//! Extracting action proposals from generated replies.
//!
//! A reply may carry one fenced block:
//!
//! ````text
//! ```action
//! {"type": "run_command", "target": "ls", "summary": "List files", "args": ["-la"]}
//! ```
//! ````
//!
//! Everything other than `type`, `target` and `summary` becomes the payload.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::types::{normalize_action_type, ActionProposal};

static ACTION_FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```action\s*(\{.*?\})\s*```").expect("Invalid action fence regex")
});

/// Find the first ```` ```action ```` block in `text`.
///
/// Returns the proposal and the text with the block removed, or `None` when
/// there is no block, the JSON does not decode to an object, or `type` is
/// missing.
pub fn extract_proposal(text: &str) -> Option<(ActionProposal, String)> {
    let trimmed = text.trim();
    let captures = ACTION_FENCE_RE.captures(trimmed)?;
    let block = captures.get(0)?;
    let json = captures.get(1)?;

    let decoded: Map<String, Value> = match serde_json::from_str(json.as_str()) {
        Ok(map) => map,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring undecodable action block");
            return None;
        }
    };
    let action_type = normalize_action_type(string_field(&decoded, "type"));
    if action_type.is_empty() {
        return None;
    }

    let payload: Map<String, Value> = decoded
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "type" | "target" | "summary"))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    let proposal = ActionProposal::new(action_type, string_field(&decoded, "target").trim())
        .with_summary(string_field(&decoded, "summary").trim())
        .with_payload(payload);
    let proposal = {
        let summary = proposal.summary_or_default();
        proposal.with_summary(summary)
    };

    let mut cleaned = String::with_capacity(trimmed.len());
    cleaned.push_str(&trimmed[..block.start()]);
    cleaned.push_str(&trimmed[block.end()..]);
    Some((proposal, cleaned.trim().to_string()))
}

fn string_field<'a>(map: &'a Map<String, Value>, key: &str) -> &'a str {
    map.get(key).and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ActionType;

    #[test]
    fn test_extract_command_proposal() {
        let text = "I'll check.\n```action\n{\"type\":\"run_command\",\"target\":\"curl\",\"summary\":\"Fetch status\",\"args\":[\"-sS\",\"https://example.com\"]}\n```\nDone soon.";
        let (proposal, cleaned) = extract_proposal(text).unwrap();
        assert_eq!(proposal.action_type, ActionType::RunCommand);
        assert_eq!(proposal.target, "curl");
        assert_eq!(proposal.summary, "Fetch status");
        assert_eq!(
            proposal.payload.get("args").unwrap(),
            &serde_json::json!(["-sS", "https://example.com"])
        );
        assert!(!proposal.payload.contains_key("type"));
        assert_eq!(cleaned, "I'll check.\n\nDone soon.");
    }

    #[test]
    fn test_extract_defaults_summary() {
        let text = "```action\n{\"type\":\"Send-Email\",\"target\":\"ops@example.com\"}\n```";
        let (proposal, cleaned) = extract_proposal(text).unwrap();
        assert_eq!(proposal.action_type, ActionType::SendEmail);
        assert_eq!(proposal.summary, "send_email ops@example.com");
        assert!(cleaned.is_empty());
    }

    #[test]
    fn test_extract_requires_type() {
        assert!(extract_proposal("```action\n{\"target\":\"x\"}\n```").is_none());
        assert!(extract_proposal("```action\n{\"type\":\"  \"}\n```").is_none());
    }

    #[test]
    fn test_extract_ignores_bad_json_and_plain_text() {
        assert!(extract_proposal("```action\n{not json}\n```").is_none());
        assert!(extract_proposal("no block here").is_none());
        assert!(extract_proposal("```json\n{\"type\":\"run_command\"}\n```").is_none());
    }
}
