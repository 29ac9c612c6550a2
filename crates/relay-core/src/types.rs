use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Roles allowed to approve actions and administer conversations.
pub const ADMIN_ROLES: [&str; 2] = ["admin", "overlord"];

/// Returns true if `role` carries admin rights. Case-insensitive.
pub fn is_admin_role(role: &str) -> bool {
    let role = role.trim().to_lowercase();
    ADMIN_ROLES.contains(&role.as_str())
}

// =============================================================================
// Time
// =============================================================================

/// Unix timestamp in seconds.
///
/// Compared by value. Two Timestamps with the same inner value are equal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    /// Timestamp `duration` later, saturating at `i64::MAX`.
    pub fn after(&self, duration: Duration) -> Self {
        let secs = i64::try_from(duration.as_secs()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(secs))
    }

    /// RFC 3339 rendering used in user-visible replies.
    pub fn to_rfc3339(&self) -> String {
        self.to_datetime()
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}

// =============================================================================
// Messages
// =============================================================================

/// One inbound chat message as delivered by a connector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageInput {
    /// Connector name, e.g. `telegram`, `discord`, `cli`.
    pub connector: String,
    /// Conversation id on the connector side.
    pub external_id: String,
    pub display_name: String,
    pub from_user_id: String,
    pub text: String,
}

impl MessageInput {
    pub fn new(
        connector: impl Into<String>,
        external_id: impl Into<String>,
        from_user_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            connector: connector.into(),
            external_id: external_id.into(),
            display_name: String::new(),
            from_user_id: from_user_id.into(),
            text: text.into(),
        }
    }
}

/// Reply contract for every processed message.
///
/// `handled == false` tells the connector to fall back to another responder.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageOutput {
    pub handled: bool,
    pub reply: String,
}

impl MessageOutput {
    pub fn handled(reply: impl Into<String>) -> Self {
        Self {
            handled: true,
            reply: reply.into(),
        }
    }

    pub fn unhandled() -> Self {
        Self::default()
    }
}

/// Request-scoped data threaded through every handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub input: MessageInput,
    pub workspace_id: String,
    pub context_id: String,
}

impl RequestContext {
    pub fn new(
        input: MessageInput,
        workspace_id: impl Into<String>,
        context_id: impl Into<String>,
    ) -> Self {
        Self {
            input,
            workspace_id: workspace_id.into(),
            context_id: context_id.into(),
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

/// A linked connector identity and its role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    pub role: String,
}

impl UserIdentity {
    pub fn is_admin(&self) -> bool {
        is_admin_role(&self.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_admin_role() {
        assert!(is_admin_role("admin"));
        assert!(is_admin_role("Overlord"));
        assert!(is_admin_role("  ADMIN "));
        assert!(!is_admin_role("member"));
        assert!(!is_admin_role(""));
    }

    #[test]
    fn test_identity_is_admin() {
        let identity = UserIdentity {
            user_id: "u1".into(),
            role: "overlord".into(),
        };
        assert!(identity.is_admin());
        let member = UserIdentity {
            user_id: "u2".into(),
            role: "member".into(),
        };
        assert!(!member.is_admin());
    }

    #[test]
    fn test_timestamp_after() {
        let ts = Timestamp(1_000);
        assert_eq!(ts.after(Duration::from_secs(600)), Timestamp(1_600));
        assert_eq!(Timestamp(i64::MAX).after(Duration::from_secs(1)), Timestamp(i64::MAX));
    }

    #[test]
    fn test_timestamp_ordering() {
        assert!(Timestamp(5) < Timestamp(6));
        assert_eq!(Timestamp(7), Timestamp(7));
    }

    #[test]
    fn test_timestamp_to_datetime_roundtrip() {
        let now = Utc::now();
        let ts = Timestamp::from_datetime(now);
        assert_eq!(ts.to_datetime().timestamp(), now.timestamp());
    }

    #[test]
    fn test_timestamp_rfc3339() {
        assert_eq!(Timestamp(0).to_rfc3339(), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_message_output_constructors() {
        let out = MessageOutput::handled("done");
        assert!(out.handled);
        assert_eq!(out.reply, "done");
        let out = MessageOutput::unhandled();
        assert!(!out.handled);
        assert!(out.reply.is_empty());
    }

    #[test]
    fn test_message_input_new() {
        let input = MessageInput::new("cli", "room-1", "alice", "hello");
        assert_eq!(input.connector, "cli");
        assert_eq!(input.external_id, "room-1");
        assert_eq!(input.from_user_id, "alice");
        assert!(input.display_name.is_empty());
    }
}
