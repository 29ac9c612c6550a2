//! One-shot sensitive-tool approval grants.
//!
//! An admin approving an action in a conversation mints a grant for that
//! (connector, conversation, user). The next privileged tool call from the
//! same key consumes it. Grants expire after a TTL and are swept lazily.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use relay_core::config::DEFAULT_SENSITIVE_APPROVAL_TTL_SECS;
use relay_core::{MessageInput, Timestamp};

/// Composite grant key: `connector|external_id|user_id`, trimmed and
/// lower-cased.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GrantKey(String);

impl GrantKey {
    /// Returns `None` if any component is blank.
    pub fn new(connector: &str, external_id: &str, user_id: &str) -> Option<Self> {
        let parts = [connector, external_id, user_id].map(|p| p.trim().to_lowercase());
        if parts.iter().any(String::is_empty) {
            return None;
        }
        Some(Self(parts.join("|")))
    }

    pub fn from_input(input: &MessageInput) -> Option<Self> {
        Self::new(&input.connector, &input.external_id, &input.from_user_id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Mutex-guarded TTL store of sensitive-tool grants.
///
/// Shared by reference between the approval engine, which grants, and the
/// tool registry, which consumes.
pub struct SensitiveApprovalGrants {
    ttl: Duration,
    grants: Mutex<HashMap<GrantKey, Timestamp>>,
}

impl Default for SensitiveApprovalGrants {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_SENSITIVE_APPROVAL_TTL_SECS))
    }
}

impl SensitiveApprovalGrants {
    /// A zero TTL falls back to the default of ten minutes.
    pub fn new(ttl: Duration) -> Self {
        let ttl = if ttl.as_secs() == 0 {
            Duration::from_secs(DEFAULT_SENSITIVE_APPROVAL_TTL_SECS)
        } else {
            ttl
        };
        Self {
            ttl,
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Purge expired grants, then set or extend the grant for `key`.
    /// Returns the new expiry.
    pub fn grant(&self, key: &GrantKey, now: Timestamp) -> Timestamp {
        let expires_at = now.after(self.ttl);
        let mut grants = self.lock();
        grants.retain(|_, expiry| *expiry > now);
        grants.insert(key.clone(), expires_at);
        tracing::debug!(key = key.as_str(), expires_at = expires_at.0, "Sensitive approval granted");
        expires_at
    }

    /// Remove the grant for `key` and report whether it was still valid.
    ///
    /// The entry is deleted even when it had already expired.
    pub fn consume(&self, key: &GrantKey, now: Timestamp) -> bool {
        let mut grants = self.lock();
        let valid = grants
            .remove(key)
            .is_some_and(|expires_at| expires_at > now);
        grants.retain(|_, expiry| *expiry > now);
        valid
    }

    /// Number of grants currently held, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<GrantKey, Timestamp>> {
        self.grants.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
