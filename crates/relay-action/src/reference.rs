//! Resolving what "which pending action" a user means.
//!
//! Text parsing is pure: explicit `act_...` ids, pairing tokens and implicit
//! references ("approve it", "deny this because ..."). Store-backed
//! resolution turns the aliases into concrete ids.

use crate::error::ActionError;
use crate::store::ApprovalStore;
use crate::types::{ActionApproval, PendingScope};

/// Fixed prefix of action approval ids.
pub const ACTION_ID_PREFIX: &str = "act_";

/// Characters required after [`ACTION_ID_PREFIX`].
const ACTION_ID_MIN_SUFFIX: usize = 4;

const PAIRING_TOKEN_MIN: usize = 8;
const PAIRING_TOKEN_MAX: usize = 64;

const PAIRING_STOP_WORDS: &[&str] = &[
    "approve", "approved", "approval", "action", "pair", "pairing", "token", "please", "deny",
    "denied", "reject", "rejected", "decline", "because", "reason",
];

/// `latest` needs exactly one match, so two is enough to detect ambiguity.
pub const LATEST_LISTING_LIMIT: usize = 2;

/// Listing size for `most-recent` and bulk operations.
pub const PENDING_LISTING_LIMIT: usize = 50;

/// Which pending action(s) a command refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActionReference {
    Id(String),
    /// Exactly one pending action must exist.
    Latest,
    /// The newest pending action, however many there are.
    MostRecent,
    /// Every pending action in scope.
    All,
}

impl ActionReference {
    /// Read the first token of an explicit `/approve-action` or
    /// `/deny-action` argument.
    pub fn from_token(token: &str) -> Self {
        let lower = token.trim().to_lowercase();
        match lower.as_str() {
            "all" | "everything" => ActionReference::All,
            "latest" | "newest" => ActionReference::MostRecent,
            "it" | "this" | "that" => ActionReference::Latest,
            _ => ActionReference::Id(normalize_action_id(token)),
        }
    }
}

/// Outcome of resolving an alias against the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PendingResolution {
    Found(String),
    NoneFound,
    Ambiguous { across_contexts: bool },
}

impl PendingResolution {
    /// User-facing explanation when no single id was found. `verb` is the
    /// command the user should retry with, e.g. `approve`.
    pub fn reply(&self, verb: &str) -> Option<String> {
        match self {
            PendingResolution::Found(_) => None,
            PendingResolution::NoneFound => Some("No pending actions.".to_string()),
            PendingResolution::Ambiguous { across_contexts } => {
                let scope = if *across_contexts { " across contexts" } else { "" };
                Some(format!(
                    "Multiple pending actions found{}. Use `/pending-actions` and {} by id.",
                    scope, verb
                ))
            }
        }
    }
}

// =============================================================================
// Text parsing
// =============================================================================

/// Find the first action id (`act_` plus at least four `[a-z0-9_-]`).
/// Returns the lower-cased id and the byte offset just past it.
pub fn find_action_id_with_end(text: &str) -> Option<(String, usize)> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut search = 0;
    while let Some(offset) = lower[search..].find(ACTION_ID_PREFIX) {
        let start = search + offset;
        let mut end = start + ACTION_ID_PREFIX.len();
        while end < bytes.len() && is_action_id_byte(bytes[end]) {
            end += 1;
        }
        if end - start >= ACTION_ID_PREFIX.len() + ACTION_ID_MIN_SUFFIX {
            return Some((lower[start..end].to_string(), end));
        }
        search = start + ACTION_ID_PREFIX.len();
    }
    None
}

pub fn find_action_id(text: &str) -> Option<String> {
    find_action_id_with_end(text).map(|(id, _)| id)
}

fn is_action_id_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_'
}

/// Strip quoting and punctuation from a command argument, preferring an
/// embedded action id.
pub fn normalize_action_id(value: &str) -> String {
    let trimmed = value
        .trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\''))
        .trim_matches(|c| "[](){}<>,.;:!?".contains(c));
    if trimmed.is_empty() {
        return String::new();
    }
    find_action_id(trimmed).unwrap_or_else(|| trimmed.to_string())
}

/// Find a pairing token: 8-64 ASCII alphanumerics that is not a stop-word
/// and either appears next to a pair/token cue or contains a digit or is
/// all upper-case. Returns the upper-cased token and the byte offset past it.
pub fn find_pairing_token_with_end(text: &str) -> Option<(String, usize)> {
    let lower = text.to_lowercase();
    let context_hint = lower.contains("pair") || lower.contains("token");
    let bytes = text.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        if !bytes[idx].is_ascii_alphanumeric() {
            idx += 1;
            continue;
        }
        let start = idx;
        while idx < bytes.len() && bytes[idx].is_ascii_alphanumeric() {
            idx += 1;
        }
        let candidate = &text[start..idx];
        if is_likely_pairing_token(candidate, context_hint) {
            return Some((candidate.to_ascii_uppercase(), idx));
        }
    }
    None
}

fn is_likely_pairing_token(candidate: &str, context_hint: bool) -> bool {
    if !(PAIRING_TOKEN_MIN..=PAIRING_TOKEN_MAX).contains(&candidate.len()) {
        return false;
    }
    let lower = candidate.to_ascii_lowercase();
    if lower.starts_with(ACTION_ID_PREFIX) || PAIRING_STOP_WORDS.contains(&lower.as_str()) {
        return false;
    }
    if context_hint {
        return true;
    }
    candidate.bytes().any(|b| b.is_ascii_digit()) || candidate == candidate.to_ascii_uppercase()
}

/// Trim punctuation and a leading "because"/"reason"/"for" from a reason.
pub fn normalize_deny_reason(value: &str) -> String {
    const PUNCT: &[char] = &[' ', '.', ',', ':', ';', '!', '?', '-'];
    let reason = value.trim().trim_matches(PUNCT);
    let lower = reason.to_ascii_lowercase();
    let reason = ["because ", "reason ", "for "]
        .iter()
        .find(|marker| lower.starts_with(*marker))
        .map(|marker| &reason[marker.len()..])
        .unwrap_or(reason);
    reason.trim().trim_matches(PUNCT).to_string()
}

/// Reason text after the first of `markers` found in `text`, if non-empty.
pub fn reason_after_markers(text: &str, markers: &[&str]) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    for marker in markers {
        let Some(index) = lower.find(marker) else {
            continue;
        };
        let Some(rest) = text.get(index + marker.len()..) else {
            continue;
        };
        let reason = normalize_deny_reason(rest);
        if !reason.is_empty() {
            return Some(reason);
        }
    }
    None
}

fn optional_reason(reason: String) -> Option<String> {
    (!reason.is_empty()).then_some(reason)
}

/// Read the argument of an `approve` command as an action reference.
///
/// Empty means `Latest`. Returns `None` when the argument is not about an
/// action, e.g. a pairing token.
pub fn parse_approve_argument(arg: &str) -> Option<ActionReference> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return Some(ActionReference::Latest);
    }
    let lower = trimmed.to_lowercase();
    if lower.contains("most recent")
        || lower.contains("latest pending")
        || lower == "latest"
        || lower == "newest"
    {
        return Some(ActionReference::MostRecent);
    }
    if lower == "all" || lower == "everything" {
        return Some(ActionReference::All);
    }
    if let Some(id) = find_action_id(trimmed) {
        return Some(ActionReference::Id(id));
    }
    if matches!(lower.as_str(), "it" | "this" | "that" | "action")
        || lower.contains("approve action")
        || lower.contains("the action")
        || lower.contains("approved action")
    {
        return Some(ActionReference::Latest);
    }
    None
}

/// Read the argument of a `deny` command as an action reference plus an
/// optional reason.
pub fn parse_deny_argument(arg: &str) -> Option<(ActionReference, Option<String>)> {
    let trimmed = arg.trim();
    if trimmed.is_empty() {
        return Some((ActionReference::Latest, None));
    }
    let lower = trimmed.to_lowercase();
    if lower == "all" || lower == "everything" {
        return Some((ActionReference::All, None));
    }
    if let Some((id, end)) = find_action_id_with_end(trimmed) {
        let reason = normalize_deny_reason(trimmed.get(end..).unwrap_or_default());
        return Some((ActionReference::Id(id), optional_reason(reason)));
    }
    let implicit = matches!(lower.as_str(), "it" | "this" | "that")
        || lower.starts_with("it ")
        || lower.starts_with("this ")
        || lower.starts_with("that ")
        || lower.contains("action");
    if implicit {
        let reason = reason_after_markers(
            trimmed,
            &["it ", "this ", "that ", "because ", "reason ", "for "],
        );
        return Some((ActionReference::Latest, reason));
    }
    None
}

/// Parse an explicit `/deny-action <ref> [reason]` argument.
pub fn parse_deny_action_command(arg: &str) -> Option<(ActionReference, Option<String>)> {
    let mut fields = arg.split_whitespace();
    let first = fields.next()?;
    let reference = ActionReference::from_token(first);
    if matches!(&reference, ActionReference::Id(id) if id.is_empty()) {
        return None;
    }
    let rest = fields.collect::<Vec<_>>().join(" ");
    Some((reference, optional_reason(normalize_deny_reason(&rest))))
}

// =============================================================================
// Store-backed resolution
// =============================================================================

/// Resolve `latest`: the single pending action in scope, else the single
/// pending action anywhere. More than one is ambiguous.
pub async fn resolve_latest<S>(store: &S, scope: &PendingScope) -> Result<PendingResolution, ActionError>
where
    S: ApprovalStore + ?Sized,
{
    let scoped = store
        .list_pending_action_approvals(scope, LATEST_LISTING_LIMIT)
        .await?;
    match scoped.len() {
        1 => return Ok(PendingResolution::Found(scoped[0].id.clone())),
        n if n > 1 => return Ok(PendingResolution::Ambiguous { across_contexts: false }),
        _ => {}
    }
    let global = store
        .list_pending_action_approvals_global(LATEST_LISTING_LIMIT)
        .await?;
    Ok(match global.as_slice() {
        [] => PendingResolution::NoneFound,
        [only] => PendingResolution::Found(only.id.clone()),
        _ => PendingResolution::Ambiguous { across_contexts: true },
    })
}

/// Resolve `most-recent`: the last listed pending action, scoped first.
pub async fn resolve_most_recent<S>(
    store: &S,
    scope: &PendingScope,
) -> Result<PendingResolution, ActionError>
where
    S: ApprovalStore + ?Sized,
{
    let items = list_pending_with_fallback(store, scope, PENDING_LISTING_LIMIT).await?;
    Ok(match items.last() {
        Some(item) => PendingResolution::Found(item.id.clone()),
        None => PendingResolution::NoneFound,
    })
}

/// Pending actions in scope, or globally when the scope has none.
pub async fn list_pending_with_fallback<S>(
    store: &S,
    scope: &PendingScope,
    limit: usize,
) -> Result<Vec<ActionApproval>, ActionError>
where
    S: ApprovalStore + ?Sized,
{
    let items = store.list_pending_action_approvals(scope, limit).await?;
    if !items.is_empty() {
        return Ok(items);
    }
    Ok(store.list_pending_action_approvals_global(limit).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryApprovalStore;
    use crate::types::{ActionType, NewActionApproval};

    // =====================================================================
    // Action ids
    // =====================================================================

    #[test]
    fn test_find_action_id() {
        assert_eq!(find_action_id("approve act_ab12"), Some("act_ab12".into()));
        assert_eq!(
            find_action_id("please approve `ACT_9f8e-7d_6c` now"),
            Some("act_9f8e-7d_6c".into())
        );
        assert_eq!(find_action_id("act_abc"), None);
        assert_eq!(find_action_id("act_ act_1234"), Some("act_1234".into()));
        assert_eq!(find_action_id("nothing here"), None);
    }

    #[test]
    fn test_find_action_id_end_offset() {
        let (id, end) = find_action_id_with_end("deny act_1234 because risky").unwrap();
        assert_eq!(id, "act_1234");
        assert_eq!(&"deny act_1234 because risky"[end..], " because risky");
    }

    #[test]
    fn test_normalize_action_id() {
        assert_eq!(normalize_action_id(" `act_1234` "), "act_1234");
        assert_eq!(normalize_action_id("(act-1)."), "act-1");
        assert_eq!(normalize_action_id("\"\""), "");
    }

    // =====================================================================
    // Pairing tokens
    // =====================================================================

    #[test]
    fn test_pairing_token_with_digit() {
        let (token, _) = find_pairing_token_with_end("approve ab12cd34").unwrap();
        assert_eq!(token, "AB12CD34");
    }

    #[test]
    fn test_pairing_token_uppercase() {
        let (token, _) = find_pairing_token_with_end("approve QWERTYUI").unwrap();
        assert_eq!(token, "QWERTYUI");
    }

    #[test]
    fn test_pairing_token_with_context_hint() {
        let (token, end) = find_pairing_token_with_end("deny pairing token abcdefgh spam").unwrap();
        assert_eq!(token, "ABCDEFGH");
        assert_eq!(&"deny pairing token abcdefgh spam"[end..], " spam");
    }

    #[test]
    fn test_pairing_token_rejects_plain_words_and_stop_words() {
        assert!(find_pairing_token_with_end("approve everything please").is_none());
        assert!(find_pairing_token_with_end("approved approval").is_none());
        assert!(find_pairing_token_with_end("short A1").is_none());
        assert!(find_pairing_token_with_end("pair because").is_none());
    }

    #[test]
    fn test_pairing_token_length_bounds() {
        let long = "A1".repeat(33);
        assert!(find_pairing_token_with_end(&long).is_none());
        let max = "B2".repeat(32);
        assert!(find_pairing_token_with_end(&max).is_some());
    }

    // =====================================================================
    // Reasons
    // =====================================================================

    #[test]
    fn test_normalize_deny_reason() {
        assert_eq!(normalize_deny_reason(" because unsafe command. "), "unsafe command");
        assert_eq!(normalize_deny_reason("- reason too risky!"), "too risky");
        assert_eq!(normalize_deny_reason("reason: kept"), "reason: kept");
        assert_eq!(normalize_deny_reason("for testing"), "testing");
        assert_eq!(normalize_deny_reason("  ?! "), "");
    }

    // =====================================================================
    // Argument parsing
    // =====================================================================

    #[test]
    fn test_parse_approve_argument() {
        assert_eq!(parse_approve_argument(""), Some(ActionReference::Latest));
        assert_eq!(parse_approve_argument("it"), Some(ActionReference::Latest));
        assert_eq!(parse_approve_argument("the action"), Some(ActionReference::Latest));
        assert_eq!(parse_approve_argument("latest"), Some(ActionReference::MostRecent));
        assert_eq!(
            parse_approve_argument("the most recent one"),
            Some(ActionReference::MostRecent)
        );
        assert_eq!(parse_approve_argument("ALL"), Some(ActionReference::All));
        assert_eq!(
            parse_approve_argument("act_12345"),
            Some(ActionReference::Id("act_12345".into()))
        );
        assert_eq!(parse_approve_argument("AB12CD34"), None);
    }

    #[test]
    fn test_parse_deny_argument_implicit_with_reason() {
        assert_eq!(
            parse_deny_argument("it because unsafe command"),
            Some((ActionReference::Latest, Some("unsafe command".into())))
        );
        assert_eq!(
            parse_deny_argument("this"),
            Some((ActionReference::Latest, None))
        );
    }

    #[test]
    fn test_parse_deny_argument_explicit_id() {
        assert_eq!(
            parse_deny_argument("act_abcd too risky"),
            Some((ActionReference::Id("act_abcd".into()), Some("too risky".into())))
        );
        assert_eq!(
            parse_deny_argument("everything"),
            Some((ActionReference::All, None))
        );
        assert_eq!(parse_deny_argument("AB12CD34 spam"), None);
    }

    #[test]
    fn test_parse_deny_action_command() {
        assert_eq!(
            parse_deny_action_command("act-1 not today"),
            Some((ActionReference::Id("act-1".into()), Some("not today".into())))
        );
        assert_eq!(
            parse_deny_action_command("all"),
            Some((ActionReference::All, None))
        );
        assert_eq!(parse_deny_action_command("   "), None);
    }

    #[test]
    fn test_reference_from_token() {
        assert_eq!(ActionReference::from_token("newest"), ActionReference::MostRecent);
        assert_eq!(ActionReference::from_token("that"), ActionReference::Latest);
        assert_eq!(
            ActionReference::from_token("`act_9999`"),
            ActionReference::Id("act_9999".into())
        );
    }

    // =====================================================================
    // Store-backed resolution
    // =====================================================================

    async fn seed(store: &MemoryApprovalStore, external_id: &str) -> String {
        store
            .create_action_approval(NewActionApproval {
                workspace_id: "ws".into(),
                context_id: "ctx".into(),
                connector: "cli".into(),
                external_id: external_id.into(),
                requester_user_id: "u".into(),
                action_type: ActionType::RunCommand,
                target: "ls".into(),
                summary: String::new(),
                payload: Default::default(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_resolve_latest_none() {
        let store = MemoryApprovalStore::new();
        let resolution = resolve_latest(&store, &PendingScope::new("cli", "room"))
            .await
            .unwrap();
        assert_eq!(resolution, PendingResolution::NoneFound);
        assert_eq!(resolution.reply("approve").unwrap(), "No pending actions.");
    }

    #[tokio::test]
    async fn test_resolve_latest_single() {
        let store = MemoryApprovalStore::new();
        let id = seed(&store, "room").await;
        let resolution = resolve_latest(&store, &PendingScope::new("cli", "room"))
            .await
            .unwrap();
        assert_eq!(resolution, PendingResolution::Found(id));
        assert!(resolution.reply("approve").is_none());
    }

    #[tokio::test]
    async fn test_resolve_latest_ambiguous_in_scope() {
        let store = MemoryApprovalStore::new();
        seed(&store, "room").await;
        seed(&store, "room").await;
        let resolution = resolve_latest(&store, &PendingScope::new("cli", "room"))
            .await
            .unwrap();
        assert_eq!(resolution, PendingResolution::Ambiguous { across_contexts: false });
        assert_eq!(
            resolution.reply("approve").unwrap(),
            "Multiple pending actions found. Use `/pending-actions` and approve by id."
        );
    }

    #[tokio::test]
    async fn test_resolve_latest_falls_back_to_global() {
        let store = MemoryApprovalStore::new();
        let id = seed(&store, "elsewhere").await;
        let scope = PendingScope::new("cli", "room");
        assert_eq!(
            resolve_latest(&store, &scope).await.unwrap(),
            PendingResolution::Found(id)
        );

        seed(&store, "another").await;
        let resolution = resolve_latest(&store, &scope).await.unwrap();
        assert_eq!(resolution, PendingResolution::Ambiguous { across_contexts: true });
        assert!(resolution.reply("deny").unwrap().contains("across contexts"));
    }

    #[tokio::test]
    async fn test_resolve_most_recent_picks_last() {
        let store = MemoryApprovalStore::new();
        seed(&store, "room").await;
        seed(&store, "room").await;
        let newest = seed(&store, "room").await;
        let resolution = resolve_most_recent(&store, &PendingScope::new("cli", "room"))
            .await
            .unwrap();
        assert_eq!(resolution, PendingResolution::Found(newest));
    }

    #[tokio::test]
    async fn test_resolve_most_recent_empty() {
        let store = MemoryApprovalStore::new();
        let resolution = resolve_most_recent(&store, &PendingScope::new("cli", "room"))
            .await
            .unwrap();
        assert_eq!(resolution, PendingResolution::NoneFound);
    }
}
