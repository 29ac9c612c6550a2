//! Intent parsing: explicit commands and natural-language equivalents.
//!
//! Pure functions only. Natural-language dispatch is an ordered table of
//! small rules ([`NL_RULES`]); the first rule that matches wins, so the
//! table order is the precedence contract.

use relay_action::reference::{
    find_action_id, find_action_id_with_end, find_pairing_token_with_end, normalize_deny_reason,
    parse_approve_argument, parse_deny_action_command, parse_deny_argument,
};
use relay_action::ActionReference;

use crate::commands::{normalize_command_name, CommandName};

/// What `/prompt` should do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptCommand {
    Show,
    /// Empty text is answered with the `/prompt set` usage line.
    Set(String),
    Clear,
}

/// A parsed command, ready for its handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Task { prompt: String },
    /// Raw override arguments; validated by the handler so that errors are
    /// reported in lookup order (usage, task, workspace, class, window).
    Route { args: String },
    Search { query: String },
    Open { target: String },
    Status,
    Monitor { goal: String },
    AdminChannel,
    Prompt(PromptCommand),
    ApprovePairing { token: String },
    DenyPairing { token: String, reason: Option<String> },
    PendingActions,
    ApproveAction(ActionReference),
    DenyAction {
        reference: ActionReference,
        reason: Option<String>,
    },
    /// Arguments were missing or malformed; reply with the usage line.
    Usage(CommandName),
}

// =============================================================================
// Explicit commands
// =============================================================================

/// Split text into a normalized leading command word and the rest.
///
/// The leading `/` is optional, so `approve it` and `/approve it` agree.
/// Returns `None` for blank text.
pub fn split_command(text: &str) -> Option<(String, &str)> {
    let trimmed = text.trim();
    let trimmed = trimmed.strip_prefix('/').unwrap_or(trimmed);
    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let first = parts.next().filter(|w| !w.is_empty())?;
    let arg = parts.next().unwrap_or_default().trim();
    Some((normalize_command_name(first), arg))
}

/// Parse `text` as an explicit command when its first word names one.
pub fn parse_explicit(text: &str) -> Option<Command> {
    let (name, arg) = split_command(text)?;
    let command: CommandName = name.parse().ok()?;
    Some(parse_slash(command, arg))
}

/// Build the command for an explicit `name` and its argument text.
pub fn parse_slash(name: CommandName, arg: &str) -> Command {
    let arg = arg.trim();
    let required = |value: &str, build: fn(String) -> Command| {
        if value.is_empty() {
            Command::Usage(name)
        } else {
            build(value.to_string())
        }
    };

    match name {
        CommandName::Task => required(arg, |prompt| Command::Task { prompt }),
        CommandName::Route => Command::Route {
            args: arg.to_string(),
        },
        CommandName::Search => required(arg, |query| Command::Search { query }),
        CommandName::Open => required(arg, |target| Command::Open { target }),
        CommandName::Status => Command::Status,
        CommandName::Monitor => required(arg, |goal| Command::Monitor { goal }),
        CommandName::AdminChannel => {
            if arg.eq_ignore_ascii_case("enable") {
                Command::AdminChannel
            } else {
                Command::Usage(name)
            }
        }
        CommandName::Prompt => match parse_prompt_argument(arg) {
            Some(prompt) => Command::Prompt(prompt),
            None => Command::Usage(name),
        },
        CommandName::Approve => match parse_approve_argument(arg) {
            Some(reference) => Command::ApproveAction(reference),
            None => Command::ApprovePairing {
                token: arg.to_string(),
            },
        },
        CommandName::Deny => match parse_deny_argument(arg) {
            Some((reference, reason)) => Command::DenyAction { reference, reason },
            None => parse_deny_pairing_argument(arg).unwrap_or(Command::Usage(name)),
        },
        CommandName::PendingActions => Command::PendingActions,
        CommandName::ApproveAction => match parse_approve_action_argument(arg) {
            Some(reference) => Command::ApproveAction(reference),
            None => Command::Usage(name),
        },
        CommandName::DenyAction => match parse_deny_action_command(arg) {
            Some((reference, reason)) => Command::DenyAction { reference, reason },
            None => Command::Usage(name),
        },
    }
}

/// `show`, `clear` or `set <text>`, case-insensitive.
pub fn parse_prompt_argument(arg: &str) -> Option<PromptCommand> {
    let trimmed = arg.trim();
    let lower = trimmed.to_ascii_lowercase();
    match lower.as_str() {
        "show" => Some(PromptCommand::Show),
        "clear" => Some(PromptCommand::Clear),
        "set" => Some(PromptCommand::Set(String::new())),
        _ if lower.starts_with("set ") => {
            Some(PromptCommand::Set(trimmed["set ".len()..].trim().to_string()))
        }
        _ => None,
    }
}

/// An embedded action id wins; otherwise the first word is read as an id
/// or an alias (`all`, `latest`, `it`).
fn parse_approve_action_argument(arg: &str) -> Option<ActionReference> {
    if let Some(id) = find_action_id(arg) {
        return Some(ActionReference::Id(id));
    }
    let first = arg.split_whitespace().next()?;
    match ActionReference::from_token(first) {
        ActionReference::Id(id) if id.is_empty() => None,
        reference => Some(reference),
    }
}

/// `<token> [reason]`; the reason defaults later.
fn parse_deny_pairing_argument(arg: &str) -> Option<Command> {
    let mut fields = arg.split_whitespace();
    let token = fields.next()?.to_string();
    let reason = fields.collect::<Vec<_>>().join(" ");
    Some(Command::DenyPairing {
        token,
        reason: (!reason.is_empty()).then_some(reason),
    })
}

// =============================================================================
// Natural language
// =============================================================================

/// Trimmed text plus its ASCII lower-case twin.
///
/// ASCII-only lowering keeps byte offsets identical between the two, so an
/// index found in `lower` slices `trimmed` safely.
pub struct Phrase<'a> {
    pub trimmed: &'a str,
    pub lower: String,
}

impl<'a> Phrase<'a> {
    pub fn new(text: &'a str) -> Option<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self {
            trimmed,
            lower: trimmed.to_ascii_lowercase(),
        })
    }

    fn contains(&self, needle: &str) -> bool {
        self.lower.contains(needle)
    }

    fn contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.lower.contains(n))
    }

    fn mentions_pairing(&self) -> bool {
        self.contains_any(&["pair", "token"])
    }

    fn has_deny_verb(&self) -> bool {
        self.contains_any(&["deny", "reject", "decline"])
    }

    /// Text after the first occurrence of `needle`, trimmed.
    fn after(&self, needle: &str) -> Option<&'a str> {
        let index = self.lower.find(needle)?;
        self.trimmed.get(index + needle.len()..).map(str::trim)
    }

    /// Text after a leading `prefix`, trimmed.
    fn after_prefix(&self, prefix: &str) -> Option<&'a str> {
        if !self.lower.starts_with(prefix) {
            return None;
        }
        self.trimmed.get(prefix.len()..).map(str::trim)
    }
}

/// One entry of the natural-language table.
pub struct NlRule {
    pub name: &'static str,
    pub parse: fn(&Phrase<'_>) -> Option<Command>,
}

/// Natural-language rules in precedence order.
///
/// Approvals and denials of actions come before pairing tokens, which come
/// before listings, administration, retrieval, monitoring and tasks.
pub const NL_RULES: &[NlRule] = &[
    NlRule { name: "approve_most_recent", parse: approve_most_recent },
    NlRule { name: "approve_action_id", parse: approve_action_id },
    NlRule { name: "deny_action_id", parse: deny_action_id },
    NlRule { name: "approve_implicit", parse: approve_implicit },
    NlRule { name: "deny_implicit", parse: deny_implicit },
    NlRule { name: "approve_pairing", parse: approve_pairing },
    NlRule { name: "deny_pairing", parse: deny_pairing },
    NlRule { name: "pending_actions", parse: pending_actions },
    NlRule { name: "admin_channel", parse: admin_channel },
    NlRule { name: "prompt", parse: prompt },
    NlRule { name: "search", parse: search },
    NlRule { name: "open", parse: open },
    NlRule { name: "status", parse: status },
    NlRule { name: "monitor", parse: monitor },
    NlRule { name: "task_from_conversation", parse: task_from_conversation },
    NlRule { name: "task_prefix", parse: task_prefix },
];

/// Evaluate [`NL_RULES`] in order and return the first match.
pub fn parse_natural_language(text: &str) -> Option<Command> {
    let phrase = Phrase::new(text)?;
    NL_RULES.iter().find_map(|rule| {
        let command = (rule.parse)(&phrase)?;
        tracing::debug!(rule = rule.name, "Natural-language command matched");
        Some(command)
    })
}

fn approve_most_recent(p: &Phrase<'_>) -> Option<Command> {
    let matched = p.contains("approve")
        && !p.mentions_pairing()
        && p.contains_any(&["most recent", "latest", "newest", "last pending"])
        && p.contains_any(&["pending action", "pending approval"]);
    matched.then_some(Command::ApproveAction(ActionReference::MostRecent))
}

fn approve_action_id(p: &Phrase<'_>) -> Option<Command> {
    if !p.contains("approve") || p.has_deny_verb() {
        return None;
    }
    find_action_id(p.trimmed).map(|id| Command::ApproveAction(ActionReference::Id(id)))
}

fn deny_action_id(p: &Phrase<'_>) -> Option<Command> {
    if !p.has_deny_verb() {
        return None;
    }
    let (id, end) = find_action_id_with_end(p.trimmed)?;
    let reason = normalize_deny_reason(p.trimmed.get(end..).unwrap_or_default());
    Some(Command::DenyAction {
        reference: ActionReference::Id(id),
        reason: (!reason.is_empty()).then_some(reason),
    })
}

fn approve_implicit(p: &Phrase<'_>) -> Option<Command> {
    let latest = Some(Command::ApproveAction(ActionReference::Latest));
    if p.lower == "approve" || p.lower == "yes" {
        return latest;
    }
    if !p.contains("approve") || p.mentions_pairing() {
        return None;
    }
    let matched = p.contains_any(&[
        "approve action",
        "approve the action",
        "approve it",
        "approve this",
        "approve that",
        "yes i approve",
    ]);
    if matched {
        latest
    } else {
        None
    }
}

fn deny_implicit(p: &Phrase<'_>) -> Option<Command> {
    if !p.has_deny_verb() || p.mentions_pairing() {
        return None;
    }
    let matched = p.contains_any(&[
        "deny action",
        "reject action",
        "deny it",
        "reject it",
        "decline it",
        "deny this",
        "reject this",
        "decline this",
    ]);
    if !matched {
        return None;
    }
    // The first marker present decides, even when nothing follows it.
    let reason = ["because ", "reason ", "for "]
        .iter()
        .find_map(|marker| p.after(marker))
        .map(normalize_deny_reason)
        .filter(|r| !r.is_empty());
    Some(Command::DenyAction {
        reference: ActionReference::Latest,
        reason,
    })
}

fn approve_pairing(p: &Phrase<'_>) -> Option<Command> {
    if !p.contains("approve") || p.has_deny_verb() {
        return None;
    }
    let (token, _) = find_pairing_token_with_end(p.trimmed)?;
    Some(Command::ApprovePairing { token })
}

fn deny_pairing(p: &Phrase<'_>) -> Option<Command> {
    if !p.has_deny_verb() {
        return None;
    }
    let (token, end) = find_pairing_token_with_end(p.trimmed)?;
    let reason = normalize_deny_reason(p.trimmed.get(end..).unwrap_or_default());
    Some(Command::DenyPairing {
        token,
        reason: (!reason.is_empty()).then_some(reason),
    })
}

fn pending_actions(p: &Phrase<'_>) -> Option<Command> {
    p.contains_any(&["pending action", "pending approval"])
        .then_some(Command::PendingActions)
}

fn admin_channel(p: &Phrase<'_>) -> Option<Command> {
    (p.contains("admin channel") && p.contains("enable")).then_some(Command::AdminChannel)
}

fn prompt(p: &Phrase<'_>) -> Option<Command> {
    if p.contains_any(&["show prompt", "prompt show"]) {
        return Some(Command::Prompt(PromptCommand::Show));
    }
    if p.contains_any(&["clear prompt", "prompt clear"]) {
        return Some(Command::Prompt(PromptCommand::Clear));
    }
    let value = ["set prompt", "update prompt"]
        .iter()
        .find_map(|phrase| p.after(phrase))?;
    let value = strip_prefix_ignore_case(value, "to ").unwrap_or(value).trim();
    if value.is_empty() {
        return None;
    }
    Some(Command::Prompt(PromptCommand::Set(value.to_string())))
}

fn search(p: &Phrase<'_>) -> Option<Command> {
    const PREFIXES: &[&str] = &["search for ", "search docs for ", "find in docs ", "find docs for "];
    if let Some(value) = PREFIXES.iter().find_map(|prefix| p.after_prefix(prefix)) {
        return non_empty(value).map(|query| Command::Search { query });
    }
    let value = p.after_prefix("search ")?;
    if value == "status" {
        return None;
    }
    non_empty(value).map(|query| Command::Search { query })
}

fn open(p: &Phrase<'_>) -> Option<Command> {
    const PREFIXES: &[&str] = &["open file ", "open doc ", "open markdown ", "show file ", "open "];
    let value = PREFIXES.iter().find_map(|prefix| p.after_prefix(prefix))?;
    non_empty(sanitize_open_target(value)).map(|target| Command::Open { target })
}

fn status(p: &Phrase<'_>) -> Option<Command> {
    let matched = p.lower == "status"
        || p.contains_any(&["qmd status", "index status", "search index status"]);
    matched.then_some(Command::Status)
}

fn monitor(p: &Phrase<'_>) -> Option<Command> {
    const PREFIXES: &[&str] = &[
        "monitor ",
        "track ",
        "keep monitoring ",
        "set an alert for ",
        "set an alert to monitor ",
        "create a monitoring objective for ",
        "create monitoring objective for ",
        "create a monitor objective for ",
        "set up a monitoring objective for ",
        "setup a monitoring objective for ",
        "create an objective to monitor ",
        "create a monitoring objective to monitor ",
        "set up monitoring for ",
        "setup monitoring for ",
    ];
    const PHRASES: &[&str] = &["set an alert and monitor ", "create an alert and monitor "];
    const OBJECTIVE_MARKERS: &[&str] = &[" for ", " to monitor "];

    let goal_command = |goal: String| Some(Command::Monitor { goal });

    if let Some(value) = PREFIXES.iter().find_map(|prefix| p.after_prefix(prefix)) {
        let goal = clean_monitor_goal(value);
        return if goal.is_empty() { None } else { goal_command(goal) };
    }
    for phrase in PHRASES {
        if let Some(value) = p.after(phrase) {
            let goal = clean_monitor_goal(value);
            if !goal.is_empty() {
                return goal_command(goal);
            }
        }
    }
    if p.contains_any(&["monitoring objective", "monitor objective"]) {
        for marker in OBJECTIVE_MARKERS {
            if let Some(value) = p.after(marker) {
                let goal = clean_monitor_goal(value);
                if !goal.is_empty() {
                    return goal_command(goal);
                }
            }
        }
    }
    None
}

fn task_from_conversation(p: &Phrase<'_>) -> Option<Command> {
    const PHRASES: &[&str] = &[
        "turn that into an actionable task",
        "turn this into an actionable task",
        "turn that into a task",
        "turn this into a task",
        "create one actionable task",
        "please create one actionable task",
        "create an actionable task",
        "make this a task",
        "create a task from this",
    ];
    const ID_MARKERS: &[&str] = &[
        " and tell me the task id",
        ", and tell me the task id",
        " and return only the task id",
        ", return only the task id",
    ];

    let after = PHRASES.iter().find_map(|phrase| p.after(phrase))?;
    let after = cut_at_markers(after, ID_MARKERS);
    let after = after.trim_matches(SENTENCE_PUNCT);
    let after = strip_prefix_ignore_case(after, "in this workspace").unwrap_or(after);
    let after = after.trim().trim_matches(SENTENCE_PUNCT);

    let prompt = if !after.is_empty() {
        format!("Create one actionable task: {}", after)
    } else if p.contains("rollout plan") {
        "Create one actionable task from the rollout plan discussed in this conversation.".to_string()
    } else {
        "Create one actionable task from the latest plan discussed in this conversation.".to_string()
    };
    Some(Command::Task { prompt })
}

fn task_prefix(p: &Phrase<'_>) -> Option<Command> {
    const PREFIXES: &[&str] = &[
        "task ",
        "create task ",
        "create a task to ",
        "create a task ",
        "please create a task to ",
        "please create a task ",
        "add task ",
        "add a task ",
        "queue task ",
        "queue a task ",
    ];
    let value = PREFIXES.iter().find_map(|prefix| p.after_prefix(prefix))?;
    non_empty(value).map(|prompt| Command::Task { prompt })
}

// =============================================================================
// Helpers
// =============================================================================

const SENTENCE_PUNCT: &[char] = &[' ', '.', ',', ':', ';', '!', '?'];

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

/// Cut `value` at every marker found, in order, ignoring ASCII case.
fn cut_at_markers<'a>(value: &'a str, markers: &[&str]) -> &'a str {
    let mut value = value.trim();
    for marker in markers {
        if let Some(index) = value.to_ascii_lowercase().find(marker) {
            value = value[..index].trim();
        }
    }
    value
}

/// Strip quotes, then sentence punctuation, from an `open` target.
pub fn sanitize_open_target(value: &str) -> &str {
    value
        .trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\''))
        .trim_matches(SENTENCE_PUNCT)
}

/// Drop trailing "and tell me ..." style requests and a leading `to `.
pub fn clean_monitor_goal(value: &str) -> String {
    const MARKERS: &[&str] = &[
        " and tell me",
        ", and tell me",
        " and then tell me",
        ", then tell me",
        " and show me",
        ", and show me",
        " and report",
        ", and report",
    ];
    let goal = cut_at_markers(value, MARKERS);
    let goal = goal.trim_matches(SENTENCE_PUNCT);
    let goal = strip_prefix_ignore_case(goal, "to ").unwrap_or(goal);
    goal.trim().to_string()
}
