//! The explicit command surface: names, usage strings and the catalog
//! connectors register as slash commands.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Every explicit command the gateway understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandName {
    Task,
    Route,
    Search,
    Open,
    Status,
    Monitor,
    AdminChannel,
    Prompt,
    Approve,
    Deny,
    PendingActions,
    ApproveAction,
    DenyAction,
}

impl CommandName {
    pub const ALL: [CommandName; 13] = [
        CommandName::Task,
        CommandName::Route,
        CommandName::Search,
        CommandName::Open,
        CommandName::Status,
        CommandName::Monitor,
        CommandName::AdminChannel,
        CommandName::Prompt,
        CommandName::Approve,
        CommandName::Deny,
        CommandName::PendingActions,
        CommandName::ApproveAction,
        CommandName::DenyAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Task => "task",
            CommandName::Route => "route",
            CommandName::Search => "search",
            CommandName::Open => "open",
            CommandName::Status => "status",
            CommandName::Monitor => "monitor",
            CommandName::AdminChannel => "admin-channel",
            CommandName::Prompt => "prompt",
            CommandName::Approve => "approve",
            CommandName::Deny => "deny",
            CommandName::PendingActions => "pending-actions",
            CommandName::ApproveAction => "approve-action",
            CommandName::DenyAction => "deny-action",
        }
    }

    /// Fixed reply for missing or malformed arguments. Commands that take no
    /// arguments have none.
    pub fn usage(&self) -> Option<&'static str> {
        match self {
            CommandName::Task => Some("Usage: /task <what should be done>"),
            CommandName::Route => Some(
                "Usage: /route <task-id> <question|issue|task|moderation|noise> [p1|p2|p3] [due-window like 2h or 1d]",
            ),
            CommandName::Search => Some("Usage: /search <query>"),
            CommandName::Open => Some("Usage: /open <path-or-docid>"),
            CommandName::Monitor => Some("Usage: /monitor <what to track>"),
            CommandName::AdminChannel => Some("Usage: /admin-channel enable"),
            CommandName::Prompt => Some("Usage: /prompt show | /prompt set <text> | /prompt clear"),
            CommandName::Approve => Some("Usage: /approve <pairing-token>"),
            CommandName::Deny => Some("Usage: /deny <pairing-token> [reason]"),
            CommandName::ApproveAction => {
                Some("Usage: /approve-action <action-id> or 'approve all'")
            }
            CommandName::DenyAction => Some("Usage: /deny-action <action-id> [reason]"),
            CommandName::Status | CommandName::PendingActions => None,
        }
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandName {
    type Err = String;

    /// Accepts anything [`normalize_command_name`] maps onto a known name,
    /// e.g. `/Approve_Action@relay_bot`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize_command_name(s);
        CommandName::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("Unknown command: {}", s))
    }
}

/// Lower-case, strip a leading `/` and an `@bot` suffix, map `_` to `-`.
pub fn normalize_command_name(command: &str) -> String {
    let lower = command.trim().to_lowercase();
    let name = lower.strip_prefix('/').unwrap_or(&lower);
    let name = name.split('@').next().unwrap_or_default();
    name.trim().replace('_', "-")
}

// =============================================================================
// Catalog
// =============================================================================

/// One entry of the slash-command catalog connectors register.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlashCommand {
    pub name: CommandName,
    pub description: &'static str,
    /// Option name for connectors with typed arguments; `None` for
    /// commands without arguments.
    pub argument_name: Option<&'static str>,
    pub argument_description: Option<&'static str>,
    pub argument_required: bool,
}

impl SlashCommand {
    const fn bare(name: CommandName, description: &'static str) -> Self {
        Self {
            name,
            description,
            argument_name: None,
            argument_description: None,
            argument_required: false,
        }
    }

    const fn with_argument(
        name: CommandName,
        description: &'static str,
        argument_name: &'static str,
        argument_description: &'static str,
    ) -> Self {
        Self {
            name,
            description,
            argument_name: Some(argument_name),
            argument_description: Some(argument_description),
            argument_required: true,
        }
    }
}

/// The full catalog, in registration order.
pub fn slash_commands() -> Vec<SlashCommand> {
    use CommandName::*;
    vec![
        SlashCommand::with_argument(Task, "Create a routed task", "prompt", "What should be done"),
        SlashCommand::with_argument(Search, "Search workspace knowledge", "query", "What to search for"),
        SlashCommand::with_argument(Open, "Open a markdown path", "target", "Path or document id"),
        SlashCommand::bare(Status, "Show search index status"),
        SlashCommand::with_argument(Monitor, "Create a monitoring objective", "goal", "Objective to monitor"),
        SlashCommand::with_argument(AdminChannel, "Enable admin mode for this channel", "mode", "Use: enable"),
        SlashCommand::with_argument(Prompt, "Set the system prompt for this channel", "text", "show, clear or set <text>"),
        SlashCommand::with_argument(Approve, "Approve a pairing token", "token", "Pairing token"),
        SlashCommand::with_argument(Deny, "Deny a pairing token", "token_reason", "Token and optional reason"),
        SlashCommand::bare(PendingActions, "List pending action approvals"),
        SlashCommand::with_argument(ApproveAction, "Approve a pending action", "action_id", "Action ID"),
        SlashCommand::with_argument(DenyAction, "Deny a pending action", "action_reason", "Action ID and optional reason"),
        SlashCommand::with_argument(Route, "Override triage routing for a task", "override", "task-id class [p1|p2|p3] [due-window]"),
    ]
}
