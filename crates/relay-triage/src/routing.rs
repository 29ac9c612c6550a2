//! Route decisions: class defaults, auto-routing and admin overrides.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use relay_core::text::{compact_snippet, truncate_chars};
use relay_core::{MessageInput, Timestamp};

use crate::classifier::{classify, needs_external_follow_up};
use crate::error::TriageError;
use crate::types::{RouteDecision, TriageClass, TriagePriority};

pub const LANE_MODERATION: &str = "moderation";
pub const LANE_OPERATIONS: &str = "operations";
pub const LANE_SUPPORT: &str = "support";
pub const LANE_BACKLOG: &str = "backlog";

const HOUR: u64 = 60 * 60;
const DAY: u64 = 24 * HOUR;

/// Routed task titles are cut to this many characters.
const TITLE_MAX_CHARS: usize = 72;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)?(?:ns|us|µs|ms|s|m|h))+$").expect("Invalid duration regex")
});

static DURATION_PART_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)(ns|us|µs|ms|s|m|h)").expect("Invalid duration part regex")
});

/// Priority, due window and lane a class routes to when nobody overrides it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingDefaults {
    pub priority: TriagePriority,
    pub due_window: Option<Duration>,
    pub lane: &'static str,
}

pub fn routing_defaults(class: TriageClass) -> RoutingDefaults {
    let (priority, window_secs, lane) = match class {
        TriageClass::Moderation => (TriagePriority::P1, 2 * HOUR, LANE_MODERATION),
        TriageClass::Issue => (TriagePriority::P2, 8 * HOUR, LANE_OPERATIONS),
        TriageClass::Task => (TriagePriority::P2, 24 * HOUR, LANE_OPERATIONS),
        TriageClass::Question => (TriagePriority::P3, 48 * HOUR, LANE_SUPPORT),
        TriageClass::Noise => (TriagePriority::P3, 0, LANE_BACKLOG),
    };
    RoutingDefaults {
        priority,
        due_window: (window_secs > 0).then(|| Duration::from_secs(window_secs)),
        lane,
    }
}

/// Classify `text` and attach the class defaults and message provenance.
pub fn derive_decision(
    input: &MessageInput,
    workspace_id: &str,
    context_id: &str,
    text: &str,
    now: Timestamp,
) -> RouteDecision {
    let classification = classify(text);
    let defaults = routing_defaults(classification.class);
    RouteDecision {
        task_id: None,
        workspace_id: workspace_id.to_string(),
        context_id: context_id.to_string(),
        class: classification.class,
        priority: defaults.priority,
        due_at: defaults.due_window.map(|window| now.after(window)),
        due_window: defaults.due_window,
        lane: defaults.lane.to_string(),
        source_connector: input.connector.trim().to_lowercase(),
        source_external_id: input.external_id.trim().to_string(),
        source_user_id: input.from_user_id.trim().to_string(),
        source_text: text.trim().to_string(),
        reason: classification.reason.to_string(),
    }
}

/// Whether a decision should create a task without anyone asking.
///
/// Questions only qualify when they ask for asynchronous or external work.
pub fn should_auto_route(decision: &RouteDecision) -> bool {
    match decision.class {
        TriageClass::Moderation | TriageClass::Issue | TriageClass::Task => true,
        TriageClass::Question => needs_external_follow_up(&decision.source_text),
        TriageClass::Noise => false,
    }
}

pub fn build_routed_task_title(class: TriageClass, source_text: &str) -> String {
    let tag = class.title_tag();
    let snippet = compact_snippet(source_text);
    if snippet.is_empty() {
        return format!("{tag} Routed message");
    }
    let title = format!("{tag} {snippet}");
    truncate_chars(&title, TITLE_MAX_CHARS).trim_end().to_string()
}

pub fn build_routed_task_prompt(decision: &RouteDecision) -> String {
    let mut lines = vec![
        "Routed inbound community message for follow-up.".to_string(),
        format!(
            "Classification: `{}` ({}).",
            decision.class,
            decision.reason.trim()
        ),
        format!("Priority: `{}`.", decision.priority),
        format!("Assigned lane: `{}`.", decision.lane.trim()),
        format!(
            "Source: connector=`{}` external_id=`{}` user_id=`{}`.",
            decision.source_connector, decision.source_external_id, decision.source_user_id
        ),
    ];
    if let Some(due_at) = decision.due_at {
        lines.push(format!("Due by: `{}`.", due_at.to_rfc3339()));
    }
    lines.push("Original message:".to_string());
    lines.push("```".to_string());
    lines.push(decision.source_text.trim().to_string());
    lines.push("```".to_string());
    lines.join("\n")
}

/// Parse a due window: `<n>d` for whole days, otherwise a duration such as
/// `2h`, `90m` or `1h30m`. Zero and negative windows are rejected.
pub fn parse_due_window(value: &str) -> Result<Duration, TriageError> {
    let trimmed = value.trim().to_lowercase();
    let invalid = || TriageError::InvalidDueWindow(value.trim().to_string());
    if trimmed.is_empty() {
        return Err(invalid());
    }

    if let Some(days) = trimmed.strip_suffix('d') {
        if days.is_empty() || !days.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }
        let days: u64 = days.parse().map_err(|_| invalid())?;
        if days == 0 {
            return Err(invalid());
        }
        return days
            .checked_mul(DAY)
            .map(Duration::from_secs)
            .ok_or_else(invalid);
    }

    if !DURATION_RE.is_match(&trimmed) {
        return Err(invalid());
    }
    let mut total_secs = 0f64;
    for caps in DURATION_PART_RE.captures_iter(&trimmed) {
        let amount: f64 = caps[1].parse().map_err(|_| invalid())?;
        let unit_secs = match &caps[2] {
            "h" => HOUR as f64,
            "m" => 60.0,
            "s" => 1.0,
            "ms" => 1e-3,
            "us" | "µs" => 1e-6,
            _ => 1e-9,
        };
        total_secs += amount * unit_secs;
    }
    if !total_secs.is_finite() || total_secs <= 0.0 {
        return Err(invalid());
    }
    Duration::try_from_secs_f64(total_secs).map_err(|_| invalid())
}

/// A parsed `/route` override: `<task-id> <class> [priority|window] [window]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteOverride {
    pub task_id: String,
    pub class: TriageClass,
    pub priority: TriagePriority,
    pub due_window: Option<Duration>,
    pub lane: String,
}

impl RouteOverride {
    /// Parse override arguments. Nothing is applied here, so a rejected
    /// override never touches stored state.
    pub fn parse(args: &str) -> Result<Self, TriageError> {
        let fields: Vec<&str> = args.split_whitespace().collect();
        if fields.len() < 2 {
            return Err(TriageError::MissingArguments);
        }
        let class: TriageClass = fields[1].parse()?;
        let defaults = routing_defaults(class);
        let mut priority = defaults.priority;
        let mut due_window = defaults.due_window;

        if let Some(third) = fields.get(2) {
            match third.parse::<TriagePriority>() {
                Ok(p) => priority = p,
                Err(_) => due_window = Some(parse_due_window(third)?),
            }
        }
        if let Some(fourth) = fields.get(3) {
            due_window = Some(parse_due_window(fourth)?);
        }

        let mut lane = defaults.lane;
        if class == TriageClass::Noise {
            priority = TriagePriority::P3;
            due_window = None;
            lane = LANE_BACKLOG;
        }

        Ok(Self {
            task_id: fields[0].to_string(),
            class,
            priority,
            due_window,
            lane: lane.to_string(),
        })
    }

    pub fn due_at(&self, now: Timestamp) -> Option<Timestamp> {
        self.due_window.map(|window| now.after(window))
    }
}
