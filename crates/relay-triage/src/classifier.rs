//! Keyword-rule message classifier.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//! empty, acknowledgement, moderation, issue, task, question. Anything
//! left over is noise.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{Classification, TriageClass};

// =============================================================================
// Keyword tables
// =============================================================================

const MODERATION_KEYWORDS: &[&str] = &[
    "spam",
    "scam",
    "abuse",
    "harass",
    "report user",
    "ban ",
    "mute ",
    "phishing",
    "nsfw",
    "offensive",
];

const ISSUE_KEYWORDS: &[&str] = &[
    "bug",
    "error",
    "broken",
    "fails",
    "failing",
    "cannot",
    "can't",
    "doesnt work",
    "doesn't work",
    "issue",
    "problem",
    "outage",
    "stuck",
    "exception",
    "not working",
];

/// Imperative openers that mark a task when followed by enough words.
const TASK_PREFIXES: &[&str] = &["please ", "need you to ", "help me ", "todo ", "create a task"];

const TASK_MIN_WORDS: usize = 4;

const TASK_KEYWORDS: &[&str] = &[
    "follow up",
    "action item",
    "assign this",
    "schedule this",
    "investigate this",
    "please investigate",
    "set reminder",
    "track this",
];

const QUESTION_OPENERS: &[&str] = &["how ", "what ", "when ", "where ", "why ", "can ", "could "];

const ASYNC_CUES: &[&str] = &[
    "follow up",
    "monitor",
    "track",
    "watch",
    "remind",
    "schedule",
    "notify me",
    "later",
    "tomorrow",
];

const RESEARCH_CUES: &[&str] = &[
    "run a search",
    "search ",
    "web search",
    "look up",
    "lookup",
    "find ",
    "check ",
    "fetch ",
];

const RESEARCH_TOPIC_CUES: &[&str] = &["pricing", "price ", "cost ", "plans", "latest", "today"];

const WEB_ACTION_CUES: &[&str] = &["search", "check", "monitor", "track", "look up", "verify", "fetch"];

/// Texts shorter than this are always acknowledgements.
const MIN_MEANINGFUL_CHARS: usize = 4;

static ACKNOWLEDGEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:ok+|k+|thanks!?|thx!?|lol+|lmao+|gm|gn|hi+|yo+)$")
        .expect("Invalid acknowledgement regex")
});

static MINUTES_DELAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bin \d+ minutes?\b").expect("Invalid minutes delay regex")
});

static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[a-z0-9][a-z0-9-]*\.[a-z]{2,}\b").expect("Invalid domain regex")
});

// =============================================================================
// Rule table
// =============================================================================

/// One classification rule. Input is already normalized.
pub struct TriageRule {
    pub class: TriageClass,
    pub reason: &'static str,
    pub matches: fn(&str) -> bool,
}

/// Precedence order of the classifier. Earlier rules win.
pub const TRIAGE_RULES: [TriageRule; 6] = [
    TriageRule {
        class: TriageClass::Noise,
        reason: "empty message",
        matches: str::is_empty,
    },
    TriageRule {
        class: TriageClass::Noise,
        reason: "short acknowledgement",
        matches: is_acknowledgement,
    },
    TriageRule {
        class: TriageClass::Moderation,
        reason: "moderation keywords",
        matches: looks_like_moderation,
    },
    TriageRule {
        class: TriageClass::Issue,
        reason: "issue keywords",
        matches: looks_like_issue,
    },
    TriageRule {
        class: TriageClass::Task,
        reason: "action request",
        matches: looks_like_task,
    },
    TriageRule {
        class: TriageClass::Question,
        reason: "question pattern",
        matches: looks_like_question,
    },
];

const FALLBACK: Classification = Classification {
    class: TriageClass::Noise,
    reason: "no routing intent",
};

// =============================================================================
// Public API
// =============================================================================

/// Lower-case, trim and collapse all whitespace (including newlines).
pub fn normalize_for_triage(input: &str) -> String {
    input
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify free text into a triage class and a short reason.
pub fn classify(text: &str) -> Classification {
    let normalized = normalize_for_triage(text);
    let classification = TRIAGE_RULES
        .iter()
        .find(|rule| (rule.matches)(&normalized))
        .map(|rule| Classification {
            class: rule.class,
            reason: rule.reason,
        })
        .unwrap_or(FALLBACK);
    tracing::debug!(
        class = %classification.class,
        reason = classification.reason,
        "Message classified"
    );
    classification
}

/// Whether a question still warrants a routed task because it asks for
/// asynchronous or external work.
pub fn needs_external_follow_up(text: &str) -> bool {
    let normalized = normalize_for_triage(text);
    if normalized.is_empty() {
        return false;
    }
    if contains_any(&normalized, ASYNC_CUES) || MINUTES_DELAY_RE.is_match(&normalized) {
        return true;
    }
    if contains_any(&normalized, RESEARCH_CUES) && contains_any(&normalized, RESEARCH_TOPIC_CUES) {
        return true;
    }
    references_web_target(&normalized) && contains_any(&normalized, WEB_ACTION_CUES)
}

// =============================================================================
// Predicates
// =============================================================================

fn is_acknowledgement(text: &str) -> bool {
    text.chars().count() < MIN_MEANINGFUL_CHARS || ACKNOWLEDGEMENT_RE.is_match(text)
}

fn looks_like_moderation(text: &str) -> bool {
    contains_any(text, MODERATION_KEYWORDS)
}

fn looks_like_issue(text: &str) -> bool {
    contains_any(text, ISSUE_KEYWORDS)
}

fn looks_like_task(text: &str) -> bool {
    let prefixed = TASK_PREFIXES.iter().any(|prefix| text.starts_with(prefix))
        && text.split_whitespace().count() >= TASK_MIN_WORDS;
    prefixed || contains_any(text, TASK_KEYWORDS)
}

fn looks_like_question(text: &str) -> bool {
    text.contains('?') || QUESTION_OPENERS.iter().any(|opener| text.starts_with(opener))
}

fn references_web_target(text: &str) -> bool {
    text.contains("http://") || text.contains("https://") || DOMAIN_RE.is_match(text)
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class_of(text: &str) -> TriageClass {
        classify(text).class
    }

    #[test]
    fn test_normalize_for_triage() {
        assert_eq!(normalize_for_triage("  Hello\n\nWORLD \t again "), "hello world again");
        assert_eq!(normalize_for_triage("   "), "");
    }

    #[test]
    fn test_empty_is_noise() {
        let c = classify("   \n ");
        assert_eq!(c.class, TriageClass::Noise);
        assert_eq!(c.reason, "empty message");
    }

    #[test]
    fn test_acknowledgements_are_noise() {
        for text in ["ok", "OK", "okkk", "thanks!", "thx", "lol", "lmaooo", "gm", "hiii", "yooo", "k"] {
            let c = classify(text);
            assert_eq!(c.class, TriageClass::Noise, "{text}");
            assert_eq!(c.reason, "short acknowledgement", "{text}");
        }
    }

    #[test]
    fn test_very_short_text_is_noise() {
        assert_eq!(class_of("bug"), TriageClass::Noise);
        assert_eq!(class_of("why"), TriageClass::Noise);
    }

    #[test]
    fn test_moderation_keywords() {
        let c = classify("Please ban this account, it keeps posting spam");
        assert_eq!(c.class, TriageClass::Moderation);
        assert_eq!(c.reason, "moderation keywords");
        assert_eq!(class_of("I want to report user @troll"), TriageClass::Moderation);
        assert_eq!(class_of("this link looks like phishing"), TriageClass::Moderation);
    }

    #[test]
    fn test_moderation_outranks_issue() {
        assert_eq!(
            class_of("there is a bug that lets people spam the channel"),
            TriageClass::Moderation
        );
    }

    #[test]
    fn test_issue_keywords() {
        let c = classify("There is a bug in the onboarding flow and it keeps failing");
        assert_eq!(c.class, TriageClass::Issue);
        assert_eq!(c.reason, "issue keywords");
        assert_eq!(class_of("Login is not working since this morning"), TriageClass::Issue);
    }

    #[test]
    fn test_issue_outranks_task() {
        assert_eq!(
            class_of("please look at the error in the payment page"),
            TriageClass::Issue
        );
    }

    #[test]
    fn test_task_prefix_requires_four_words() {
        let c = classify("please update the release notes");
        assert_eq!(c.class, TriageClass::Task);
        assert_eq!(c.reason, "action request");
        assert_ne!(class_of("please do it"), TriageClass::Task);
    }

    #[test]
    fn test_task_keywords() {
        assert_eq!(class_of("can we follow up with the vendor"), TriageClass::Task);
        assert_eq!(class_of("Investigate this before Friday"), TriageClass::Task);
    }

    #[test]
    fn test_task_outranks_question() {
        assert_eq!(class_of("can you follow up on the invoice?"), TriageClass::Task);
    }

    #[test]
    fn test_question_patterns() {
        let c = classify("How do I reset my password");
        assert_eq!(c.class, TriageClass::Question);
        assert_eq!(c.reason, "question pattern");
        assert_eq!(class_of("the docs mention a limit?"), TriageClass::Question);
    }

    #[test]
    fn test_unmatched_is_noise() {
        let c = classify("the weather is nice today");
        assert_eq!(c.class, TriageClass::Noise);
        assert_eq!(c.reason, "no routing intent");
    }

    #[test]
    fn test_classify_is_deterministic() {
        let text = "There is an outage in eu-west, please investigate";
        let first = classify(text);
        for _ in 0..10 {
            assert_eq!(classify(text), first);
        }
    }

    #[test]
    fn test_rule_order_is_fixed() {
        let order: Vec<(TriageClass, &str)> = TRIAGE_RULES
            .iter()
            .map(|rule| (rule.class, rule.reason))
            .collect();
        assert_eq!(
            order,
            vec![
                (TriageClass::Noise, "empty message"),
                (TriageClass::Noise, "short acknowledgement"),
                (TriageClass::Moderation, "moderation keywords"),
                (TriageClass::Issue, "issue keywords"),
                (TriageClass::Task, "action request"),
                (TriageClass::Question, "question pattern"),
            ]
        );
    }

    #[test]
    fn test_follow_up_async_cues() {
        assert!(needs_external_follow_up("Can you remind me tomorrow about the launch?"));
        assert!(needs_external_follow_up("what changed? notify me when it ships"));
    }

    #[test]
    fn test_follow_up_any_minute_delay() {
        assert!(needs_external_follow_up("can you tell me how the queue looks in 30 minutes?"));
        assert!(needs_external_follow_up("can you tell me how the queue looks in 5 minutes?"));
        assert!(needs_external_follow_up("what does the queue look like in 1 minute?"));
        assert!(!needs_external_follow_up("what happened in the last minutes?"));
    }

    #[test]
    fn test_follow_up_research_needs_topic() {
        assert!(needs_external_follow_up("can you look up the latest pricing for the pro tier?"));
        assert!(!needs_external_follow_up("can you look up my old message?"));
    }

    #[test]
    fn test_follow_up_web_target() {
        assert!(needs_external_follow_up("could you verify example.com is reachable?"));
        assert!(needs_external_follow_up("please fetch https://status.example.org for me?"));
        assert!(!needs_external_follow_up("what is example.com?"));
    }

    #[test]
    fn test_plain_question_needs_no_follow_up() {
        assert!(!needs_external_follow_up("how do I reset my password?"));
        assert!(!needs_external_follow_up(""));
    }
}
