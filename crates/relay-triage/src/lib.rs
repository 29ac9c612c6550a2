//! relay-triage: deterministic message triage.
//!
//! Turns free text into a [`RouteDecision`] (class, priority, due window,
//! lane) and decides whether that decision should become a task.

pub mod classifier;
pub mod error;
pub mod routing;
pub mod types;

pub use classifier::{classify, needs_external_follow_up, normalize_for_triage};
pub use error::TriageError;
pub use routing::{
    build_routed_task_prompt, build_routed_task_title, derive_decision, parse_due_window,
    routing_defaults, should_auto_route, RouteOverride, RoutingDefaults,
};
pub use types::{Classification, RouteDecision, TriageClass, TriagePriority};
