use thiserror::Error;

/// Errors produced while parsing triage overrides.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriageError {
    #[error("route override needs a task id and a class")]
    MissingArguments,

    #[error("invalid route class: {0}")]
    InvalidClass(String),

    #[error("invalid priority: {0}")]
    InvalidPriority(String),

    #[error("invalid due window: {0}")]
    InvalidDueWindow(String),
}
