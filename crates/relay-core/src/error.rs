use thiserror::Error;

/// Top-level error type for the relay workspace.
///
/// Subsystem crates define their own error enums and convert into this one
/// where they cross into configuration or I/O concerns.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for RelayError {
    fn from(err: toml::ser::Error) -> Self {
        RelayError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

/// Errors surfaced by the persistence interface.
///
/// The not-found / not-ready variants are expected outcomes that the gateway
/// turns into fixed replies; `Backend` is a genuine downstream failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("identity not found: {connector}/{user_id}")]
    IdentityNotFound { connector: String, user_id: String },

    #[error("action approval not found: {0}")]
    ApprovalNotFound(String),

    #[error("action approval is not pending: {0}")]
    ApprovalNotReady(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("pairing request not found: {0}")]
    PairingNotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
