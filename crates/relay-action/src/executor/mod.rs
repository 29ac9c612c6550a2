//! Executor interface and plugin dispatch.
//!
//! The engine only sees [`ActionExecutor`]. [`PluginRegistry`] is the stock
//! implementation: it routes each approved action by its type to one
//! registered [`ActionPlugin`].

pub mod command;
pub mod registry;
pub mod webhook;

use async_trait::async_trait;

use crate::error::ActionError;
use crate::types::{ActionApproval, ExecutionResult};

pub use command::CommandPlugin;
pub use registry::PluginRegistry;
pub use webhook::WebhookPlugin;

/// Runs approved actions.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute an approved action. An `Err` is recorded as a failed execution
    /// with the error's message.
    async fn execute(&self, approval: &ActionApproval) -> Result<ExecutionResult, ActionError>;
}

/// One executor backend, responsible for a fixed set of action types.
#[async_trait]
pub trait ActionPlugin: Send + Sync {
    /// Stable key recorded as the executing plugin, e.g. `sandbox_command`.
    fn plugin_key(&self) -> &str;

    /// Action types this plugin handles.
    fn action_types(&self) -> Vec<String>;

    async fn execute(&self, approval: &ActionApproval) -> Result<ExecutionResult, ActionError>;
}
