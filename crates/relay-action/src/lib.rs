//! relay-action: the action-approval engine.
//!
//! Tracks every externally consequential action from request through
//! approval or denial to its execution outcome:
//!
//! - **State machine**: `pending -> approved | denied`, then one execution
//!   outcome (`skipped`, `succeeded`, `failed`).
//! - **Engine**: creation, auto-approval policy, approve/deny, execution and
//!   bulk approval on top of an [`ApprovalStore`].
//! - **Grants**: one-shot sensitive-tool approvals minted by admin approvals.
//! - **References**: resolving "approve it", ids and pairing tokens to a
//!   concrete target.
//! - **Executors**: plugin registry dispatching approved actions by type.

pub mod approval;
pub mod error;
pub mod executor;
pub mod grant;
pub mod outcome;
pub mod proposal;
pub mod reference;
pub mod state_machine;
pub mod store;
pub mod types;

pub use approval::{AdminCheck, ApprovalEngine, ApprovalOutcome, BulkReport, RequestOutcome};
pub use error::ActionError;
pub use executor::{ActionExecutor, ActionPlugin, CommandPlugin, PluginRegistry, WebhookPlugin};
pub use grant::{GrantKey, SensitiveApprovalGrants};
pub use reference::{ActionReference, PendingResolution};
pub use store::ApprovalStore;
pub use types::*;
