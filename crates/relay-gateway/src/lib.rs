//! relay-gateway: message handling on top of triage and action approval.
//!
//! One inbound message flows through:
//!
//! 1. **Intent parsing** ([`intent`]): an explicit command (`/approve-action act_...`
//!    or a bare leading command word), else a natural-language command.
//! 2. **Command handlers** ([`service`]): admin checks, action approval,
//!    pairing, context administration, retrieval and task creation.
//! 3. **Triage fallback**: anything unrecognised is classified and, when
//!    warranted, turned into a routed task.
//!
//! Persistence sits behind the [`Store`] trait; [`InMemoryStore`] backs the
//! CLI connector and tests. Privileged agent tools go through the
//! [`ToolRegistry`], which consumes one-shot sensitive approval grants.

pub mod commands;
pub mod error;
pub mod guidance;
pub mod intent;
pub mod notifier;
pub mod retriever;
pub mod service;
pub mod store;
pub mod tools;
pub mod types;

pub use commands::{normalize_command_name, slash_commands, CommandName, SlashCommand};
pub use error::GatewayError;
pub use intent::{parse_natural_language, split_command, Command, PromptCommand};
pub use notifier::RoutingNotifier;
pub use retriever::{IndexStatus, OpenedDocument, RetrievalError, Retriever, SearchHit};
pub use service::GatewayService;
pub use store::memory::InMemoryStore;
pub use store::Store;
pub use tools::{Tool, ToolError, ToolRegistry};
pub use types::*;
