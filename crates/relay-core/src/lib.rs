//! Shared building blocks for the relay gateway: errors, configuration and
//! the message/identity types every other crate passes around.

pub mod config;
pub mod error;
pub mod text;
pub mod types;

pub use config::RelayConfig;
pub use error::{RelayError, Result, StoreError};
pub use types::*;
