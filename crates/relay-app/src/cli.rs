//! CLI argument definitions for the relay binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// Relay: message triage and admin-approved actions, driven from stdin.
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// User id messages are sent as.
    #[arg(short = 'u', long = "user", default_value = "local-user")]
    pub user: String,

    /// Role linked to the user before the first message.
    #[arg(short = 'r', long = "role", default_value = "admin")]
    pub role: String,

    /// Conversation id messages belong to.
    #[arg(long = "conversation", default_value = "local")]
    pub conversation: String,

    /// Write the default configuration to the config path and exit.
    #[arg(long = "init-config")]
    pub init_config: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > RELAY_CONFIG env var > ~/.relay/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("RELAY_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log filter.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        match self.log_level.as_deref().map(str::trim) {
            Some(level) if !level.is_empty() => level.to_string(),
            _ => config_level.to_string(),
        }
    }
}

fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".relay").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".relay").join("config.toml");
    }
    PathBuf::from("config.toml")
}
