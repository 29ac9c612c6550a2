use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Default lifetime of a sensitive-tool approval grant.
pub const DEFAULT_SENSITIVE_APPROVAL_TTL_SECS: u64 = 600;

/// Top-level configuration for the relay gateway.
///
/// Loaded from `~/.relay/config.toml` by default. Every section falls back to
/// its defaults when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub triage: TriageConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Workspace that conversations without a stored context fall into.
    pub workspace_id: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            workspace_id: "default".to_string(),
        }
    }
}

/// Automatic triage of free-text messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// When false, unrecognised text is never routed into tasks.
    pub enabled: bool,
    /// Publish a routing notification after a task is created.
    pub notify_routing: bool,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            notify_routing: true,
        }
    }
}

/// Action approval policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Lifetime of the one-shot grant minted by an admin approval.
    /// Zero falls back to the default.
    pub sensitive_approval_ttl_secs: u64,
    /// Background worker identity whose requests are always auto-approved.
    pub system_worker_id: String,
    /// Approver recorded on auto-approved requests.
    pub auto_approver_id: String,
    /// Reason recorded when an admin denies without giving one.
    pub default_deny_reason: String,
}

impl ApprovalConfig {
    /// Grant TTL with the zero value clamped to the default.
    pub fn sensitive_approval_ttl(&self) -> Duration {
        if self.sensitive_approval_ttl_secs == 0 {
            Duration::from_secs(DEFAULT_SENSITIVE_APPROVAL_TTL_SECS)
        } else {
            Duration::from_secs(self.sensitive_approval_ttl_secs)
        }
    }
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            sensitive_approval_ttl_secs: DEFAULT_SENSITIVE_APPROVAL_TTL_SECS,
            system_worker_id: "system:task-worker".to_string(),
            auto_approver_id: "system:agent".to_string(),
            default_deny_reason: "denied by admin".to_string(),
        }
    }
}

/// Built-in executor plugins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Whether approved `run_command` actions are executed at all.
    pub command_enabled: bool,
    /// Executable names that may be run. Empty means nothing is allowed.
    pub allowed_commands: Vec<String>,
    /// Per-command timeout in seconds.
    pub command_timeout_secs: u64,
    /// Combined stdout/stderr cap kept in execution messages.
    pub max_output_bytes: usize,
    /// Working directory commands run in.
    pub working_dir: String,
    /// Whether approved `webhook` actions send their HTTP request.
    pub webhook_enabled: bool,
    /// Per-request webhook timeout in seconds.
    pub webhook_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_enabled: false,
            allowed_commands: Vec::new(),
            command_timeout_secs: 20,
            max_output_bytes: 4096,
            working_dir: ".".to_string(),
            webhook_enabled: false,
            webhook_timeout_secs: 15,
        }
    }
}
