//! Allowlisted command execution.
//!
//! Runs approved `run_command` style actions as a child process with a
//! timeout and an output cap. Only bare executable names on the allowlist
//! are accepted; nothing is passed through a shell.

use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::config::ExecutorConfig;
use relay_core::text::collapse_whitespace;
use serde_json::Value;
use tokio::process::Command;

use crate::error::ActionError;
use crate::executor::ActionPlugin;
use crate::types::{ActionApproval, ExecutionResult};

pub const COMMAND_PLUGIN_KEY: &str = "sandbox_command";

const DEFAULT_TIMEOUT_SECS: u64 = 20;
const DEFAULT_MAX_OUTPUT_BYTES: usize = 4096;
const MIN_OUTPUT_BYTES: usize = 256;
const MAX_ARGS: usize = 32;
const MAX_ARG_BYTES: usize = 512;

/// Executor plugin for `run_command`, `shell_command` and `cli_command`.
pub struct CommandPlugin {
    enabled: bool,
    allowed: HashSet<String>,
    timeout: Duration,
    max_output_bytes: usize,
    working_dir: PathBuf,
}

impl CommandPlugin {
    /// Build from configuration. Timeouts under one second and output caps
    /// under 256 bytes fall back to the defaults.
    pub fn new(config: &ExecutorConfig) -> Self {
        let allowed = config
            .allowed_commands
            .iter()
            .map(|c| c.trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        let timeout_secs = if config.command_timeout_secs < 1 {
            DEFAULT_TIMEOUT_SECS
        } else {
            config.command_timeout_secs
        };
        let max_output_bytes = if config.max_output_bytes < MIN_OUTPUT_BYTES {
            DEFAULT_MAX_OUTPUT_BYTES
        } else {
            config.max_output_bytes
        };
        let working_dir = match config.working_dir.trim() {
            "" => PathBuf::from("."),
            dir => PathBuf::from(dir),
        };
        Self {
            enabled: config.command_enabled,
            allowed,
            timeout: Duration::from_secs(timeout_secs),
            max_output_bytes,
            working_dir,
        }
    }

    fn is_allowed(&self, command: &str) -> bool {
        self.allowed.contains(&command.to_lowercase())
    }

    async fn run(&self, command: &str, args: &[String]) -> Result<ExecutionResult, ActionError> {
        let shown = std::iter::once(command)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        let child = Command::new(command)
            .args(args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ActionError::ExecutionFailed(format!("command failed: {}; output=(no output)", e))
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| {
                ActionError::ExecutionFailed(format!("command failed: {}; output=(no output)", e))
            })?,
            Err(_) => {
                tracing::warn!(command = %shown, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Err(ActionError::Timeout(self.timeout.as_secs()));
            }
        };

        let mut combined = output.stdout;
        combined.extend_from_slice(&output.stderr);
        let rendered = compact_output(&combined, self.max_output_bytes);

        if output.status.success() {
            tracing::info!(command = %shown, "Command succeeded");
            Ok(ExecutionResult {
                plugin: COMMAND_PLUGIN_KEY.to_string(),
                message: format!("command succeeded: {}; output={}", shown, rendered),
            })
        } else {
            tracing::warn!(command = %shown, status = %output.status, "Command failed");
            Err(ActionError::ExecutionFailed(format!(
                "command failed: {}; output={}",
                output.status, rendered
            )))
        }
    }
}

#[async_trait]
impl ActionPlugin for CommandPlugin {
    fn plugin_key(&self) -> &str {
        COMMAND_PLUGIN_KEY
    }

    fn action_types(&self) -> Vec<String> {
        vec![
            "run_command".to_string(),
            "shell_command".to_string(),
            "cli_command".to_string(),
        ]
    }

    async fn execute(&self, approval: &ActionApproval) -> Result<ExecutionResult, ActionError> {
        if !self.enabled {
            return Err(ActionError::ExecutionFailed(
                "sandbox command execution is disabled".to_string(),
            ));
        }
        let (command, args) = parse_command(approval)?;
        if !self.is_allowed(&command) {
            return Err(ActionError::NotAllowed(command));
        }
        self.run(&command, &args).await
    }
}

/// Read the executable and arguments from the target and payload.
///
/// The executable comes from `target`, or from the first word of
/// `payload.command`; both must agree when present. Arguments come from
/// `payload.args` (array or string), else the rest of `payload.command`.
fn parse_command(approval: &ActionApproval) -> Result<(String, Vec<String>), ActionError> {
    let mut command = approval.target.trim().to_string();
    let payload_command = approval
        .payload
        .get("command")
        .and_then(Value::as_str)
        .unwrap_or("");
    let mut payload_words = payload_command.split_whitespace().map(str::to_string);
    let payload_exe = payload_words.next();
    let payload_args: Vec<String> = payload_words.collect();

    let mut args = match approval.payload.get("args") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(s)) => s.split_whitespace().map(str::to_string).collect(),
        Some(_) => {
            return Err(ActionError::InvalidPayload(
                "unsupported args payload".to_string(),
            ))
        }
    };

    match payload_exe {
        Some(exe) if command.is_empty() => command = exe,
        Some(exe) if !exe.eq_ignore_ascii_case(&command) => {
            return Err(ActionError::InvalidPayload(
                "payload.command executable must match target".to_string(),
            ))
        }
        _ => {}
    }
    if args.is_empty() {
        args = payload_args;
    }

    if command.is_empty() {
        return Err(ActionError::InvalidPayload(
            "command action requires target or payload.command".to_string(),
        ));
    }
    if command.contains(['/', '\\']) || command.contains(char::is_whitespace) {
        return Err(ActionError::InvalidPayload(
            "command must be a bare executable name".to_string(),
        ));
    }
    if args.len() > MAX_ARGS {
        return Err(ActionError::InvalidPayload("too many arguments".to_string()));
    }
    if args.iter().any(|a| a.len() > MAX_ARG_BYTES) {
        return Err(ActionError::InvalidPayload("argument exceeds limit".to_string()));
    }
    Ok((command, args))
}

/// Cap `output` at `max_bytes` and collapse it to one line.
fn compact_output(output: &[u8], max_bytes: usize) -> String {
    let truncated = output.len() > max_bytes;
    let kept = &output[..output.len().min(max_bytes)];
    let text = collapse_whitespace(&String::from_utf8_lossy(kept));
    match (text.is_empty(), truncated) {
        (true, true) => "(output truncated)".to_string(),
        (true, false) => "(no output)".to_string(),
        (false, true) => format!("{} ... [truncated]", text),
        (false, false) => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionType, ApprovalStatus};
    use relay_core::Timestamp;
    use serde_json::json;

    fn config(allowed: &[&str]) -> ExecutorConfig {
        ExecutorConfig {
            command_enabled: true,
            allowed_commands: allowed.iter().map(|c| c.to_string()).collect(),
            command_timeout_secs: 5,
            max_output_bytes: 4096,
            working_dir: ".".to_string(),
            ..ExecutorConfig::default()
        }
    }

    fn approval(target: &str, payload: Value) -> ActionApproval {
        ActionApproval {
            id: "act_1234".into(),
            workspace_id: "ws".into(),
            context_id: "ctx".into(),
            connector: "cli".into(),
            external_id: "room".into(),
            requester_user_id: "u".into(),
            action_type: ActionType::RunCommand,
            target: target.into(),
            summary: String::new(),
            payload: payload.as_object().cloned().unwrap_or_default(),
            status: ApprovalStatus::Approved,
            approver_user_id: Some("admin".into()),
            denied_reason: None,
            execution: None,
            created_at: Timestamp(0),
        }
    }

    #[test]
    fn test_defaults_clamped() {
        let mut cfg = config(&[]);
        cfg.command_timeout_secs = 0;
        cfg.max_output_bytes = 10;
        let plugin = CommandPlugin::new(&cfg);
        assert_eq!(plugin.timeout, Duration::from_secs(20));
        assert_eq!(plugin.max_output_bytes, 4096);
    }

    #[test]
    fn test_action_types() {
        let plugin = CommandPlugin::new(&config(&[]));
        assert_eq!(plugin.plugin_key(), "sandbox_command");
        assert_eq!(
            plugin.action_types(),
            vec!["run_command", "shell_command", "cli_command"]
        );
    }

    #[test]
    fn test_parse_command_from_target_and_args() {
        let (cmd, args) = parse_command(&approval("ls", json!({"args": ["-la", 3]}))).unwrap();
        assert_eq!(cmd, "ls");
        assert_eq!(args, vec!["-la", "3"]);
    }

    #[test]
    fn test_parse_command_from_payload_command() {
        let (cmd, args) = parse_command(&approval("", json!({"command": "echo hi there"}))).unwrap();
        assert_eq!(cmd, "echo");
        assert_eq!(args, vec!["hi", "there"]);
    }

    #[test]
    fn test_parse_command_rejects_mismatch_and_paths() {
        let err = parse_command(&approval("ls", json!({"command": "rm -rf /"}))).unwrap_err();
        assert!(matches!(err, ActionError::InvalidPayload(_)));

        let err = parse_command(&approval("/bin/ls", json!({}))).unwrap_err();
        assert_eq!(
            err,
            ActionError::InvalidPayload("command must be a bare executable name".into())
        );

        let err = parse_command(&approval("", json!({}))).unwrap_err();
        assert!(matches!(err, ActionError::InvalidPayload(_)));

        let err = parse_command(&approval("ls", json!({"args": {"a": 1}}))).unwrap_err();
        assert_eq!(err, ActionError::InvalidPayload("unsupported args payload".into()));
    }

    #[test]
    fn test_parse_command_limits() {
        let many: Vec<String> = (0..33).map(|i| i.to_string()).collect();
        let err = parse_command(&approval("echo", json!({"args": many}))).unwrap_err();
        assert_eq!(err, ActionError::InvalidPayload("too many arguments".into()));

        let long = "x".repeat(513);
        let err = parse_command(&approval("echo", json!({"args": [long]}))).unwrap_err();
        assert_eq!(err, ActionError::InvalidPayload("argument exceeds limit".into()));
    }

    #[test]
    fn test_compact_output() {
        assert_eq!(compact_output(b"", 256), "(no output)");
        assert_eq!(compact_output(b"  a\n b  ", 256), "a b");
        let big = vec![b'z'; 300];
        let text = compact_output(&big, 256);
        assert!(text.ends_with(" ... [truncated]"));
        assert!(text.starts_with(&"z".repeat(256)));
    }

    #[tokio::test]
    async fn test_disabled_plugin_refuses() {
        let mut cfg = config(&["echo"]);
        cfg.command_enabled = false;
        let plugin = CommandPlugin::new(&cfg);
        let err = plugin.execute(&approval("echo", json!({}))).await.unwrap_err();
        assert_eq!(err.to_string(), "sandbox command execution is disabled");
    }

    #[tokio::test]
    async fn test_not_allowlisted() {
        let plugin = CommandPlugin::new(&config(&["echo"]));
        let err = plugin.execute(&approval("ls", json!({}))).await.unwrap_err();
        assert_eq!(err, ActionError::NotAllowed("ls".into()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_allowlisted_command() {
        let plugin = CommandPlugin::new(&config(&["echo"]));
        let result = plugin
            .execute(&approval("echo", json!({"args": ["hello", "world"]})))
            .await
            .unwrap();
        assert_eq!(result.plugin, "sandbox_command");
        assert_eq!(result.message, "command succeeded: echo hello world; output=hello world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let plugin = CommandPlugin::new(&config(&["false"]));
        let err = plugin.execute(&approval("false", json!({}))).await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("command failed: exit status: 1"));
        assert!(message.ends_with("; output=(no output)"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let mut cfg = config(&["sleep"]);
        cfg.command_timeout_secs = 1;
        let plugin = CommandPlugin::new(&cfg);
        let err = plugin
            .execute(&approval("sleep", json!({"args": ["5"]})))
            .await
            .unwrap_err();
        assert_eq!(err, ActionError::Timeout(1));
    }
}
