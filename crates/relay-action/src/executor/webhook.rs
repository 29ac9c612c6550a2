//! Outbound HTTP webhook execution.
//!
//! Sends one request per approved `webhook` action. The URL comes from the
//! action target or `payload.url` and must be `http` or `https`.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::config::ExecutorConfig;
use reqwest::{Method, Url};
use serde_json::Value;

use crate::error::ActionError;
use crate::executor::ActionPlugin;
use crate::types::{ActionApproval, ExecutionResult};

pub const WEBHOOK_PLUGIN_KEY: &str = "webhook";

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE"];

/// Executor plugin for `webhook` and `http_request`.
pub struct WebhookPlugin {
    enabled: bool,
    client: reqwest::Client,
    timeout: Duration,
}

/// A validated outbound request.
#[derive(Debug)]
struct WebhookRequest {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
    body: Option<Value>,
}

impl WebhookPlugin {
    /// Build from configuration. A zero timeout falls back to the default.
    pub fn new(config: &ExecutorConfig) -> Self {
        let timeout_secs = if config.webhook_timeout_secs < 1 {
            DEFAULT_TIMEOUT_SECS
        } else {
            config.webhook_timeout_secs
        };
        Self {
            enabled: config.webhook_enabled,
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Replace the HTTP client, e.g. to pin proxy or TLS settings.
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    async fn send(&self, request: WebhookRequest) -> Result<ExecutionResult, ActionError> {
        let url = request.url.to_string();
        let mut builder = self
            .client
            .request(request.method.clone(), request.url)
            .timeout(self.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.body {
            Some(Value::String(text)) => builder.body(text),
            Some(body) => builder.json(&body),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::warn!(url = %url, timeout_secs = self.timeout.as_secs(), "Webhook timed out");
                ActionError::Timeout(self.timeout.as_secs())
            } else {
                tracing::warn!(url = %url, error = %e, "Webhook request failed");
                ActionError::ExecutionFailed(format!("webhook request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(url = %url, method = %request.method, status = status.as_u16(), "Webhook succeeded");
            Ok(ExecutionResult {
                plugin: WEBHOOK_PLUGIN_KEY.to_string(),
                message: format!("webhook request completed with status {}", status.as_u16()),
            })
        } else {
            tracing::warn!(url = %url, status = status.as_u16(), "Webhook returned error status");
            Err(ActionError::ExecutionFailed(format!(
                "webhook request failed with status {}",
                status.as_u16()
            )))
        }
    }
}

#[async_trait]
impl ActionPlugin for WebhookPlugin {
    fn plugin_key(&self) -> &str {
        WEBHOOK_PLUGIN_KEY
    }

    fn action_types(&self) -> Vec<String> {
        vec!["webhook".to_string(), "http_request".to_string()]
    }

    async fn execute(&self, approval: &ActionApproval) -> Result<ExecutionResult, ActionError> {
        if !self.enabled {
            return Err(ActionError::ExecutionFailed(
                "webhook execution is disabled".to_string(),
            ));
        }
        let request = parse_request(approval)?;
        self.send(request).await
    }
}

/// Read method, URL, headers and body from the target and payload.
fn parse_request(approval: &ActionApproval) -> Result<WebhookRequest, ActionError> {
    let payload = &approval.payload;
    let raw_url = match approval.target.trim() {
        "" => payload.get("url").and_then(Value::as_str).unwrap_or("").trim(),
        target => target,
    };
    if raw_url.is_empty() {
        return Err(ActionError::InvalidPayload(
            "webhook action requires target or payload.url".to_string(),
        ));
    }
    let url = Url::parse(raw_url)
        .map_err(|e| ActionError::InvalidPayload(format!("invalid webhook url: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ActionError::InvalidPayload(format!(
            "webhook url must use http or https, got {}",
            url.scheme()
        )));
    }

    let method = match payload.get("method").and_then(Value::as_str).map(str::trim) {
        None | Some("") => Method::POST,
        Some(m) => {
            let upper = m.to_uppercase();
            if !ALLOWED_METHODS.contains(&upper.as_str()) {
                return Err(ActionError::InvalidPayload(format!(
                    "unsupported webhook method: {}",
                    m
                )));
            }
            upper
                .parse::<Method>()
                .map_err(|e| ActionError::InvalidPayload(e.to_string()))?
        }
    };

    let headers = match payload.get("headers") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (name.clone(), value)
            })
            .collect(),
        Some(_) => {
            return Err(ActionError::InvalidPayload(
                "webhook headers must be an object".to_string(),
            ))
        }
    };

    let body = match payload.get("body") {
        None | Some(Value::Null) => None,
        Some(body) => Some(body.clone()),
    };

    Ok(WebhookRequest {
        method,
        url,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::humanize_execution_message;
    use crate::types::{ActionType, ApprovalStatus};
    use relay_core::Timestamp;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            webhook_enabled: true,
            webhook_timeout_secs: 5,
            ..ExecutorConfig::default()
        }
    }

    fn plugin() -> WebhookPlugin {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        WebhookPlugin::new(&config()).with_client(client)
    }

    fn approval(target: &str, payload: Value) -> ActionApproval {
        ActionApproval {
            id: "act_5678".into(),
            workspace_id: "ws".into(),
            context_id: "ctx".into(),
            connector: "cli".into(),
            external_id: "room".into(),
            requester_user_id: "u".into(),
            action_type: ActionType::Webhook,
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

    /// Accept one connection, answer with `status_line`, and hand back the
    /// request line that was received.
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 1024];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            let response = format!("{}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status_line);
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let text = String::from_utf8_lossy(&received).to_string();
            text.lines().next().unwrap_or_default().to_string()
        });
        (url, handle)
    }

    #[test]
    fn test_action_types() {
        let plugin = WebhookPlugin::new(&config());
        assert_eq!(plugin.plugin_key(), "webhook");
        assert_eq!(plugin.action_types(), vec!["webhook", "http_request"]);
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let mut cfg = config();
        cfg.webhook_timeout_secs = 0;
        assert_eq!(WebhookPlugin::new(&cfg).timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_parse_request_defaults_to_post() {
        let request = parse_request(&approval("https://hooks.example.com/x", json!({}))).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.url.as_str(), "https://hooks.example.com/x");
        assert!(request.body.is_none());
    }

    #[test]
    fn test_parse_request_from_payload() {
        let request = parse_request(&approval(
            "",
            json!({
                "url": "http://localhost:9000/notify",
                "method": "put",
                "headers": {"X-Token": "abc"},
                "body": {"ok": true}
            }),
        ))
        .unwrap();
        assert_eq!(request.method, Method::PUT);
        assert_eq!(request.url.as_str(), "http://localhost:9000/notify");
        assert_eq!(request.headers, vec![("X-Token".to_string(), "abc".to_string())]);
        assert_eq!(request.body, Some(json!({"ok": true})));
    }

    #[test]
    fn test_parse_request_rejects_bad_input() {
        let err = parse_request(&approval("ftp://files.example.com/drop", json!({}))).unwrap_err();
        assert_eq!(
            err,
            ActionError::InvalidPayload("webhook url must use http or https, got ftp".into())
        );

        let err = parse_request(&approval("", json!({}))).unwrap_err();
        assert!(matches!(err, ActionError::InvalidPayload(_)));

        let err = parse_request(&approval("not a url", json!({}))).unwrap_err();
        assert!(err.to_string().starts_with("invalid action payload: invalid webhook url"));

        let err = parse_request(&approval("https://example.com", json!({"method": "TRACE"})))
            .unwrap_err();
        assert_eq!(err, ActionError::InvalidPayload("unsupported webhook method: TRACE".into()));

        let err = parse_request(&approval("https://example.com", json!({"headers": ["x"]})))
            .unwrap_err();
        assert_eq!(err, ActionError::InvalidPayload("webhook headers must be an object".into()));
    }

    #[tokio::test]
    async fn test_disabled_plugin_refuses() {
        let mut cfg = config();
        cfg.webhook_enabled = false;
        let plugin = WebhookPlugin::new(&cfg);
        let err = plugin
            .execute(&approval("https://example.com/hook", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "webhook execution is disabled");
    }

    #[tokio::test]
    async fn test_success_status_is_humanized() {
        let (url, server) = serve_once("HTTP/1.1 200 OK").await;
        let result = plugin()
            .execute(&approval(&url, json!({"method": "GET"})))
            .await
            .unwrap();
        assert_eq!(result.plugin, "webhook");
        assert_eq!(result.message, "webhook request completed with status 200");

        let humanized = humanize_execution_message(&result.message).unwrap();
        assert!(humanized.contains("200"));
        assert_eq!(humanized, "Webhook request completed with status 200");

        assert_eq!(server.await.unwrap(), "GET /hook HTTP/1.1");
    }

    #[tokio::test]
    async fn test_error_status_is_failure() {
        let (url, server) = serve_once("HTTP/1.1 503 Service Unavailable").await;
        let err = plugin()
            .execute(&approval(&url, json!({"method": "DELETE"})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ActionError::ExecutionFailed("webhook request failed with status 503".into())
        );
        assert_eq!(server.await.unwrap(), "DELETE /hook HTTP/1.1");
    }
}
