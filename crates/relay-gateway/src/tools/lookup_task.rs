use std::sync::Arc;

use async_trait::async_trait;
use relay_core::text::truncate_chars;
use relay_core::{RequestContext, Timestamp};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::Store;
use crate::tools::{decode_args, invalid_args, Tool, ToolError};

const PROMPT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LookupTaskArgs {
    task_id: String,
}

/// Read-only view of one task in the caller's workspace.
pub struct LookupTaskTool<S: Store> {
    store: Arc<S>,
}

impl<S: Store> LookupTaskTool<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + 'static> Tool for LookupTaskTool<S> {
    fn name(&self) -> &str {
        "lookup_task"
    }

    fn describe(&self) -> &str {
        "Check the status and details of a specific task."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"task_id": {"type": "string"}},
            "required": ["task_id"],
            "additionalProperties": false
        })
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let args: LookupTaskArgs = decode_args(self.name(), args)?;
        if args.task_id.trim().is_empty() {
            return Err(invalid_args(self.name(), "task_id is required"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        args: Value,
        _now: Timestamp,
    ) -> Result<String, ToolError> {
        let args: LookupTaskArgs = decode_args(self.name(), &args)?;
        let task = self.store.lookup_task(args.task_id.trim()).await?;
        if !ctx.workspace_id.is_empty() && task.workspace_id != ctx.workspace_id {
            return Err(ToolError::Failed("task not found in this workspace".to_string()));
        }

        let mut lines = vec![
            format!("Task ID: {}", task.id),
            format!("Title: {}", task.title),
            format!("Status: {}", task.status),
            format!("Created: {}", task.created_at.to_rfc3339()),
        ];
        if let Some(due_at) = task.due_at {
            lines.push(format!("Due: {}", due_at.to_rfc3339()));
        }
        if !task.prompt.is_empty() {
            let mut prompt = truncate_chars(&task.prompt, PROMPT_PREVIEW_CHARS).to_string();
            if prompt.len() < task.prompt.len() {
                prompt.push_str("...");
            }
            lines.push(format!("Prompt: {}", prompt));
        }
        Ok(lines.join("\n"))
    }
}
