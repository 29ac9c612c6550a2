use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{RequestContext, Timestamp};
use relay_triage::{parse_due_window, TriageClass, TriagePriority};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::store::Store;
use crate::tools::{decode_args, invalid_args, Tool, ToolError};
use crate::types::TaskRoutingUpdate;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct UpdateTaskRoutingArgs {
    task_id: String,
    #[serde(default)]
    route_class: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    lane: Option<String>,
    #[serde(default)]
    due_in: Option<String>,
}

/// Present, non-blank value of an optional field.
fn field(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Privileged rewrite of a task's routing metadata.
///
/// Fields left out keep their stored value.
pub struct UpdateTaskRoutingTool<S: Store> {
    store: Arc<S>,
}

impl<S: Store> UpdateTaskRoutingTool<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: Store + 'static> Tool for UpdateTaskRoutingTool<S> {
    fn name(&self) -> &str {
        "update_task_routing"
    }

    fn describe(&self) -> &str {
        "Update a task's routing class, priority, lane or due window."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task_id": {"type": "string"},
                "route_class": {"type": "string", "enum": ["question", "issue", "task", "moderation", "noise"]},
                "priority": {"type": "string", "enum": ["p1", "p2", "p3"]},
                "lane": {"type": "string"},
                "due_in": {"type": "string", "description": "duration like 2h or 1d"}
            },
            "required": ["task_id"],
            "additionalProperties": false
        })
    }

    fn requires_approval(&self) -> bool {
        true
    }

    fn validate(&self, args: &Value) -> Result<(), ToolError> {
        let args: UpdateTaskRoutingArgs = decode_args(self.name(), args)?;
        if args.task_id.trim().is_empty() {
            return Err(invalid_args(self.name(), "task_id is required"));
        }
        if let Some(class) = field(&args.route_class) {
            class
                .parse::<TriageClass>()
                .map_err(|_| invalid_args(self.name(), "invalid route_class"))?;
        }
        if let Some(priority) = field(&args.priority) {
            priority
                .parse::<TriagePriority>()
                .map_err(|_| invalid_args(self.name(), "invalid priority"))?;
        }
        if let Some(due_in) = field(&args.due_in) {
            parse_due_window(due_in)
                .map_err(|e| invalid_args(self.name(), format!("invalid due_in: {}", e)))?;
        }
        let any_field = [&args.route_class, &args.priority, &args.lane, &args.due_in]
            .into_iter()
            .any(|f| field(f).is_some());
        if !any_field {
            return Err(invalid_args(self.name(), "at least one update field must be provided"));
        }
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &RequestContext,
        args: Value,
        now: Timestamp,
    ) -> Result<String, ToolError> {
        let args: UpdateTaskRoutingArgs = decode_args(self.name(), &args)?;
        let task = self.store.lookup_task(args.task_id.trim()).await?;
        if !ctx.workspace_id.is_empty() && task.workspace_id != ctx.workspace_id {
            return Err(ToolError::Failed("task not found in this workspace".to_string()));
        }

        let mut update = TaskRoutingUpdate {
            task_id: task.id.clone(),
            route_class: task.route_class,
            priority: task.priority,
            due_at: task.due_at,
            lane: task.lane.clone(),
        };
        if let Some(class) = field(&args.route_class) {
            update.route_class = class
                .parse()
                .map_err(|_| invalid_args(self.name(), "invalid route_class"))?;
        }
        if let Some(priority) = field(&args.priority) {
            update.priority = priority
                .parse()
                .map_err(|_| invalid_args(self.name(), "invalid priority"))?;
        }
        if let Some(due_in) = field(&args.due_in) {
            let window = parse_due_window(due_in)
                .map_err(|e| invalid_args(self.name(), format!("invalid due_in: {}", e)))?;
            update.due_at = Some(now.after(window));
        }
        if let Some(lane) = field(&args.lane) {
            update.lane = lane.to_string();
        }

        let updated = self.store.update_task_routing(update).await?;
        tracing::info!(
            task_id = %updated.id,
            class = %updated.route_class,
            priority = %updated.priority,
            lane = %updated.lane,
            "Task routing updated by tool"
        );
        Ok(format!("Task updated successfully (ID: {}).", updated.id))
    }
}
