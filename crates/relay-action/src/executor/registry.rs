//! Plugin registry keyed by action type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ActionError;
use crate::executor::{ActionExecutor, ActionPlugin};
use crate::types::{normalize_action_type, ActionApproval, ExecutionResult};

/// Dispatches approved actions to the plugin registered for their type.
///
/// When two plugins claim the same type, the one registered last wins.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn ActionPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin` for every action type it declares.
    pub fn register(&mut self, plugin: Arc<dyn ActionPlugin>) {
        for action_type in plugin.action_types() {
            let key = normalize_action_type(&action_type);
            if key.is_empty() {
                continue;
            }
            tracing::debug!(action_type = %key, plugin = plugin.plugin_key(), "Registered action plugin");
            self.plugins.insert(key, Arc::clone(&plugin));
        }
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_plugin(mut self, plugin: Arc<dyn ActionPlugin>) -> Self {
        self.register(plugin);
        self
    }

    /// Plugin handling `action_type`, if any.
    pub fn plugin_for(&self, action_type: &str) -> Option<&Arc<dyn ActionPlugin>> {
        self.plugins.get(&normalize_action_type(action_type))
    }

    /// Registered action types, sorted.
    pub fn action_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.plugins.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[async_trait]
impl ActionExecutor for PluginRegistry {
    async fn execute(&self, approval: &ActionApproval) -> Result<ExecutionResult, ActionError> {
        let action_type = normalize_action_type(approval.action_type.as_str());
        if action_type.is_empty() {
            return Err(ActionError::PluginNotFound("empty action type".to_string()));
        }
        let plugin = self
            .plugins
            .get(&action_type)
            .ok_or_else(|| ActionError::PluginNotFound(action_type.clone()))?;
        let mut result = plugin.execute(approval).await?;
        if result.plugin.trim().is_empty() {
            result.plugin = plugin.plugin_key().to_string();
        }
        Ok(result)
    }
}
