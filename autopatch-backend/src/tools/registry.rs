use crate::tools::types::{ToolContext, ToolDefinition, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A callable browser operation exposed to the agents
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition for the AI
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool. Failures are reported as error results, never panics.
    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult;

    fn name(&self) -> String {
        self.definition().name
    }
}

/// Registry of all available tools, keyed by name
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        if self.tools.insert(name.clone(), tool).is_some() {
            log::warn!("[TOOL] Tool '{}' registered twice, keeping the latest", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Sorted tool names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions of every registered tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.names()
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.definition())
            .collect()
    }

    /// Resolve a list of tool names, failing on the first unknown name
    pub fn tools_for(&self, names: &[String]) -> Result<Vec<Arc<dyn Tool>>, String> {
        names
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| {
                    format!(
                        "Unknown tool '{}'. Available tools: {}",
                        name,
                        self.names().join(", ")
                    )
                })
            })
            .collect()
    }

    /// Execute a tool by name
    pub async fn execute(&self, name: &str, params: Value, context: &ToolContext) -> ToolResult {
        match self.get(name) {
            Some(tool) => tool.execute(params, context).await,
            None => ToolResult::error(format!("Tool '{}' not found", name)),
        }
    }
}
