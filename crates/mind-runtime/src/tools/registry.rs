use mind_core::{MindError, Result, Tool, ToolCall, ToolExecutor, ToolResult};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name-indexed set of tools available to one run.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, (Tool, Arc<dyn ToolExecutor>)>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every tool an executor provides. Names must be unique.
    pub fn register(&mut self, executor: Arc<dyn ToolExecutor>) -> Result<()> {
        let tools = executor.tools();
        if let Some(dup) = tools.iter().find(|t| self.tools.contains_key(&t.name)) {
            return Err(MindError::Validation(format!(
                "duplicate tool name '{}'",
                dup.name
            )));
        }
        for tool in tools {
            self.tools
                .insert(tool.name.clone(), (tool, Arc::clone(&executor)));
        }
        Ok(())
    }

    /// Tool schemas, sorted by name.
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.values().map(|(tool, _)| tool.clone()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a call. Failures become error-flagged results, never errors.
    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        let Some((_, executor)) = self.tools.get(&call.tool_name) else {
            warn!(tool = %call.tool_name, "unknown tool requested");
            return ToolResult::error(call, format!("Tool not found: {}", call.tool_name));
        };
        debug!(tool = %call.tool_name, id = %call.id, "executing tool");
        match executor.execute(call).await {
            Ok(result) => result,
            Err(e) => {
                debug!(tool = %call.tool_name, error = %e, "tool failed");
                ToolResult::error(call, format!("Error: {e}"))
            }
        }
    }
}
