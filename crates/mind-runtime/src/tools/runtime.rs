use async_trait::async_trait;
use mind_core::{MindError, Result, RuntimeToolSpec, Tool, ToolCall, ToolExecutor, ToolResult};
use regex::Regex;
use serde_json::json;
use std::sync::LazyLock;

/// Built-in names a runtime tool may not take.
pub const RESERVED_TOOL_NAMES: &[&str] = &[
    "read_file",
    "write_file",
    "edit_file",
    "run_command",
    "memory_save",
    "memory_search",
    "spawn_agent",
];

static TOOL_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").ok());

/// Check a runtime tool name against the naming rule and the reserved set.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if !TOOL_NAME.as_ref().is_some_and(|re| re.is_match(name)) {
        return Err(MindError::Validation(format!(
            "invalid tool name '{name}': use lowercase letters, digits, and underscores, starting with a letter"
        )));
    }
    if RESERVED_TOOL_NAMES.contains(&name) {
        return Err(MindError::Validation(format!(
            "tool name '{name}' is reserved"
        )));
    }
    Ok(())
}

/// User-registered tools that answer with a fixed response.
pub struct RuntimeTools {
    specs: Vec<RuntimeToolSpec>,
}

impl RuntimeTools {
    pub fn new(specs: Vec<RuntimeToolSpec>) -> Self {
        Self { specs }
    }
}

#[async_trait]
impl ToolExecutor for RuntimeTools {
    fn tools(&self) -> Vec<Tool> {
        self.specs
            .iter()
            .map(|spec| {
                Tool::new(
                    spec.name.clone(),
                    spec.description.clone(),
                    json!({ "input": {"type": "string"} }),
                    &[],
                )
            })
            .collect()
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let spec = self
            .specs
            .iter()
            .find(|s| s.name == call.tool_name)
            .ok_or_else(|| MindError::NotFound(format!("Tool not found: {}", call.tool_name)))?;
        Ok(ToolResult::ok(call, spec.response.clone()))
    }
}
