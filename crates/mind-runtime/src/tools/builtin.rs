use async_trait::async_trait;
use mind_core::{Result, Tool, ToolCall, ToolExecutor, ToolResult};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::sandbox::Sandbox;

/// `read_file`, `write_file`, `edit_file`, `run_command` over one sandbox.
pub struct SandboxTools {
    sandbox: Arc<Sandbox>,
    cancel: CancellationToken,
}

impl SandboxTools {
    pub fn new(sandbox: Arc<Sandbox>, cancel: CancellationToken) -> Self {
        Self { sandbox, cancel }
    }
}

#[async_trait]
impl ToolExecutor for SandboxTools {
    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new(
                "read_file",
                "Read a text file from the workspace.",
                json!({
                    "path": {"type": "string", "description": "Absolute or workspace-relative path"}
                }),
                &["path"],
            ),
            Tool::new(
                "write_file",
                "Create or overwrite a file in the workspace. Parent directories are created.",
                json!({
                    "path": {"type": "string", "description": "Absolute or workspace-relative path"},
                    "content": {"type": "string", "description": "Full file content"}
                }),
                &["path", "content"],
            ),
            Tool::new(
                "edit_file",
                "Replace the first exact occurrence of old_text with new_text in a workspace file.",
                json!({
                    "path": {"type": "string", "description": "Absolute or workspace-relative path"},
                    "old_text": {"type": "string", "description": "Exact text to find"},
                    "new_text": {"type": "string", "description": "Replacement text"}
                }),
                &["path", "old_text", "new_text"],
            ),
            Tool::new(
                "run_command",
                "Run a shell command in the workspace. Output is capped and the call is time-bounded.",
                json!({
                    "command": {"type": "string", "description": "Shell command line"},
                    "timeout": {"type": "integer", "description": "Timeout in seconds"}
                }),
                &["command"],
            ),
        ]
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        match call.tool_name.as_str() {
            "read_file" => {
                let content = self.sandbox.read_file(call.str_arg("path")?).await?;
                Ok(ToolResult::ok(call, content))
            }
            "write_file" => {
                let message = self
                    .sandbox
                    .write_file(call.str_arg("path")?, call.str_arg("content")?)
                    .await?;
                Ok(ToolResult::ok(call, message))
            }
            "edit_file" => {
                let message = self
                    .sandbox
                    .edit_file(
                        call.str_arg("path")?,
                        call.str_arg("old_text")?,
                        call.str_arg("new_text")?,
                    )
                    .await?;
                Ok(ToolResult::ok(call, message))
            }
            "run_command" => {
                let output = self
                    .sandbox
                    .run_command(call.str_arg("command")?, call.u64_arg("timeout"), &self.cancel)
                    .await?;
                let text = output.render();
                Ok(if output.is_error() {
                    ToolResult::error(call, text)
                } else {
                    ToolResult::ok(call, text)
                })
            }
            other => Err(mind_core::MindError::NotFound(format!(
                "Tool not found: {other}"
            ))),
        }
    }
}
