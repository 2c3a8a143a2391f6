use async_trait::async_trait;
use mind_config::RuntimeConfig;
use mind_core::{Result, Tool, ToolCall, ToolExecutor, ToolResult};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

/// Runs a sub-objective as a drone and returns a short summary.
#[async_trait]
pub trait DroneSpawner: Send + Sync {
    async fn spawn(&self, objective: String, max_turns: u32) -> String;
}

/// `spawn_agent`: delegate a sub-objective to a bounded drone run.
pub struct SpawnTool {
    spawner: Arc<dyn DroneSpawner>,
    default_turns: u32,
    max_turns: u32,
    max_calls: u32,
    calls: AtomicU32,
}

impl SpawnTool {
    pub fn new(spawner: Arc<dyn DroneSpawner>, limits: &RuntimeConfig) -> Self {
        Self {
            spawner,
            default_turns: limits.spawn_default_turns,
            max_turns: limits.spawn_max_turns.max(1),
            max_calls: limits.spawn_max_calls,
            calls: AtomicU32::new(0),
        }
    }

    /// Requested turns clamped to `[1, max_turns]`.
    pub fn clamp_turns(&self, requested: Option<i64>) -> u32 {
        let turns = requested.unwrap_or(self.default_turns as i64);
        turns.clamp(1, self.max_turns as i64) as u32
    }
}

#[async_trait]
impl ToolExecutor for SpawnTool {
    fn tools(&self) -> Vec<Tool> {
        vec![Tool::new(
            "spawn_agent",
            "Delegate a focused sub-objective to a drone with its own workspace. Returns a short summary.",
            json!({
                "objective": {"type": "string"},
                "max_turns": {"type": "integer", "default": self.default_turns}
            }),
            &["objective"],
        )]
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let objective = call.str_arg("objective")?.trim().to_string();
        if objective.is_empty() {
            return Ok(ToolResult::error(call, "objective must not be empty"));
        }
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.max_calls {
            return Ok(ToolResult::error(
                call,
                format!("spawn_agent limit reached ({} per run)", self.max_calls),
            ));
        }
        let turns = self.clamp_turns(call.i64_arg("max_turns"));
        info!(objective = %objective, max_turns = turns, "spawning drone");
        let summary = self.spawner.spawn(objective, turns).await;
        Ok(ToolResult::ok(call, summary))
    }
}
