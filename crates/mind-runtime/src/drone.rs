use async_trait::async_trait;
use mind_core::{Drone, EventKind, Mind, RawEvent, Result, TaskStatus, TraceEvent};
use mind_memory::TraceKind;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent_loop::RunRequest;
use crate::pipeline::PipelineDeps;
use crate::prompt::{build_manifest, build_system_prompt};
use crate::sandbox::{Sandbox, SandboxLimits};
use crate::tools::{DroneSpawner, ToolContext, build_registry};

/// Texts from the end of a drone run returned to the parent.
const SUMMARY_TEXTS: usize = 3;

const NO_OUTPUT: &str = "Sub-agent completed with no textual output.";

/// Runs `spawn_agent` objectives as bounded nested reasoning runs.
///
/// A drone gets its own temporary workspace and a tool set without
/// `spawn_agent`, so nesting stops at one level.
pub struct DroneRunner {
    deps: Arc<PipelineDeps>,
    mind: Mind,
    task_id: String,
    cancel: CancellationToken,
}

impl DroneRunner {
    pub fn new(
        deps: Arc<PipelineDeps>,
        mind: Mind,
        task_id: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            deps,
            mind,
            task_id,
            cancel,
        }
    }

    /// Run the drone and collect its events. `Err` only for setup failures.
    async fn execute(&self, objective: &str, max_turns: u32) -> Result<Vec<RawEvent>> {
        let workspace = tempfile::Builder::new().prefix("mind-drone-").tempdir()?;
        let sandbox = Arc::new(Sandbox::new(
            workspace.path(),
            SandboxLimits::from(&self.deps.config.sandbox),
        )?);
        let cancel = self.cancel.child_token();
        let registry = build_registry(
            ToolContext {
                sandbox,
                memory: self.deps.memory.clone(),
                mind_id: self.mind.id.clone(),
                runtime_tools: self.deps.minds.list_runtime_tools(&self.mind.id)?,
                cancel: cancel.clone(),
                spawner: None,
            },
            &self.deps.config.runtime,
        )?;
        let manifest = build_manifest(&self.mind, &registry.names(), &self.deps.config.runtime);
        let memories = self.deps.memory.search(
            &self.mind.id,
            objective,
            self.deps.config.runtime.memory_search_top_k,
        )?;

        let request = RunRequest {
            prompt: format!("[Drone Objective] {objective}"),
            system_prompt: build_system_prompt(&self.mind, &memories, &manifest),
            tools: Arc::new(registry),
            max_turns,
            cancel,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = self.deps.runner.run(request, tx).await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        drop(workspace);
        // Events produced before a runner failure are kept.
        if let Err(e) = outcome {
            events.push(RawEvent::error(e.to_string()));
        }
        Ok(events)
    }
}

/// Last few non-empty texts, or a fixed note when there are none.
fn summarize(events: &[RawEvent]) -> String {
    let texts: Vec<&str> = events
        .iter()
        .filter(|e| e.kind == EventKind::Text)
        .filter_map(|e| e.as_text())
        .filter(|t| !t.trim().is_empty())
        .collect();
    if texts.is_empty() {
        return NO_OUTPUT.to_string();
    }
    texts[texts.len().saturating_sub(SUMMARY_TEXTS)..].join("\n")
}

/// Failure reason of a drone run, if it failed.
fn failure_reason(events: &[RawEvent]) -> Option<String> {
    if let Some(result) = events.iter().rev().find_map(|e| e.run_result()) {
        return result.subtype.is_failure().then(|| {
            result
                .error_message
                .unwrap_or_else(|| format!("run ended with subtype '{}'", result.subtype.as_str()))
        });
    }
    // No result event: the runner itself failed.
    events
        .iter()
        .rev()
        .find(|e| e.kind == EventKind::Error)
        .and_then(|e| e.as_text().map(str::to_string))
}

#[async_trait]
impl DroneSpawner for DroneRunner {
    async fn spawn(&self, objective: String, max_turns: u32) -> String {
        let mut drone = Drone::new(&self.mind.id, &self.task_id, &objective);
        drone.status = TaskStatus::Running;
        if let Err(e) = self.deps.minds.save_drone(&drone) {
            warn!(drone = %drone.id, error = %e, "failed to save drone");
        }
        info!(mind = %self.mind.id, task = %self.task_id, drone = %drone.id, max_turns, "drone started");

        let (summary, trace) = match self.execute(&objective, max_turns).await {
            Ok(events) => {
                let trace: Vec<TraceEvent> = events.iter().map(TraceEvent::record).collect();
                match failure_reason(&events) {
                    None => {
                        let summary = summarize(&events);
                        drone.finish(TaskStatus::Completed, summary.clone());
                        (summary, trace)
                    }
                    Some(reason) => {
                        let summary = format!("Drone failed: {reason}");
                        drone.finish(TaskStatus::Failed, summary.clone());
                        (summary, trace)
                    }
                }
            }
            Err(e) => {
                let summary = format!("Drone failed: {e}");
                drone.finish(TaskStatus::Failed, summary.clone());
                let trace = vec![TraceEvent::record(&RawEvent::error(e.to_string()))];
                (summary, trace)
            }
        };
        info!(drone = %drone.id, status = %drone.status, "drone finished");

        if let Err(e) = self.deps.minds.save_drone(&drone) {
            error!(drone = %drone.id, error = %e, "failed to persist drone status");
        }
        if let Err(e) =
            self.deps
                .minds
                .save_trace(TraceKind::Drone, &self.mind.id, &drone.id, &trace)
        {
            error!(drone = %drone.id, error = %e, "failed to save drone trace");
        }
        summary
    }
}
