use futures::StreamExt;
use mind_config::MindConfig;
use mind_core::{Event, EventKind, MindError, Result};
use mind_runtime::MindService;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::{resolve_mind, runner, truncate_output};

/// How long an interrupted delegation may take to record its failure.
const FINALIZE_WAIT: Duration = Duration::from_secs(10);

pub(super) async fn cmd_delegate(
    config: Arc<MindConfig>,
    mind: &str,
    description: &str,
    json: bool,
) -> Result<()> {
    let service = runner::delegating_service(config)?;
    let mind = resolve_mind(&service, mind)?;

    let mut events = service.delegate(&mind.id, description);
    let mut transcript = Transcript::default();
    let mut started: Option<String> = None;

    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        let event = tokio::select! {
            event = events.next() => event,
            _ = &mut interrupt => {
                warn!(mind = %mind.id, "interrupted; cancelling run");
                drop(events);
                if let Some(task_id) = started {
                    await_finalized(&service, &mind.id, &task_id).await;
                }
                eprintln!("\n⏹  Interrupted, run cancelled");
                return Err(MindError::Cancelled);
            }
        };
        let Some(event) = event else { break };
        if event.kind == EventKind::TaskStarted {
            started = event.content["task_id"].as_str().map(str::to_string);
        }
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            transcript.show(&event);
        }
        if event.kind == EventKind::TaskFinished {
            transcript.status = event.content["status"].as_str().map(str::to_string);
            transcript.task_id = event.content["task_id"].as_str().map(str::to_string);
        }
    }

    match (transcript.status.as_deref(), transcript.task_id) {
        (Some("completed"), _) => Ok(()),
        (Some(status), Some(task_id)) => Err(anyhow::anyhow!("task {task_id} {status}").into()),
        _ => Err(anyhow::anyhow!("delegation ended without a finished task").into()),
    }
}

/// Wait for a cancelled run to persist its terminal status.
async fn await_finalized(service: &MindService, mind_id: &str, task_id: &str) {
    let deadline = tokio::time::Instant::now() + FINALIZE_WAIT;
    while tokio::time::Instant::now() < deadline {
        match service.get_task(mind_id, task_id) {
            Ok(task) if task.status.is_terminal() => {
                info!(task = %task_id, status = %task.status, "interrupted task finalized");
                return;
            }
            Ok(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            Err(e) => {
                warn!(task = %task_id, error = %e, "could not check interrupted task");
                return;
            }
        }
    }
    warn!(task = %task_id, "interrupted task still running; exiting anyway");
}

/// Human-readable rendering of a delegation stream.
#[derive(Default)]
struct Transcript {
    /// Text deltas were printed since the last complete text.
    streaming: bool,
    status: Option<String>,
    task_id: Option<String>,
}

impl Transcript {
    fn show(&mut self, event: &Event) {
        let c = &event.content;
        match event.kind {
            EventKind::TaskStarted => {
                eprintln!("▶  task {}", c["task_id"].as_str().unwrap_or("?"));
            }
            EventKind::MemoryContext => {
                eprintln!("   memory context: {} entries", c["count"]);
            }
            EventKind::ImplicitFeedbackInferred => {
                eprintln!(
                    "   inferred {} signal from task {}",
                    c["signal"].as_str().unwrap_or("?"),
                    c["previous_task_id"].as_str().unwrap_or("?")
                );
            }
            EventKind::ToolRegistry => {}
            EventKind::TextDelta => {
                print!("{}", c.as_str().unwrap_or_default());
                std::io::stdout().flush().ok();
                self.streaming = true;
            }
            EventKind::Text => {
                if self.streaming {
                    println!();
                    self.streaming = false;
                } else {
                    println!("{}", c.as_str().unwrap_or_default());
                }
            }
            EventKind::ToolUse => {
                self.end_line();
                eprintln!(
                    "\x1b[36m🔧 {}\x1b[0m {}",
                    c["tool"].as_str().unwrap_or("?"),
                    truncate_output(&c["input"].to_string(), 100)
                );
            }
            EventKind::ToolResult => {
                let result = truncate_output(c["result"].as_str().unwrap_or_default(), 100);
                if c["is_error"].as_bool().unwrap_or(false) {
                    eprintln!("   \x1b[31m✗ {result}\x1b[0m");
                } else {
                    eprintln!("   \x1b[90m✓ {result}\x1b[0m");
                }
            }
            EventKind::MemorySaved => {
                eprintln!(
                    "   saved {} memory {}",
                    c["category"].as_str().unwrap_or("uncategorised"),
                    c["memory_id"].as_str().unwrap_or("?")
                );
            }
            EventKind::Result => {
                self.end_line();
                if let Some(cost) = c["cost_usd"].as_f64().filter(|cost| *cost > 0.0) {
                    eprintln!("   cost: ${cost:.4}");
                }
            }
            EventKind::Error => {
                self.end_line();
                eprintln!("\x1b[31m❌ {}\x1b[0m", c.as_str().unwrap_or_default());
            }
            EventKind::TaskFinished => {
                self.end_line();
                let status = c["status"].as_str().unwrap_or("?");
                let mark = if status == "completed" { "✅" } else { "❌" };
                eprintln!("{mark} task {} {status}", c["task_id"].as_str().unwrap_or("?"));
            }
        }
    }

    fn end_line(&mut self) {
        if self.streaming {
            println!();
            self.streaming = false;
        }
    }
}
