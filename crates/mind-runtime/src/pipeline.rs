//! Per-task orchestration: identity, memory context, budgets, persistence.

use chrono::Utc;
use futures::Stream;
use mind_config::{MindConfig, RuntimeConfig};
use mind_core::{
    EventKind, MemoryEntry, Mind, RawEvent, Result, RunResult, Task, TaskStatus, TraceEvent,
    category,
};
use mind_memory::{MemoryStore, MindStore, TraceKind};
use serde_json::json;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent_loop::{AgentRunner, RunRequest};
use crate::drone::DroneRunner;
use crate::prompt::{build_manifest, build_system_prompt};
use crate::sandbox::{Sandbox, SandboxLimits};
use crate::signals::{RunSummary, build_insight, infer_implicit_feedback, merge_labeled};
use crate::tools::{ToolContext, build_registry};

/// How long a cancelled runner gets to wind down before it is aborted.
const RUNNER_SHUTDOWN: Duration = Duration::from_secs(5);

/// Label of free-text search results in `memory_context.sources`.
const SEARCH_SOURCE: &str = "search";

/// Shared collaborators of every delegation and drone run.
pub struct PipelineDeps {
    pub config: Arc<MindConfig>,
    pub minds: MindStore,
    pub memory: MemoryStore,
    pub runner: Arc<dyn AgentRunner>,
}

/// Runs one task to completion and turns it into durable state.
#[derive(Clone)]
pub struct Pipeline {
    deps: Arc<PipelineDeps>,
}

impl Pipeline {
    pub fn new(deps: PipelineDeps) -> Self {
        Self {
            deps: Arc::new(deps),
        }
    }

    pub fn deps(&self) -> &PipelineDeps {
        &self.deps
    }

    /// Delegate `description` to a Mind, streaming raw progress events.
    ///
    /// The stream always ends with `task_finished` once a Task exists. A
    /// missing Mind yields a single `error` event and creates nothing.
    ///
    /// The run itself is a detached task started on first poll. Dropping the
    /// stream cancels it; the Task is still finalized and its Trace saved.
    pub fn delegate(
        &self,
        mind_id: &str,
        description: &str,
    ) -> impl Stream<Item = RawEvent> + Send + 'static {
        let deps = Arc::clone(&self.deps);
        let mind_id = mind_id.to_string();
        let description = description.to_string();

        async_stream::stream! {
            let cancel = CancellationToken::new();
            let _cancel_on_drop = cancel.clone().drop_guard();
            let (tx, mut rx) = mpsc::unbounded_channel();
            tokio::spawn(run_task(deps, mind_id, description, cancel.clone(), tx));
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
    }
}

/// Event sink of one delegation. Every event is recorded in the trace; the
/// consumer may already be gone.
struct Outlet {
    tx: mpsc::UnboundedSender<RawEvent>,
    log: RunLog,
}

impl Outlet {
    fn emit(&mut self, event: RawEvent) {
        self.log.record(&event);
        // A closed channel means the stream was dropped; the cancel token
        // already stopped the runner and finalization carries on.
        let _ = self.tx.send(event);
    }
}

async fn run_task(
    deps: Arc<PipelineDeps>,
    mind_id: String,
    description: String,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<RawEvent>,
) {
    let mind = match deps.minds.get_mind(&mind_id) {
        Ok(Some(mind)) => mind,
        Ok(None) => {
            warn!(mind = %mind_id, "delegation to unknown mind");
            let _ = tx.send(RawEvent::error(format!("Mind '{mind_id}' not found")));
            return;
        }
        Err(e) => {
            error!(mind = %mind_id, error = %e, "failed to load mind");
            let _ = tx.send(RawEvent::error(format!("Failed to load mind '{mind_id}': {e}")));
            return;
        }
    };

    let mut task = Task::new(&mind.id, &description);
    task.status = TaskStatus::Running;
    if let Err(e) = deps.minds.save_task(&task) {
        error!(mind = %mind.id, error = %e, "failed to create task");
        let _ = tx.send(RawEvent::error(format!("Failed to create task: {e}")));
        return;
    }
    info!(mind = %mind.id, task = %task.id, "task started");

    let mut out = Outlet {
        tx,
        log: RunLog::default(),
    };
    out.emit(RawEvent::new(
        EventKind::TaskStarted,
        json!({ "task_id": task.id, "mind_id": mind.id }),
    ));

    if let Some(event) = record_implicit_feedback(&deps, &mind, &task) {
        out.emit(event);
    }

    let context = memory_context(&deps, &mind.id, &description);
    out.emit(RawEvent::new(
        EventKind::MemoryContext,
        json!({
            "count": context.len(),
            "memory_ids": context.iter().map(|(_, m)| m.id.as_str()).collect::<Vec<_>>(),
            "sources": context.iter().map(|(s, _)| *s).collect::<Vec<_>>(),
        }),
    ));
    let memories: Vec<MemoryEntry> = context.into_iter().map(|(_, m)| m).collect();

    let mut run = RunOutcome::default();
    match prepare_run(&deps, &mind, &task, &memories, cancel.clone()) {
        Err(e) => {
            error!(task = %task.id, error = %e, "failed to prepare run");
            run.failure = Some(e.to_string());
        }
        Ok(prepared) => {
            let PreparedRun {
                request,
                tool_names,
                workspace,
            } = prepared;
            drive_runner(&deps, &task, request, tool_names, &cancel, &mut out, &mut run).await;
            drop(workspace);
        }
    }

    if run.latest_text.is_none() {
        run.latest_text = run.result.as_ref().and_then(|r| r.final_text.clone());
    }
    if run.failure.is_none() {
        if let Some(r) = run.result.as_ref().filter(|r| r.subtype.is_failure()) {
            run.failure = Some(r.error_message.clone().unwrap_or_else(|| {
                format!("Run ended with subtype '{}'", r.subtype.as_str())
            }));
        } else if run.result.is_none() && cancel.is_cancelled() {
            run.failure = Some("Run cancelled".into());
        }
    }

    match &run.failure {
        None => {
            task.finish(TaskStatus::Completed, run.latest_text.clone());
            save_task(&deps, &task);
            info!(mind = %mind.id, task = %task.id, "task completed");

            if let Some(text) = run.latest_text.as_deref() {
                if deps.config.runtime.autosave_memories_per_run > 0 {
                    let entry = MemoryEntry::new(
                        &mind.id,
                        format!("Completed task: {description}\nResult: {text}"),
                    )
                    .with_category(category::TASK_RESULT)
                    .with_keywords(["task", "result", "completion"]);
                    if let Some(event) = save_memory(&deps, &entry) {
                        out.emit(event);
                    }
                }
            }
        }
        Some(reason) => {
            task.finish(TaskStatus::Failed, Some(reason.clone()));
            save_task(&deps, &task);
            warn!(mind = %mind.id, task = %task.id, %reason, "task failed");

            if !run.reported_errors.contains(reason.trim()) {
                out.emit(RawEvent::error(format!("Mind execution failed: {reason}")));
            }
        }
    }

    let insight = build_insight(
        &mind.id,
        &RunSummary {
            description: &description,
            status: task.status,
            failure_reason: run.failure.as_deref(),
            latest_text: run.latest_text.as_deref(),
            event_counts: &out.log.counts,
            feedback_considered: count_category(&memories, category::USER_FEEDBACK),
            implicit_considered: count_category(&memories, category::IMPLICIT_FEEDBACK),
        },
    );
    if let Some(event) = save_memory(&deps, &insight) {
        out.emit(event);
    }

    let finished = RawEvent::new(
        EventKind::TaskFinished,
        json!({ "task_id": task.id, "status": task.status }),
    );
    out.log.record(&finished);
    if let Err(e) = deps
        .minds
        .save_trace(TraceKind::Task, &mind.id, &task.id, &out.log.trace)
    {
        error!(task = %task.id, error = %e, "failed to save task trace");
    }
    let _ = out.tx.send(finished);
}

/// What the runner produced, as far as finalization cares.
#[derive(Default)]
struct RunOutcome {
    failure: Option<String>,
    result: Option<RunResult>,
    latest_text: Option<String>,
    /// Trimmed texts of `error` events already emitted by the runner.
    reported_errors: HashSet<String>,
}

/// Spawn the runner and forward its events under the run's budget.
async fn drive_runner(
    deps: &PipelineDeps,
    task: &Task,
    request: RunRequest,
    tool_names: Vec<String>,
    cancel: &CancellationToken,
    out: &mut Outlet,
    run: &mut RunOutcome,
) {
    let mut budget = Budget::new(&deps.config.runtime);
    let event = RawEvent::new(EventKind::ToolRegistry, json!({ "tools": tool_names }));
    if let Err(reason) = budget.admit(event.kind) {
        run.failure = Some(reason);
        return;
    }
    out.emit(event);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = Arc::clone(&deps.runner);
    let mut handle = tokio::spawn(async move { runner.run(request, tx).await });

    loop {
        let next = if cancel.is_cancelled() {
            match tokio::time::timeout(RUNNER_SHUTDOWN, rx.recv()).await {
                Ok(next) => next,
                Err(_) => break,
            }
        } else {
            tokio::select! {
                next = rx.recv() => next,
                _ = cancel.cancelled() => {
                    debug!(task = %task.id, "run cancelled; draining runner");
                    continue;
                }
            }
        };
        let Some(event) = next else { break };

        if let Err(reason) = budget.admit(event.kind) {
            warn!(task = %task.id, %reason, "run budget exhausted");
            run.failure = Some(reason);
            cancel.cancel();
            break;
        }
        match event.kind {
            EventKind::Text => {
                if let Some(text) = event.as_text().filter(|t| !t.trim().is_empty()) {
                    run.latest_text = Some(text.to_string());
                }
            }
            EventKind::Error => {
                if let Some(text) = event.as_text() {
                    run.reported_errors.insert(text.trim().to_string());
                }
            }
            EventKind::Result => run.result = event.run_result(),
            _ => {}
        }
        out.emit(event);
    }
    drop(rx);

    match tokio::time::timeout(RUNNER_SHUTDOWN, &mut handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            warn!(task = %task.id, error = %e, "reasoning run failed");
            run.failure.get_or_insert(e.to_string());
        }
        Ok(Err(e)) => {
            error!(task = %task.id, error = %e, "reasoning task panicked");
            run.failure.get_or_insert(format!("reasoning task failed: {e}"));
        }
        Err(_) => {
            warn!(task = %task.id, "runner did not stop in time; aborting");
            handle.abort();
            run.failure.get_or_insert_with(|| "Run cancelled".into());
        }
    }
}

/// Everything recorded about one run so far.
#[derive(Default)]
struct RunLog {
    trace: Vec<TraceEvent>,
    counts: BTreeMap<&'static str, usize>,
}

impl RunLog {
    fn record(&mut self, event: &RawEvent) {
        self.trace.push(TraceEvent::record(event));
        *self.counts.entry(event.kind.as_str()).or_default() += 1;
    }
}

/// Independent caps on regular and incremental events.
struct Budget {
    events: usize,
    deltas: usize,
    event_limit: usize,
    delta_limit: usize,
}

impl Budget {
    fn new(limits: &RuntimeConfig) -> Self {
        Self {
            events: 0,
            deltas: 0,
            event_limit: limits.stream_event_limit,
            delta_limit: limits.text_delta_event_limit,
        }
    }

    fn admit(&mut self, kind: EventKind) -> std::result::Result<(), String> {
        if kind.is_incremental() {
            self.deltas += 1;
            if self.deltas > self.delta_limit {
                return Err(format!("Text delta limit reached ({})", self.delta_limit));
            }
        } else {
            self.events += 1;
            if self.events > self.event_limit {
                return Err(format!("Event limit reached ({})", self.event_limit));
            }
        }
        Ok(())
    }
}

struct PreparedRun {
    request: RunRequest,
    tool_names: Vec<String>,
    /// Kept alive until the run ends.
    workspace: Option<TempDir>,
}

/// Configured workspace directory, or a fresh temporary one.
pub(crate) fn prepare_workspace(config: &MindConfig) -> Result<(PathBuf, Option<TempDir>)> {
    match &config.sandbox.workspace_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            Ok((dir.clone(), None))
        }
        None => {
            let tmp = tempfile::Builder::new().prefix("mind-run-").tempdir()?;
            Ok((tmp.path().to_path_buf(), Some(tmp)))
        }
    }
}

fn prepare_run(
    deps: &Arc<PipelineDeps>,
    mind: &Mind,
    task: &Task,
    memories: &[MemoryEntry],
    cancel: CancellationToken,
) -> Result<PreparedRun> {
    let (root, workspace) = prepare_workspace(&deps.config)?;
    let sandbox = Arc::new(Sandbox::new(
        &root,
        SandboxLimits::from(&deps.config.sandbox),
    )?);
    let spawner = Arc::new(DroneRunner::new(
        Arc::clone(deps),
        mind.clone(),
        task.id.clone(),
        cancel.clone(),
    ));
    let registry = build_registry(
        ToolContext {
            sandbox,
            memory: deps.memory.clone(),
            mind_id: mind.id.clone(),
            runtime_tools: deps.minds.list_runtime_tools(&mind.id)?,
            cancel: cancel.clone(),
            spawner: Some(spawner),
        },
        &deps.config.runtime,
    )?;
    let tool_names = registry.names();
    let manifest = build_manifest(mind, &tool_names, &deps.config.runtime);
    debug!(task = %task.id, workspace = %root.display(), tools = tool_names.len(), "run prepared");

    Ok(PreparedRun {
        request: RunRequest {
            prompt: task.description.clone(),
            system_prompt: build_system_prompt(mind, memories, &manifest),
            tools: Arc::new(registry),
            max_turns: deps.config.runtime.max_turns,
            cancel,
        },
        tool_names,
        workspace,
    })
}

/// Infer and persist an implicit-feedback signal from the previous task.
fn record_implicit_feedback(deps: &PipelineDeps, mind: &Mind, task: &Task) -> Option<RawEvent> {
    let previous = match deps.minds.latest_task(&mind.id, Some(&task.id)) {
        Ok(previous) => previous?,
        Err(e) => {
            warn!(mind = %mind.id, error = %e, "failed to load previous task");
            return None;
        }
    };
    let signal = infer_implicit_feedback(
        mind,
        &previous,
        &task.description,
        Utc::now(),
        &deps.config.feedback,
    )?;

    match deps
        .memory
        .latest_in_category(&mind.id, category::IMPLICIT_FEEDBACK)
    {
        Ok(Some(latest)) if latest.content == signal.entry.content => {
            debug!(mind = %mind.id, "implicit feedback unchanged; not saving");
            return None;
        }
        Ok(_) => {}
        Err(e) => {
            warn!(mind = %mind.id, error = %e, "failed to read implicit feedback");
            return None;
        }
    }
    if let Err(e) = deps.memory.save(&signal.entry) {
        warn!(mind = %mind.id, error = %e, "failed to save implicit feedback");
        return None;
    }
    info!(
        mind = %mind.id,
        signal = signal.kind.as_str(),
        previous = %signal.previous_task_id,
        "implicit feedback inferred"
    );
    Some(RawEvent::new(
        EventKind::ImplicitFeedbackInferred,
        json!({
            "memory_id": signal.entry.id,
            "signal": signal.kind.as_str(),
            "previous_task_id": signal.previous_task_id,
            "similarity": signal.similarity,
        }),
    ))
}

/// Priority-ordered memory context: feedback, implicit signals, insights, search.
fn memory_context(
    deps: &PipelineDeps,
    mind_id: &str,
    description: &str,
) -> Vec<(&'static str, MemoryEntry)> {
    let limits = &deps.config.runtime;
    let mut groups = Vec::with_capacity(4);
    for cat in [
        category::USER_FEEDBACK,
        category::IMPLICIT_FEEDBACK,
        category::MIND_INSIGHT,
    ] {
        let entries = deps
            .memory
            .list(mind_id, Some(cat), Some(limits.category_context_limit))
            .unwrap_or_else(|e| {
                warn!(mind = %mind_id, category = cat, error = %e, "memory list failed");
                Vec::new()
            });
        groups.push((cat, entries));
    }
    let found = deps
        .memory
        .search(mind_id, description, limits.memory_search_top_k)
        .unwrap_or_else(|e| {
            warn!(mind = %mind_id, error = %e, "memory search failed");
            Vec::new()
        });
    groups.push((SEARCH_SOURCE, found));
    merge_labeled(groups, limits.memory_context_limit)
}

fn count_category(memories: &[MemoryEntry], cat: &str) -> usize {
    memories
        .iter()
        .filter(|m| m.category.as_deref() == Some(cat))
        .count()
}

fn save_task(deps: &PipelineDeps, task: &Task) {
    if let Err(e) = deps.minds.save_task(task) {
        error!(task = %task.id, error = %e, "failed to persist task status");
    }
}

/// Persist a pipeline-written memory, returning its `memory_saved` event.
fn save_memory(deps: &PipelineDeps, entry: &MemoryEntry) -> Option<RawEvent> {
    match deps.memory.save(entry) {
        Ok(()) => Some(RawEvent::new(
            EventKind::MemorySaved,
            json!({ "category": entry.category, "memory_id": entry.id }),
        )),
        Err(e) => {
            warn!(memory = %entry.id, error = %e, "failed to save memory");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_counts_kinds_separately() {
        let limits = RuntimeConfig {
            stream_event_limit: 2,
            text_delta_event_limit: 1,
            ..RuntimeConfig::default()
        };
        let mut budget = Budget::new(&limits);
        assert!(budget.admit(EventKind::TextDelta).is_ok());
        assert!(budget.admit(EventKind::Text).is_ok());
        assert!(budget.admit(EventKind::ToolUse).is_ok());
        assert_eq!(
            budget.admit(EventKind::TextDelta).unwrap_err(),
            "Text delta limit reached (1)"
        );
        assert_eq!(
            budget.admit(EventKind::Result).unwrap_err(),
            "Event limit reached (2)"
        );
    }
}
