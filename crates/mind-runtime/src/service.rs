//! Protocol-agnostic facade over minds, tasks, feedback, memory and delegation.
//!
//! Front ends (the CLI today) call into [`MindService`] and map
//! [`MindError`] variants to their own error surface.

use futures::{StreamExt, stream::BoxStream};
use mind_config::MindConfig;
use mind_core::{
    Charter, Drone, Event, MemoryEntry, Mind, MindError, Result, RuntimeToolSpec, Task, Trace,
    category,
};
use mind_memory::{Database, MemoryStore, MindStore, TraceKind};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::agent_loop::AgentRunner;
use crate::pipeline::{Pipeline, PipelineDeps};
use crate::prompt::{build_manifest, truncate_chars};
use crate::stream::EventStream;
use crate::tools::{RESERVED_TOOL_NAMES, validate_tool_name};

/// Characters of changed free text quoted in a profile-update signal.
const PREVIEW_CHARS: usize = 160;

/// Fields for a new Mind. Unset fields take their defaults.
#[derive(Debug, Clone, Default)]
pub struct NewMind {
    pub name: String,
    pub personality: String,
    pub preferences: Map<String, Value>,
    pub system_prompt: String,
    pub charter: Option<Charter>,
}

/// Partial charter update. Empty strings leave the current value in place.
#[derive(Debug, Clone, Default)]
pub struct CharterUpdate {
    pub mission: Option<String>,
    pub reason_for_existence: Option<String>,
    pub operating_principles: Option<Vec<String>>,
    pub non_goals: Option<Vec<String>>,
    pub reflection_focus: Option<Vec<String>>,
}

/// Partial profile update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct MindUpdate {
    pub name: Option<String>,
    pub personality: Option<String>,
    pub preferences: Option<Map<String, Value>>,
    pub system_prompt: Option<String>,
    pub charter: Option<CharterUpdate>,
}

/// Explicit user feedback on a Mind's behavior.
#[derive(Debug, Clone, Default)]
pub struct FeedbackInput {
    pub content: String,
    pub task_id: Option<String>,
    /// 1 to 5.
    pub rating: Option<i64>,
    pub tags: Vec<String>,
}

pub struct MindService {
    config: Arc<MindConfig>,
    minds: MindStore,
    memory: MemoryStore,
    pipeline: Pipeline,
}

impl MindService {
    pub fn new(config: Arc<MindConfig>, db: Database, runner: Arc<dyn AgentRunner>) -> Self {
        let minds = MindStore::new(db.clone());
        let memory = MemoryStore::new(db);
        let pipeline = Pipeline::new(PipelineDeps {
            config: Arc::clone(&config),
            minds: minds.clone(),
            memory: memory.clone(),
            runner,
        });
        Self {
            config,
            minds,
            memory,
            pipeline,
        }
    }

    /// Open the database at `store.path` and build the service over it.
    pub fn open(config: Arc<MindConfig>, runner: Arc<dyn AgentRunner>) -> Result<Self> {
        let db = Database::open(&config.store.path)?;
        Ok(Self::new(config, db, runner))
    }

    pub fn config(&self) -> &MindConfig {
        &self.config
    }

    // ── Minds ──────────────────────────────────────────────────

    pub fn create_mind(&self, input: NewMind) -> Result<Mind> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(MindError::Validation("Mind name cannot be empty".into()));
        }
        let mut mind = Mind::new(name);
        mind.personality = input.personality;
        mind.preferences = input.preferences;
        mind.system_prompt = input.system_prompt;
        if let Some(charter) = input.charter {
            mind.charter = charter;
        }
        self.minds.save_mind(&mind)?;
        info!(mind = %mind.id, name = %mind.name, "mind created");
        Ok(mind)
    }

    pub fn get_mind(&self, mind_id: &str) -> Result<Mind> {
        self.minds
            .get_mind(mind_id)?
            .ok_or_else(|| MindError::NotFound(format!("Mind '{mind_id}' not found")))
    }

    pub fn list_minds(&self) -> Result<Vec<Mind>> {
        self.minds.list_minds()
    }

    /// Apply a partial update and record what changed as implicit feedback.
    pub fn update_mind(&self, mind_id: &str, update: MindUpdate) -> Result<Mind> {
        let before = self.get_mind(mind_id)?;
        let mut mind = before.clone();

        if let Some(name) = update.name {
            mind.name = name;
        }
        if let Some(personality) = update.personality {
            mind.personality = personality;
        }
        if let Some(preferences) = update.preferences {
            mind.preferences = preferences;
        }
        if let Some(system_prompt) = update.system_prompt {
            mind.system_prompt = system_prompt;
        }
        if let Some(charter) = update.charter {
            apply_charter_update(&mut mind.charter, charter);
        }

        self.minds.save_mind(&mind)?;
        if let Some(signal) = profile_update_signal(&before, &mind) {
            self.memory.save(&signal)?;
            info!(mind = %mind.id, memory = %signal.id, "profile update recorded as implicit feedback");
        }
        Ok(mind)
    }

    // ── Feedback ───────────────────────────────────────────────

    pub fn submit_feedback(&self, mind_id: &str, input: FeedbackInput) -> Result<MemoryEntry> {
        let mind = self.get_mind(mind_id)?;
        let content = input.content.trim();
        if content.is_empty() {
            return Err(MindError::Validation(
                "Feedback content cannot be empty".into(),
            ));
        }
        if let Some(rating) = input.rating {
            if !(1..=5).contains(&rating) {
                return Err(MindError::Validation(format!(
                    "Rating must be between 1 and 5, got {rating}"
                )));
            }
        }
        let related = match input.task_id.as_deref() {
            Some(task_id) => Some(self.get_task(mind_id, task_id)?),
            None => None,
        };

        let mut lines = vec![
            "User feedback for Mind behavior:".to_string(),
            format!("Mind: {} ({})", mind.name, mind.id),
        ];
        if let Some(task) = &related {
            lines.push(format!("Task ID: {}", task.id));
            lines.push(format!("Task description: {}", task.description));
        }
        if let Some(rating) = input.rating {
            lines.push(format!("Rating: {rating}/5"));
        }
        lines.push(format!("Feedback: {content}"));

        let mut keywords: BTreeSet<String> = ["feedback", "user_preference", "alignment"]
            .into_iter()
            .map(String::from)
            .collect();
        match input.rating {
            Some(r) if r >= 4 => {
                keywords.insert("positive_feedback".into());
            }
            Some(r) if r <= 2 => {
                keywords.insert("corrective_feedback".into());
            }
            _ => {}
        }
        for tag in &input.tags {
            let cleaned = tag.trim().to_lowercase().replace(' ', "_");
            if !cleaned.is_empty() {
                keywords.insert(cleaned);
            }
        }

        let entry = MemoryEntry::new(&mind.id, lines.join("\n"))
            .with_category(category::USER_FEEDBACK)
            .with_keywords(keywords);
        self.memory.save(&entry)?;
        info!(mind = %mind.id, memory = %entry.id, "feedback saved");
        Ok(entry)
    }

    // ── Delegation ─────────────────────────────────────────────

    /// Run a task and stream wrapped events under a fresh trace id.
    pub fn delegate(&self, mind_id: &str, description: &str) -> BoxStream<'static, Event> {
        let raw = self.pipeline.delegate(mind_id, description);
        EventStream::with_random_trace_id().into_stream(raw).boxed()
    }

    // ── Tasks & drones ─────────────────────────────────────────

    pub fn list_tasks(&self, mind_id: &str) -> Result<Vec<Task>> {
        self.get_mind(mind_id)?;
        self.minds.list_tasks(mind_id)
    }

    pub fn get_task(&self, mind_id: &str, task_id: &str) -> Result<Task> {
        self.minds
            .get_task(mind_id, task_id)?
            .ok_or_else(|| MindError::NotFound(format!("Task '{task_id}' not found")))
    }

    pub fn get_task_trace(&self, mind_id: &str, task_id: &str) -> Result<Trace> {
        self.minds
            .get_trace(TraceKind::Task, mind_id, task_id)?
            .ok_or_else(|| MindError::NotFound(format!("Task trace for '{task_id}' not found")))
    }

    /// Drones of a Mind, optionally only those spawned by one task.
    pub fn list_drones(&self, mind_id: &str, task_id: Option<&str>) -> Result<Vec<Drone>> {
        match task_id {
            Some(task_id) => {
                self.get_task(mind_id, task_id)?;
            }
            None => {
                self.get_mind(mind_id)?;
            }
        }
        self.minds.list_drones(mind_id, task_id)
    }

    pub fn get_drone_trace(&self, mind_id: &str, drone_id: &str) -> Result<Trace> {
        self.minds
            .get_trace(TraceKind::Drone, mind_id, drone_id)?
            .ok_or_else(|| {
                MindError::NotFound(format!("Drone trace for '{drone_id}' not found"))
            })
    }

    // ── Memory ─────────────────────────────────────────────────

    pub fn list_memory(&self, mind_id: &str, category: Option<&str>) -> Result<Vec<MemoryEntry>> {
        self.get_mind(mind_id)?;
        self.memory.list(mind_id, category, None)
    }

    pub fn search_memory(&self, mind_id: &str, query: &str, top_k: usize) -> Result<Vec<MemoryEntry>> {
        self.get_mind(mind_id)?;
        self.memory.search(mind_id, query, top_k)
    }

    // ── Runtime tools & self-knowledge ─────────────────────────

    pub fn register_runtime_tool(&self, mind_id: &str, spec: RuntimeToolSpec) -> Result<RuntimeToolSpec> {
        self.get_mind(mind_id)?;
        let spec = RuntimeToolSpec {
            name: spec.name.trim().to_string(),
            description: spec.description.trim().to_string(),
            response: spec.response,
        };
        validate_tool_name(&spec.name)?;
        self.minds.save_runtime_tool(mind_id, &spec)?;
        info!(mind = %mind_id, tool = %spec.name, "runtime tool registered");
        Ok(spec)
    }

    pub fn list_runtime_tools(&self, mind_id: &str) -> Result<Vec<RuntimeToolSpec>> {
        self.get_mind(mind_id)?;
        self.minds.list_runtime_tools(mind_id)
    }

    /// The manifest a delegated run of this Mind would see.
    pub fn self_knowledge(&self, mind_id: &str) -> Result<Value> {
        let mind = self.get_mind(mind_id)?;
        let mut names: Vec<String> = RESERVED_TOOL_NAMES.iter().map(|s| s.to_string()).collect();
        names.extend(
            self.minds
                .list_runtime_tools(mind_id)?
                .into_iter()
                .map(|spec| spec.name),
        );
        names.sort();
        Ok(build_manifest(&mind, &names, &self.config.runtime))
    }
}

fn apply_charter_update(charter: &mut Charter, update: CharterUpdate) {
    if let Some(mission) = update.mission.filter(|s| !s.is_empty()) {
        charter.mission = mission;
    }
    if let Some(reason) = update.reason_for_existence.filter(|s| !s.is_empty()) {
        charter.reason_for_existence = reason;
    }
    if let Some(principles) = update.operating_principles {
        charter.operating_principles = principles;
    }
    if let Some(non_goals) = update.non_goals {
        charter.non_goals = non_goals;
    }
    if let Some(focus) = update.reflection_focus {
        charter.reflection_focus = focus;
    }
}

fn preview(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return "not set".into();
    }
    truncate_chars(text, PREVIEW_CHARS)
}

/// Describe a profile change as an `implicit_feedback` memory.
fn profile_update_signal(before: &Mind, after: &Mind) -> Option<MemoryEntry> {
    let mut changes = Vec::new();
    let mut keywords: BTreeSet<&str> =
        ["implicit_feedback", "profile_update", "preference_signal"].into();

    if before.name != after.name {
        changes.push(format!(
            "- User renamed the mind from '{}' to '{}'.",
            before.name, after.name
        ));
        keywords.insert("identity_update");
    }
    if before.personality != after.personality {
        changes.push(format!(
            "- User updated personality guidance to: '{}'.",
            preview(&after.personality)
        ));
        keywords.insert("personality_update");
    }
    if before.system_prompt != after.system_prompt {
        changes.push(format!(
            "- User changed system prompt preference; new emphasis: '{}'.",
            preview(&after.system_prompt)
        ));
        keywords.insert("system_prompt_update");
    }
    if before.preferences != after.preferences {
        let keys: BTreeSet<&String> = before
            .preferences
            .keys()
            .chain(after.preferences.keys())
            .collect();
        let keys: Vec<&str> = keys.into_iter().map(String::as_str).collect();
        let keys = if keys.is_empty() {
            "none".to_string()
        } else {
            keys.join(", ")
        };
        changes.push(format!("- User changed preference JSON keys: {keys}."));
        keywords.insert("preferences_update");
    }

    let (b, a) = (&before.charter, &after.charter);
    if b.mission != a.mission {
        changes.push(format!(
            "- User changed charter mission toward: '{}'.",
            preview(&a.mission)
        ));
        keywords.insert("charter_mission_update");
    }
    if b.reason_for_existence != a.reason_for_existence {
        changes.push(format!(
            "- User updated reason-for-existence framing to: '{}'.",
            preview(&a.reason_for_existence)
        ));
        keywords.insert("charter_reason_update");
    }
    if b.operating_principles != a.operating_principles {
        changes.push("- User revised operating principles.".into());
        keywords.insert("charter_principles_update");
    }
    if b.non_goals != a.non_goals {
        changes.push("- User revised non-goals and boundaries.".into());
        keywords.insert("charter_non_goals_update");
    }
    if b.reflection_focus != a.reflection_focus {
        changes.push("- User revised reflection focus priorities.".into());
        keywords.insert("charter_reflection_update");
    }

    if changes.is_empty() {
        return None;
    }

    let mut lines = vec![
        "Inferred implicit feedback from profile update:".to_string(),
        format!("Mind: {} ({})", after.name, after.id),
    ];
    lines.extend(changes);
    lines.push(
        "- Inference: treat these updates as stronger default user preferences until contradicted."
            .into(),
    );
    Some(
        MemoryEntry::new(&after.id, lines.join("\n"))
            .with_category(category::IMPLICIT_FEEDBACK)
            .with_keywords(keywords),
    )
}
