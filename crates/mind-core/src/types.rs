use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a Mind (agent identity).
pub type MindId = String;

/// Identifier of a task.
pub type TaskId = String;

/// Identifier of a drone (sub-task).
pub type DroneId = String;

/// Short random identifier used for minds, tasks, drones, and memories.
pub fn new_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Fixed-width RFC 3339 timestamp, so lexical order matches time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Memory categories written by the delegation pipeline and the service.
pub mod category {
    pub const USER_FEEDBACK: &str = "user_feedback";
    pub const IMPLICIT_FEEDBACK: &str = "implicit_feedback";
    pub const TASK_RESULT: &str = "task_result";
    pub const MIND_INSIGHT: &str = "mind_insight";
}

// ── Identity ───────────────────────────────────────────────────

/// Structured mission metadata injected into the model's instructions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Charter {
    pub mission: String,
    pub reason_for_existence: String,
    pub operating_principles: Vec<String>,
    pub non_goals: Vec<String>,
    pub reflection_focus: Vec<String>,
}

impl Default for Charter {
    fn default() -> Self {
        Self {
            mission: "Help the user accomplish delegated work safely and effectively.".into(),
            reason_for_existence:
                "Act as a persistent operator that gets better with every task it completes."
                    .into(),
            operating_principles: vec![
                "Prefer small, verifiable steps over large speculative changes.".into(),
                "Explain key decisions and surface uncertainty early.".into(),
                "Respect user feedback as the strongest signal of intent.".into(),
            ],
            non_goals: vec![
                "Do not take irreversible actions outside the workspace.".into(),
                "Do not invent results that were not produced by a tool.".into(),
            ],
            reflection_focus: vec![
                "What slowed the last task down?".into(),
                "Which feedback has not been acted on yet?".into(),
            ],
        }
    }
}

/// A persistent agent profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mind {
    pub id: MindId,
    pub name: String,
    #[serde(default)]
    pub personality: String,
    #[serde(default)]
    pub preferences: serde_json::Map<String, serde_json::Value>,
    /// Extra operating instructions appended to the generated system prompt.
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub charter: Charter,
    pub created_at: DateTime<Utc>,
}

impl Mind {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            personality: String::new(),
            preferences: Default::default(),
            system_prompt: String::new(),
            charter: Charter::default(),
            created_at: Utc::now(),
        }
    }
}

// ── Tasks & drones ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::MindError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(crate::MindError::Validation(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

/// One end-to-end delegation request and its outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub mind_id: MindId,
    pub description: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(mind_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            mind_id: mind_id.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            result: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move the task to a terminal status.
    pub fn finish(&mut self, status: TaskStatus, result: Option<String>) {
        self.status = status;
        self.result = result;
        self.completed_at = Some(Utc::now());
    }
}

/// A bounded sub-task spawned by a reasoning loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drone {
    pub id: DroneId,
    pub mind_id: MindId,
    pub task_id: TaskId,
    pub objective: String,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Drone {
    pub fn new(
        mind_id: impl Into<String>,
        task_id: impl Into<String>,
        objective: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            mind_id: mind_id.into(),
            task_id: task_id.into(),
            objective: objective.into(),
            status: TaskStatus::Pending,
            result: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn finish(&mut self, status: TaskStatus, result: String) {
        self.status = status;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }
}

// ── Memory ─────────────────────────────────────────────────────

/// A durable, searchable text record owned by one Mind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub mind_id: MindId,
    pub content: String,
    pub category: Option<String>,
    #[serde(default)]
    pub relevance_keywords: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    pub fn new(mind_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            mind_id: mind_id.into(),
            content: content.into(),
            category: None,
            relevance_keywords: vec![],
            created_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relevance_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }
}

// ── Runtime tools ──────────────────────────────────────────────

/// A user-registered tool that answers with a fixed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeToolSpec {
    pub name: String,
    pub description: String,
    pub response: String,
}
