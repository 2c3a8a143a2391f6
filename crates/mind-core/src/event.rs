use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::types::format_timestamp;

/// Type tag of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskStarted,
    MemoryContext,
    ToolRegistry,
    Text,
    TextDelta,
    ToolUse,
    ToolResult,
    MemorySaved,
    ImplicitFeedbackInferred,
    Result,
    Error,
    TaskFinished,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TaskStarted => "task_started",
            EventKind::MemoryContext => "memory_context",
            EventKind::ToolRegistry => "tool_registry",
            EventKind::Text => "text",
            EventKind::TextDelta => "text_delta",
            EventKind::ToolUse => "tool_use",
            EventKind::ToolResult => "tool_result",
            EventKind::MemorySaved => "memory_saved",
            EventKind::ImplicitFeedbackInferred => "implicit_feedback_inferred",
            EventKind::Result => "result",
            EventKind::Error => "error",
            EventKind::TaskFinished => "task_finished",
        }
    }

    /// Incremental events are budgeted separately from everything else.
    pub fn is_incremental(&self) -> bool {
        matches!(self, EventKind::TextDelta)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw events ─────────────────────────────────────────────────

/// An unwrapped progress event as produced by the loop and the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: Value,
}

impl RawEvent {
    pub fn new(kind: EventKind, content: Value) -> Self {
        Self { kind, content }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(EventKind::Text, Value::String(text.into()))
    }

    pub fn text_delta(delta: impl Into<String>) -> Self {
        Self::new(EventKind::TextDelta, Value::String(delta.into()))
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, Value::String(message.into()))
    }

    pub fn tool_use(tool: &str, input: &Value, id: Option<&str>) -> Self {
        Self::new(
            EventKind::ToolUse,
            json!({ "tool": tool, "input": input, "id": id }),
        )
    }

    pub fn tool_result(tool_use_id: &str, tool: &str, result: &str, is_error: bool) -> Self {
        Self::new(
            EventKind::ToolResult,
            json!({
                "tool_use_id": tool_use_id,
                "tool": tool,
                "result": result,
                "is_error": is_error,
            }),
        )
    }

    pub fn result(result: &RunResult) -> Self {
        Self::new(
            EventKind::Result,
            serde_json::to_value(result).unwrap_or(Value::Null),
        )
    }

    /// String payload, for `text`, `text_delta`, and `error` events.
    pub fn as_text(&self) -> Option<&str> {
        self.content.as_str()
    }

    /// Invocation id of a `tool_use` event.
    pub fn tool_use_id(&self) -> Option<&str> {
        match self.kind {
            EventKind::ToolUse => self.content["id"].as_str(),
            _ => None,
        }
    }

    /// Decoded payload of a terminal `result` event.
    pub fn run_result(&self) -> Option<RunResult> {
        match self.kind {
            EventKind::Result => serde_json::from_value(self.content.clone()).ok(),
            _ => None,
        }
    }
}

// ── Terminal result ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSubtype {
    Completed,
    Error,
    Aborted,
}

impl ResultSubtype {
    pub fn is_failure(&self) -> bool {
        !matches!(self, ResultSubtype::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResultSubtype::Completed => "completed",
            ResultSubtype::Error => "error",
            ResultSubtype::Aborted => "aborted",
        }
    }
}

/// Payload of the terminal `result` event of a reasoning run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub subtype: ResultSubtype,
    pub stop_reason: Option<String>,
    pub final_text: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(default)]
    pub usage: Option<Value>,
}

impl RunResult {
    /// `stop_reason` is the model's reason for ending its last turn.
    pub fn completed(final_text: Option<String>, stop_reason: impl Into<String>) -> Self {
        Self {
            subtype: ResultSubtype::Completed,
            stop_reason: Some(stop_reason.into()),
            final_text,
            error_message: None,
            cost_usd: 0.0,
            usage: None,
        }
    }

    pub fn failed(subtype: ResultSubtype, error_message: impl Into<String>) -> Self {
        Self {
            subtype,
            stop_reason: Some(subtype.as_str().into()),
            final_text: None,
            error_message: Some(error_message.into()),
            cost_usd: 0.0,
            usage: None,
        }
    }
}

// ── Wire envelope ──────────────────────────────────────────────

/// The unit streamed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub seq: u64,
    /// ISO-8601 timestamp.
    pub ts: String,
    /// Correlation id shared by every event of one run.
    pub trace_id: String,
    pub content: Value,
}

impl Event {
    pub fn wrap(raw: RawEvent, seq: u64, trace_id: &str) -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(16);
        Self {
            id,
            kind: raw.kind,
            seq,
            ts: format_timestamp(&Utc::now()),
            trace_id: trace_id.to_string(),
            content: raw.content,
        }
    }
}

// ── Traces ─────────────────────────────────────────────────────

/// One recorded step of a task or drone run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub content: Value,
    pub timestamp: String,
}

impl TraceEvent {
    pub fn record(raw: &RawEvent) -> Self {
        Self {
            kind: raw.kind,
            content: raw.content.clone(),
            timestamp: format_timestamp(&Utc::now()),
        }
    }
}

/// The ordered log of a task or drone run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub mind_id: String,
    /// Task id or drone id, depending on which table the trace came from.
    pub run_id: String,
    pub events: Vec<TraceEvent>,
}
