use async_trait::async_trait;
use mind_core::{Message, Result, Tool};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request to an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// Provider-specific model name, e.g. "claude-sonnet-4-20250514".
    pub model: String,
    /// Conversation history.
    pub messages: Vec<Message>,
    /// Available tools.
    pub tools: Vec<Tool>,
    /// System prompt, sent separately from the messages.
    pub system: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
    StopSequence,
}

impl StopReason {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "tool_use" => StopReason::ToolUse,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            _ => StopReason::EndTurn,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
            StopReason::StopSequence => "stop_sequence",
        }
    }
}

/// A chunk of a streaming response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Reasoning text.
    Thinking(String),
    /// Content text delta.
    TextDelta(String),
    /// A complete tool invocation request.
    ///
    /// Some providers omit the id, and some deliver `input` as a JSON
    /// string instead of an object; the loop normalises both.
    ToolCall {
        id: Option<String>,
        name: String,
        input: Value,
    },
    /// Usage stats, sent near the end of the stream.
    Usage(Usage),
    /// Stream finished cleanly.
    Done(StopReason),
    /// The provider failed mid-stream.
    Error(String),
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Estimated cost in USD (computed by the provider adapter).
    pub estimated_cost_usd: f64,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    pub fn merge(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.estimated_cost_usd += other.estimated_cost_usd;
    }
}

/// Trait implemented by each LLM provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name, e.g. "anthropic".
    fn name(&self) -> &str;

    /// List available models.
    fn models(&self) -> Vec<String>;

    /// Send a streaming request. Returns a receiver for chunks.
    ///
    /// An `Err` here, a [`StreamChunk::Error`], or a channel that closes
    /// before [`StreamChunk::Done`] all count as transport failures.
    async fn stream(&self, request: &LlmRequest)
    -> Result<tokio::sync::mpsc::Receiver<StreamChunk>>;

    /// Check if this provider is usable.
    async fn health_check(&self) -> Result<()>;
}
