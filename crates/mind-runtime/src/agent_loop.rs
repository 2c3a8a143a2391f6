//! The turn-based reasoning loop.
//!
//! Each turn streams one model response, splits it into ordered segments,
//! executes the requested tools, and feeds the results back. Every run ends
//! with exactly one `result` event.

use async_trait::async_trait;
use mind_core::{
    Message, MessageContent, RawEvent, Result, ResultSubtype, RunResult, ToolCall,
};
use mind_llm::{LlmProvider, LlmRequest, StopReason, StreamChunk, Usage};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tools::ToolRegistry;

/// Inputs for one run of an [`AgentRunner`].
pub struct RunRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub tools: Arc<ToolRegistry>,
    pub max_turns: u32,
    pub cancel: CancellationToken,
}

/// Something that turns a prompt into a stream of raw events.
///
/// The pipeline and drones depend on this seam so tests can script runs.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run to completion, sending events as they happen. An `Err` means the
    /// run died without producing its own `result` event.
    async fn run(&self, request: RunRequest, events: mpsc::UnboundedSender<RawEvent>)
    -> Result<()>;
}

/// [`AgentRunner`] backed by a streaming [`LlmProvider`].
pub struct ReasoningLoop {
    provider: Arc<dyn LlmProvider>,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ReasoningLoop {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        model: impl Into<String>,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            temperature,
        }
    }
}

/// Event sink with per-run dedup of tool invocations and error texts.
struct Emitter {
    tx: mpsc::UnboundedSender<RawEvent>,
    seen_tool_ids: HashSet<String>,
    seen_errors: HashSet<String>,
}

impl Emitter {
    fn new(tx: mpsc::UnboundedSender<RawEvent>) -> Self {
        Self {
            tx,
            seen_tool_ids: HashSet::new(),
            seen_errors: HashSet::new(),
        }
    }

    fn send(&self, event: RawEvent) {
        // A closed receiver means the consumer is gone; the cancel token stops us.
        let _ = self.tx.send(event);
    }

    /// Returns false for an id that was already announced.
    fn tool_use(&mut self, call: &ToolCall) -> bool {
        if !self.seen_tool_ids.insert(call.id.clone()) {
            return false;
        }
        self.send(RawEvent::tool_use(
            &call.tool_name,
            &call.arguments,
            Some(&call.id),
        ));
        true
    }

    fn error(&mut self, message: &str) {
        if self.seen_errors.insert(message.trim().to_string()) {
            self.send(RawEvent::error(message));
        }
    }

    fn finish(&mut self, mut result: RunResult, usage: &Usage) {
        result.cost_usd = usage.estimated_cost_usd;
        result.usage = serde_json::to_value(usage).ok();
        self.send(RawEvent::result(&result));
    }

    /// Transport failures end the run with subtype `error`.
    fn transport_failure(&mut self, message: &str, usage: &Usage) {
        warn!(error = %message, "model transport failure");
        self.error(message);
        self.finish(RunResult::failed(ResultSubtype::Error, message), usage);
    }

    fn cancelled(&mut self, usage: &Usage) {
        info!("run cancelled");
        self.finish(
            RunResult::failed(ResultSubtype::Aborted, "Run cancelled"),
            usage,
        );
    }
}

/// Accumulates streamed chunks into ordered message segments.
#[derive(Default)]
struct SegmentBuilder {
    segments: Vec<MessageContent>,
    text: String,
    thinking: String,
}

impl SegmentBuilder {
    fn flush(&mut self) {
        if !self.thinking.is_empty() {
            self.segments.push(MessageContent::Thinking {
                thinking: std::mem::take(&mut self.thinking),
            });
        }
        if !self.text.is_empty() {
            self.segments.push(MessageContent::Text {
                text: std::mem::take(&mut self.text),
            });
        }
    }

    fn push_text(&mut self, delta: &str) {
        if !self.thinking.is_empty() {
            self.flush();
        }
        self.text.push_str(delta);
    }

    fn push_thinking(&mut self, delta: &str) {
        if !self.text.is_empty() {
            self.flush();
        }
        self.thinking.push_str(delta);
    }

    fn push_tool_call(&mut self, call: &ToolCall) {
        self.flush();
        self.segments.push(MessageContent::ToolCall {
            id: call.id.clone(),
            name: call.tool_name.clone(),
            input: call.arguments.clone(),
        });
    }

    fn finish(mut self) -> Vec<MessageContent> {
        self.flush();
        self.segments
    }
}

/// Decode string-encoded input; keep undecodable text under `raw`.
fn normalize_input(input: Value) -> Value {
    match input {
        Value::String(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| json!({ "raw": raw })),
        Value::Null => json!({}),
        other => other,
    }
}

enum TurnEnd {
    Done(StopReason),
    Cancelled,
    Failed(String),
}

#[async_trait]
impl AgentRunner for ReasoningLoop {
    async fn run(
        &self,
        request: RunRequest,
        events: mpsc::UnboundedSender<RawEvent>,
    ) -> Result<()> {
        let mut emitter = Emitter::new(events);
        let tools = request.tools.tools();
        let mut messages = vec![Message::user(&request.prompt)];
        let mut usage = Usage::default();
        let mut last_text: Option<String> = None;

        for turn in 0..request.max_turns {
            if request.cancel.is_cancelled() {
                emitter.cancelled(&usage);
                return Ok(());
            }

            let llm_request = LlmRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                system: Some(request.system_prompt.clone()),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };
            debug!(turn, messages = messages.len(), "calling model");

            let mut rx = match self.provider.stream(&llm_request).await {
                Ok(rx) => rx,
                Err(e) => {
                    emitter.transport_failure(&e.to_string(), &usage);
                    return Ok(());
                }
            };

            let mut builder = SegmentBuilder::default();
            let mut calls: Vec<ToolCall> = Vec::new();
            let mut call_index = 0usize;

            let end = loop {
                let chunk = tokio::select! {
                    chunk = rx.recv() => chunk,
                    _ = request.cancel.cancelled() => break TurnEnd::Cancelled,
                };
                match chunk {
                    Some(StreamChunk::TextDelta(delta)) => {
                        builder.push_text(&delta);
                        emitter.send(RawEvent::text_delta(delta));
                    }
                    Some(StreamChunk::Thinking(delta)) => builder.push_thinking(&delta),
                    Some(StreamChunk::ToolCall { id, name, input }) => {
                        let id = id
                            .filter(|id| !id.is_empty())
                            .unwrap_or_else(|| format!("{turn}_{call_index}"));
                        call_index += 1;
                        let call = ToolCall {
                            id,
                            tool_name: name,
                            arguments: normalize_input(input),
                        };
                        if emitter.tool_use(&call) {
                            builder.push_tool_call(&call);
                            calls.push(call);
                        } else {
                            debug!(id = %call.id, "suppressed duplicate tool invocation");
                        }
                    }
                    Some(StreamChunk::Usage(u)) => usage.merge(&u),
                    Some(StreamChunk::Done(reason)) => break TurnEnd::Done(reason),
                    Some(StreamChunk::Error(e)) => break TurnEnd::Failed(e),
                    None => break TurnEnd::Failed("Model stream ended unexpectedly".into()),
                }
            };

            let stop_reason = match end {
                TurnEnd::Done(reason) => reason,
                TurnEnd::Cancelled => {
                    emitter.cancelled(&usage);
                    return Ok(());
                }
                TurnEnd::Failed(message) => {
                    emitter.transport_failure(&message, &usage);
                    return Ok(());
                }
            };

            let segments = builder.finish();
            for segment in &segments {
                if let MessageContent::Text { text } = segment {
                    if !text.trim().is_empty() {
                        emitter.send(RawEvent::text(text.clone()));
                        last_text = Some(text.clone());
                    }
                }
            }
            messages.push(Message::assistant(segments));

            if calls.is_empty() {
                info!(turn, "model finished without tool calls");
                emitter.finish(
                    RunResult::completed(last_text, stop_reason.as_str()),
                    &usage,
                );
                return Ok(());
            }

            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                let result = request.tools.execute(call).await;
                emitter.send(RawEvent::tool_result(
                    &call.id,
                    &call.tool_name,
                    &result.content,
                    result.is_error,
                ));
                if result.is_error {
                    let message = if result.content.trim().is_empty() {
                        format!("Tool failed: {}", call.tool_name)
                    } else {
                        result.content.clone()
                    };
                    emitter.error(&message);
                }
                results.push(MessageContent::ToolResult {
                    tool_call_id: result.tool_call_id,
                    content: result.content,
                    is_error: result.is_error,
                });
                if request.cancel.is_cancelled() {
                    emitter.cancelled(&usage);
                    return Ok(());
                }
            }
            messages.push(Message::tool_results(results));
        }

        let message = format!(
            "Max turns reached ({}). Aborting run.",
            request.max_turns
        );
        warn!(max_turns = request.max_turns, "turn budget exhausted");
        emitter.error(&message);
        emitter.finish(RunResult::failed(ResultSubtype::Aborted, message), &usage);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_input() {
        assert_eq!(normalize_input(json!("{\"a\":1}")), json!({"a": 1}));
        assert_eq!(normalize_input(json!("not json")), json!({"raw": "not json"}));
        assert_eq!(normalize_input(Value::Null), json!({}));
        assert_eq!(normalize_input(json!({"b": 2})), json!({"b": 2}));
    }

    #[test]
    fn test_segment_builder_keeps_order() {
        let mut builder = SegmentBuilder::default();
        builder.push_thinking("plan ");
        builder.push_thinking("more");
        builder.push_text("Hello ");
        builder.push_text("there");
        builder.push_tool_call(&ToolCall {
            id: "1".into(),
            tool_name: "read_file".into(),
            arguments: json!({}),
        });
        builder.push_text("after");
        let segments = builder.finish();
        assert_eq!(segments.len(), 4);
        assert!(matches!(&segments[0], MessageContent::Thinking { thinking } if thinking == "plan more"));
        assert!(matches!(&segments[1], MessageContent::Text { text } if text == "Hello there"));
        assert!(matches!(&segments[2], MessageContent::ToolCall { .. }));
        assert!(matches!(&segments[3], MessageContent::Text { text } if text == "after"));
    }
}
