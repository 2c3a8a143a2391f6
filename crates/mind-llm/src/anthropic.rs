use async_trait::async_trait;
use futures::StreamExt;
use mind_core::{MessageContent, MindError, Result, Role};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::provider::*;

const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API provider (streaming only).
pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
    timeout_secs: u64,
}

impl AnthropicProvider {
    pub fn new(api_key: String, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MindError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            base_url: "https://api.anthropic.com/v1".into(),
            timeout_secs,
        })
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn build_request_body(&self, request: &LlmRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter_map(|msg| {
                let blocks: Vec<Value> = msg
                    .content
                    .iter()
                    .filter_map(|segment| match segment {
                        MessageContent::Text { text } if !text.is_empty() => {
                            Some(json!({ "type": "text", "text": text }))
                        }
                        MessageContent::Text { .. } => None,
                        // Signed thinking blocks cannot be replayed without their signature.
                        MessageContent::Thinking { .. } => None,
                        MessageContent::ToolCall { id, name, input } => Some(json!({
                            "type": "tool_use",
                            "id": id,
                            "name": name,
                            "input": input,
                        })),
                        MessageContent::ToolResult {
                            tool_call_id,
                            content,
                            is_error,
                        } => Some(json!({
                            "type": "tool_result",
                            "tool_use_id": tool_call_id,
                            "content": content,
                            "is_error": is_error,
                        })),
                    })
                    .collect();
                if blocks.is_empty() {
                    return None;
                }
                // Tool results travel back as user turns.
                let role = match msg.role {
                    Role::Assistant => "assistant",
                    Role::User | Role::Tool => "user",
                };
                Some(json!({ "role": role, "content": blocks }))
            })
            .collect();

        let mut body = json!({
            "model": &request.model,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "messages": messages,
            "stream": true,
        });

        if let Some(ref system) = request.system {
            body["system"] = json!(system);
        }

        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "input_schema": t.parameters,
                    })
                })
                .collect();
            body["tools"] = json!(tools);
        }

        body
    }

    fn map_send_error(&self, e: reqwest::Error) -> MindError {
        if e.is_timeout() {
            MindError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            MindError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "claude-opus-4-20250514".into(),
            "claude-sonnet-4-20250514".into(),
            "claude-3-5-haiku-latest".into(),
        ]
    }

    async fn stream(&self, request: &LlmRequest) -> Result<mpsc::Receiver<StreamChunk>> {
        let body = self.build_request_body(request);
        debug!(model = %request.model, messages = request.messages.len(), "sending Anthropic API request");

        let resp = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MindError::Transport(format!("HTTP {status}: {text}")));
        }

        let (tx, rx) = mpsc::channel(256);
        let model = request.model.clone();

        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut buffer = String::new();
            let mut state = SseState::new(model);

            while let Some(chunk_result) = stream.next().await {
                let bytes = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "Anthropic stream interrupted");
                        let _ = tx.send(StreamChunk::Error(e.to_string())).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete SSE lines
                while let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].trim().to_string();
                    buffer.drain(..=newline_pos);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<Value>(data.trim()) else {
                        continue;
                    };
                    for chunk in state.handle(&event) {
                        if tx.send(chunk).await.is_err() {
                            return;
                        }
                    }
                    if state.finished {
                        return;
                    }
                }
            }
            // Connection closed without message_stop: the receiver sees no Done.
            debug!("Anthropic stream ended early");
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<()> {
        info!("checking Anthropic API configuration");
        if self.api_key.is_empty() {
            return Err(MindError::Config("ANTHROPIC_API_KEY not set".into()));
        }
        Ok(())
    }
}

/// Decodes Messages API server-sent events into stream chunks.
struct SseState {
    model: String,
    tool_id: Option<String>,
    tool_name: String,
    tool_input: String,
    in_tool_input: bool,
    input_tokens: u32,
    output_tokens: u32,
    stop_reason: StopReason,
    finished: bool,
}

impl SseState {
    fn new(model: String) -> Self {
        Self {
            model,
            tool_id: None,
            tool_name: String::new(),
            tool_input: String::new(),
            in_tool_input: false,
            input_tokens: 0,
            output_tokens: 0,
            stop_reason: StopReason::EndTurn,
            finished: false,
        }
    }

    fn handle(&mut self, event: &Value) -> Vec<StreamChunk> {
        match event["type"].as_str() {
            Some("message_start") => {
                if let Some(it) = event["message"]["usage"]["input_tokens"].as_u64() {
                    self.input_tokens = it as u32;
                }
                vec![]
            }
            Some("content_block_start") => {
                let block = &event["content_block"];
                if block["type"] == "tool_use" {
                    self.tool_id = block["id"]
                        .as_str()
                        .filter(|s| !s.is_empty())
                        .map(str::to_string);
                    self.tool_name = block["name"].as_str().unwrap_or("").to_string();
                    self.tool_input.clear();
                    self.in_tool_input = true;
                }
                vec![]
            }
            Some("content_block_delta") => {
                let delta = &event["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => delta["text"]
                        .as_str()
                        .map(|t| vec![StreamChunk::TextDelta(t.to_string())])
                        .unwrap_or_default(),
                    Some("thinking_delta") => delta["thinking"]
                        .as_str()
                        .map(|t| vec![StreamChunk::Thinking(t.to_string())])
                        .unwrap_or_default(),
                    Some("input_json_delta") => {
                        if let Some(partial) = delta["partial_json"].as_str() {
                            self.tool_input.push_str(partial);
                        }
                        vec![]
                    }
                    _ => vec![],
                }
            }
            Some("content_block_stop") if self.in_tool_input => {
                self.in_tool_input = false;
                // The loop decodes string input and keeps undecodable text under "raw".
                let input = if self.tool_input.trim().is_empty() {
                    json!({})
                } else {
                    Value::String(std::mem::take(&mut self.tool_input))
                };
                vec![StreamChunk::ToolCall {
                    id: self.tool_id.take(),
                    name: std::mem::take(&mut self.tool_name),
                    input,
                }]
            }
            Some("message_delta") => {
                if let Some(sr) = event["delta"]["stop_reason"].as_str() {
                    self.stop_reason = StopReason::parse(sr);
                }
                if let Some(ot) = event["usage"]["output_tokens"].as_u64() {
                    self.output_tokens = ot as u32;
                }
                vec![]
            }
            Some("message_stop") => {
                self.finished = true;
                vec![
                    StreamChunk::Usage(Usage {
                        input_tokens: self.input_tokens,
                        output_tokens: self.output_tokens,
                        estimated_cost_usd: estimate_anthropic_cost(
                            &self.model,
                            self.input_tokens,
                            self.output_tokens,
                        ),
                    }),
                    StreamChunk::Done(self.stop_reason),
                ]
            }
            Some("error") => {
                self.finished = true;
                let msg = event["error"]["message"].as_str().unwrap_or("unknown error");
                vec![StreamChunk::Error(msg.to_string())]
            }
            _ => vec![],
        }
    }
}

/// Estimate cost for Anthropic models (USD per 1M tokens).
fn estimate_anthropic_cost(model: &str, input_tokens: u32, output_tokens: u32) -> f64 {
    let (input_per_m, output_per_m) = match model {
        m if m.contains("opus") => (15.00, 75.00),
        m if m.contains("sonnet") => (3.00, 15.00),
        m if m.contains("haiku") => (0.80, 4.00),
        _ => (3.00, 15.00),
    };
    (input_tokens as f64 * input_per_m + output_tokens as f64 * output_per_m) / 1_000_000.0
}
