//! Mock LLM provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::provider::*;
use mind_core::{MindError, Result};

/// A mock LLM provider that replays queued responses in order.
///
/// # Example
/// ```
/// use mind_llm::mock::MockProvider;
/// let provider = MockProvider::new("test")
///     .with_response("Hello, world!");
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    /// Every request received, for assertions in tests.
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A tool call inside a mock response.
#[derive(Debug, Clone)]
pub struct MockToolCall {
    pub id: Option<String>,
    pub name: String,
    pub input: Value,
}

/// A pre-configured response from the mock provider.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub text: String,
    pub thinking: Option<String>,
    pub tool_calls: Vec<MockToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    /// Sent as a [`StreamChunk::Error`] instead of any content.
    pub error: Option<String>,
    /// Returned as an `Err` from `stream()` itself.
    pub connect_error: Option<String>,
    /// Close the stream without a `Done` chunk.
    pub truncated: bool,
}

impl Default for MockResponse {
    fn default() -> Self {
        Self {
            text: String::new(),
            thinking: None,
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: Usage {
                input_tokens: 100,
                output_tokens: 50,
                estimated_cost_usd: 0.001,
            },
            error: None,
            connect_error: None,
            truncated: false,
        }
    }
}

impl MockResponse {
    /// Create a text response.
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    /// Create a mid-stream error response.
    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }

    /// Add a tool call to this response.
    pub fn with_tool_call(mut self, id: Option<&str>, name: &str, input: Value) -> Self {
        self.tool_calls.push(MockToolCall {
            id: id.map(str::to_string),
            name: name.to_string(),
            input,
        });
        self.stop_reason = StopReason::ToolUse;
        self
    }

    pub fn with_thinking(mut self, thinking: &str) -> Self {
        self.thinking = Some(thinking.to_string());
        self
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push_back(MockResponse::text(text));
        self
    }

    /// Queue a single tool call response with a generated id.
    pub fn with_tool_call(self, name: &str, args: Value) -> Self {
        let id = format!("call_{}", uuid::Uuid::new_v4().simple());
        self.responses
            .lock()
            .push_back(MockResponse::default().with_tool_call(Some(&id), name, args));
        self
    }

    /// Queue a mid-stream error response.
    pub fn with_error(self, error: &str) -> Self {
        self.responses.lock().push_back(MockResponse::error(error));
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push_back(resp);
        self
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Arc<Mutex<Vec<LlmRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Pop the next queued response, or return a default "no response queued" message.
    fn next_response(&self) -> MockResponse {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| MockResponse::text("(mock: no more queued responses)"))
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn models(&self) -> Vec<String> {
        vec!["mock/test-model".to_string()]
    }

    async fn stream(&self, request: &LlmRequest) -> Result<mpsc::Receiver<StreamChunk>> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(error) = mock.connect_error {
            return Err(MindError::Transport(error));
        }

        let (tx, rx) = mpsc::channel(64);

        if let Some(error) = mock.error {
            tokio::spawn(async move {
                let _ = tx.send(StreamChunk::Error(error)).await;
            });
            return Ok(rx);
        }

        tokio::spawn(async move {
            if let Some(thinking) = mock.thinking {
                let _ = tx.send(StreamChunk::Thinking(thinking)).await;
            }

            // Word-sized deltas that concatenate back to the exact text.
            for piece in mock.text.split_inclusive(' ') {
                let _ = tx.send(StreamChunk::TextDelta(piece.to_string())).await;
            }

            for tc in mock.tool_calls {
                let _ = tx
                    .send(StreamChunk::ToolCall {
                        id: tc.id,
                        name: tc.name,
                        input: tc.input,
                    })
                    .await;
            }

            let _ = tx.send(StreamChunk::Usage(mock.usage)).await;

            if !mock.truncated {
                let _ = tx.send(StreamChunk::Done(mock.stop_reason)).await;
            }
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mind_core::Message;

    fn request() -> LlmRequest {
        LlmRequest {
            model: "test".into(),
            messages: vec![Message::user("hello")],
            tools: vec![],
            system: Some("be nice".into()),
            max_tokens: 100,
            temperature: 0.2,
        }
    }

    async fn collect(provider: &MockProvider) -> Vec<StreamChunk> {
        let mut rx = provider.stream(&request()).await.unwrap();
        let mut chunks = vec![];
        while let Some(chunk) = rx.recv().await {
            chunks.push(chunk);
        }
        chunks
    }

    #[tokio::test]
    async fn test_mock_streaming_text_reassembles() {
        let provider = MockProvider::new("mock").with_response("Hello  world again");
        let chunks = collect(&provider).await;
        let text: String = chunks
            .iter()
            .filter_map(|c| match c {
                StreamChunk::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello  world again");
        assert!(matches!(
            chunks.last().unwrap(),
            StreamChunk::Done(StopReason::EndTurn)
        ));
    }

    #[tokio::test]
    async fn test_mock_tool_call() {
        let provider = MockProvider::new("mock")
            .with_tool_call("run_command", serde_json::json!({"command": "ls"}));
        let chunks = collect(&provider).await;
        let call = chunks
            .iter()
            .find_map(|c| match c {
                StreamChunk::ToolCall { id, name, .. } => Some((id.clone(), name.clone())),
                _ => None,
            })
            .unwrap();
        assert!(call.0.unwrap().starts_with("call_"));
        assert_eq!(call.1, "run_command");
        assert!(matches!(
            chunks.last().unwrap(),
            StreamChunk::Done(StopReason::ToolUse)
        ));
    }

    #[tokio::test]
    async fn test_mock_error_chunk() {
        let provider = MockProvider::new("mock").with_error("HTTP 429: rate limited");
        let chunks = collect(&provider).await;
        assert_eq!(
            chunks,
            vec![StreamChunk::Error("HTTP 429: rate limited".into())]
        );
    }

    #[tokio::test]
    async fn test_mock_connect_error() {
        let provider = MockProvider::new("mock").with_mock_response(MockResponse {
            connect_error: Some("connection refused".into()),
            ..Default::default()
        });
        let err = provider.stream(&request()).await.unwrap_err();
        assert!(err.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_mock_truncated_stream_has_no_done() {
        let provider = MockProvider::new("mock").with_mock_response(MockResponse {
            truncated: true,
            ..MockResponse::text("partial")
        });
        let chunks = collect(&provider).await;
        assert!(!chunks.iter().any(|c| matches!(c, StreamChunk::Done(_))));
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let provider = MockProvider::new("mock").with_response("ok");
        let _ = collect(&provider).await;
        let recorded = provider.recorded_requests();
        let recorded = recorded.lock();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].system, Some("be nice".into()));
    }

    #[tokio::test]
    async fn test_mock_multiple_responses_in_order() {
        let provider = MockProvider::new("mock")
            .with_response("first")
            .with_response("second");
        let first = collect(&provider).await;
        let second = collect(&provider).await;
        let third = collect(&provider).await;
        assert_eq!(first[0], StreamChunk::TextDelta("first".into()));
        assert_eq!(second[0], StreamChunk::TextDelta("second".into()));
        assert!(matches!(&third[0], StreamChunk::TextDelta(t) if t.starts_with("(mock:")));
    }
}
