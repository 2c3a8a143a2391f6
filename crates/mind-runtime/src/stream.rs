use futures::{Stream, StreamExt};
use mind_core::{Event, EventKind, RawEvent};
use std::collections::HashSet;
use tracing::debug;

/// Assigns `seq`, `id`, `ts` and `trace_id` to raw events.
///
/// `tool_use` events are passed at most once per invocation id and `error`
/// events at most once per trimmed message. Suppressed events do not consume
/// a sequence number.
#[derive(Debug)]
pub struct EventStream {
    trace_id: String,
    next_seq: u64,
    seen_tool_ids: HashSet<String>,
    seen_errors: HashSet<String>,
}

impl EventStream {
    pub fn new(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            next_seq: 0,
            seen_tool_ids: HashSet::new(),
            seen_errors: HashSet::new(),
        }
    }

    /// A stream with a fresh random correlation id.
    pub fn with_random_trace_id() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// Wrap one event, or `None` if it duplicates an earlier one.
    pub fn wrap(&mut self, raw: RawEvent) -> Option<Event> {
        match raw.kind {
            EventKind::ToolUse => {
                if let Some(id) = raw.tool_use_id() {
                    if !self.seen_tool_ids.insert(id.to_string()) {
                        debug!(id, "dropping duplicate tool_use");
                        return None;
                    }
                }
            }
            EventKind::Error => {
                let key = match &raw.content {
                    serde_json::Value::String(s) => s.trim().to_string(),
                    other => other.to_string(),
                };
                if !self.seen_errors.insert(key) {
                    debug!("dropping duplicate error");
                    return None;
                }
            }
            _ => {}
        }
        let event = Event::wrap(raw, self.next_seq, &self.trace_id);
        self.next_seq += 1;
        Some(event)
    }

    /// Apply [`wrap`](Self::wrap) to every event of `raw`.
    pub fn into_stream<S>(mut self, raw: S) -> impl Stream<Item = Event> + Send
    where
        S: Stream<Item = RawEvent> + Send,
    {
        async_stream::stream! {
            let mut raw = std::pin::pin!(raw);
            while let Some(event) = raw.next().await {
                if let Some(wrapped) = self.wrap(event) {
                    yield wrapped;
                }
            }
        }
    }
}
