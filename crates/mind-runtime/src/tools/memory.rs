use async_trait::async_trait;
use mind_core::{MemoryEntry, Result, Tool, ToolCall, ToolExecutor, ToolResult};
use mind_memory::MemoryStore;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};

/// Most entries one `memory_search` call may return.
pub const MAX_SEARCH_RESULTS: u64 = 50;

/// `memory_save` and `memory_search`, scoped to one Mind.
pub struct MemoryTools {
    store: MemoryStore,
    mind_id: String,
    max_saves: u32,
    saves: AtomicU32,
}

impl MemoryTools {
    pub fn new(store: MemoryStore, mind_id: String, max_saves: u32) -> Self {
        Self {
            store,
            mind_id,
            max_saves,
            saves: AtomicU32::new(0),
        }
    }

    fn save(&self, call: &ToolCall) -> Result<ToolResult> {
        let content = call.str_arg("content")?.trim();
        if content.is_empty() {
            return Ok(ToolResult::error(call, "content must not be empty"));
        }
        if self.saves.fetch_add(1, Ordering::SeqCst) >= self.max_saves {
            return Ok(ToolResult::error(
                call,
                format!("memory_save limit reached ({} per run)", self.max_saves),
            ));
        }
        let keywords: Vec<String> = call.arguments["relevance_keywords"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let mut entry = MemoryEntry::new(&self.mind_id, content).with_keywords(keywords);
        if let Some(category) = call.opt_str_arg("category").filter(|c| !c.trim().is_empty()) {
            entry = entry.with_category(category.trim());
        }
        self.store.save(&entry)?;
        Ok(ToolResult::ok(call, format!("Saved memory: {}", entry.id)))
    }

    fn search(&self, call: &ToolCall) -> Result<ToolResult> {
        let query = call.str_arg("query")?;
        let top_k = call.u64_arg("top_k").unwrap_or(5).clamp(1, MAX_SEARCH_RESULTS) as usize;
        let hits = self.store.search(&self.mind_id, query, top_k)?;
        let items: Vec<_> = hits
            .iter()
            .map(|m| {
                json!({
                    "id": m.id,
                    "content": m.content,
                    "category": m.category,
                    "relevance_keywords": m.relevance_keywords,
                    "created_at": m.created_at,
                })
            })
            .collect();
        Ok(ToolResult::ok(call, serde_json::to_string_pretty(&items)?))
    }
}

#[async_trait]
impl ToolExecutor for MemoryTools {
    fn tools(&self) -> Vec<Tool> {
        vec![
            Tool::new(
                "memory_save",
                "Save a durable memory that future runs can retrieve.",
                json!({
                    "content": {"type": "string"},
                    "category": {"type": "string"},
                    "relevance_keywords": {"type": "array", "items": {"type": "string"}}
                }),
                &["content"],
            ),
            Tool::new(
                "memory_search",
                "Search this Mind's long-term memory.",
                json!({
                    "query": {"type": "string"},
                    "top_k": {"type": "integer", "default": 5}
                }),
                &["query"],
            ),
        ]
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        match call.tool_name.as_str() {
            "memory_save" => self.save(call),
            _ => self.search(call),
        }
    }
}
