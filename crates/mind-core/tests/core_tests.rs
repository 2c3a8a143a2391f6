#[cfg(test)]
mod tests {
    use mind_core::*;
    use serde_json::json;

    // ── Message tests ──────────────────────────────────────────

    #[test]
    fn test_user_message_constructor() {
        let msg = Message::user("hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text_content(), "hello");
        assert!(msg.tool_calls().is_empty());
    }

    #[test]
    fn test_assistant_segments_keep_order() {
        let msg = Message::assistant(vec![
            MessageContent::Thinking {
                thinking: "plan".into(),
            },
            MessageContent::Text {
                text: "Reading".into(),
            },
            MessageContent::ToolCall {
                id: "t1".into(),
                name: "read_file".into(),
                input: json!({"path": "a.txt"}),
            },
            MessageContent::Text {
                text: "done".into(),
            },
        ]);
        assert_eq!(msg.text_content(), "Reading\ndone");
        let calls = msg.tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "read_file");
        assert_eq!(calls[0].arguments["path"], "a.txt");
    }

    #[test]
    fn test_segment_serde_tag() {
        let seg = MessageContent::ToolResult {
            tool_call_id: "x".into(),
            content: "ok".into(),
            is_error: false,
        };
        let value = serde_json::to_value(&seg).unwrap();
        assert_eq!(value["type"], "tool_result");
    }

    // ── Tool argument tests ────────────────────────────────────

    #[test]
    fn test_tool_call_args() {
        let call = ToolCall {
            id: "1".into(),
            tool_name: "run_command".into(),
            arguments: json!({"command": "ls", "timeout": "15", "top_k": 3}),
        };
        assert_eq!(call.str_arg("command").unwrap(), "ls");
        assert_eq!(call.u64_arg("timeout"), Some(15));
        assert_eq!(call.u64_arg("top_k"), Some(3));
        assert!(call.u64_arg("missing").is_none());
        let err = call.str_arg("path").unwrap_err();
        assert!(err.to_string().contains("missing 'path' argument"));
    }

    #[test]
    fn test_tool_schema_shape() {
        let tool = Tool::new(
            "read_file",
            "Read a file",
            json!({"path": {"type": "string"}}),
            &["path"],
        );
        assert_eq!(tool.parameters["type"], "object");
        assert_eq!(tool.parameters["required"][0], "path");
    }

    // ── Event tests ────────────────────────────────────────────

    #[test]
    fn test_event_kind_wire_names() {
        let raw = RawEvent::new(EventKind::ImplicitFeedbackInferred, json!({}));
        let value = serde_json::to_value(&raw).unwrap();
        assert_eq!(value["type"], "implicit_feedback_inferred");
        assert_eq!(EventKind::TaskFinished.to_string(), "task_finished");
        assert!(EventKind::TextDelta.is_incremental());
        assert!(!EventKind::Text.is_incremental());
    }

    #[test]
    fn test_result_event_roundtrip() {
        let result = RunResult::failed(ResultSubtype::Aborted, "Max turns reached (3)");
        let raw = RawEvent::result(&result);
        assert_eq!(raw.content["subtype"], "aborted");
        assert_eq!(raw.content["stop_reason"], "aborted");
        let decoded = raw.run_result().unwrap();
        assert_eq!(decoded, result);
        assert!(decoded.subtype.is_failure());
    }

    #[test]
    fn test_tool_use_id_accessor() {
        let raw = RawEvent::tool_use("read_file", &json!({}), Some("abc"));
        assert_eq!(raw.tool_use_id(), Some("abc"));
        assert!(RawEvent::text("x").tool_use_id().is_none());
    }

    #[test]
    fn test_event_envelope_fields() {
        let event = Event::wrap(RawEvent::text("hi"), 4, "trace-1");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["seq"], 4);
        assert_eq!(value["trace_id"], "trace-1");
        assert_eq!(value["content"], "hi");
        assert_eq!(event.id.len(), 16);
        assert!(event.ts.ends_with('Z'));
    }

    // ── Type tests ─────────────────────────────────────────────

    #[test]
    fn test_task_status_parse() {
        assert_eq!("failed".parse::<TaskStatus>().unwrap(), TaskStatus::Failed);
        assert!("unknown".parse::<TaskStatus>().is_err());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_new_ids_are_short_and_distinct() {
        let a = new_id();
        let b = new_id();
        assert_eq!(a.len(), 12);
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamp_fixed_width() {
        let ts = chrono::Utc::now();
        let formatted = format_timestamp(&ts);
        assert_eq!(formatted.len(), "2024-01-01T00:00:00.000000Z".len());
    }

    #[test]
    fn test_charter_defaults_non_empty() {
        let mind = Mind::new("Ada");
        assert!(!mind.charter.mission.is_empty());
        assert!(!mind.charter.operating_principles.is_empty());
    }

    #[test]
    fn test_memory_entry_builders() {
        let entry = MemoryEntry::new("m1", "content")
            .with_category(category::USER_FEEDBACK)
            .with_keywords(["a", "b"]);
        assert_eq!(entry.category.as_deref(), Some("user_feedback"));
        assert_eq!(entry.relevance_keywords, vec!["a", "b"]);
    }

    // ── Error tests ────────────────────────────────────────────

    #[test]
    fn test_error_display() {
        let err = MindError::PathEscape("../etc/passwd".into());
        assert!(err.to_string().contains("escapes workspace"));
        let err = MindError::tool("edit_file", "old_text not found");
        assert!(err.to_string().contains("edit_file"));
    }
}
