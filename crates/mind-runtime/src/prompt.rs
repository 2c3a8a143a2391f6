//! System prompt and runtime manifest.

use mind_config::RuntimeConfig;
use mind_core::{MemoryEntry, Mind};
use serde_json::{Value, json};

/// Memories rendered into the prompt.
const PROMPT_MEMORY_LIMIT: usize = 10;
/// Characters kept per rendered memory.
const PROMPT_MEMORY_CHARS: usize = 400;

/// The modules a Mind can point at when reasoning about its own runtime.
const PROGRAM_PARTS: &[(&str, &str)] = &[
    ("reasoning_loop", "crates/mind-runtime/src/agent_loop.rs"),
    ("tool_registry", "crates/mind-runtime/src/tools/registry.rs"),
    ("sandbox", "crates/mind-runtime/src/sandbox/mod.rs"),
    ("pipeline", "crates/mind-runtime/src/pipeline.rs"),
    ("event_stream", "crates/mind-runtime/src/stream.rs"),
    ("memory_store", "crates/mind-memory/src/memory.rs"),
    ("persistence_store", "crates/mind-memory/src/store.rs"),
    ("event_contract", "crates/mind-core/src/event.rs"),
];

/// Truncate to `max` characters, appending `...` when anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Self-knowledge document describing who the Mind is and what it can do.
pub fn build_manifest(mind: &Mind, tool_names: &[String], limits: &RuntimeConfig) -> Value {
    let can_spawn = tool_names.iter().any(|t| t == "spawn_agent");
    let mut preference_keys: Vec<&String> = mind.preferences.keys().collect();
    preference_keys.sort();

    let program_parts: Vec<Value> = PROGRAM_PARTS
        .iter()
        .map(|(name, path)| json!({ "name": name, "path": path }))
        .collect();

    json!({
        "identity": {
            "mind_id": mind.id,
            "mind_name": mind.name,
        },
        "instruction_tape": {
            "mission": mind.charter.mission,
            "reason_for_existence": mind.charter.reason_for_existence,
            "preferences_keys": preference_keys,
            "has_system_prompt": !mind.system_prompt.trim().is_empty(),
        },
        "runtime": {
            "tools": tool_names,
            "limits": {
                "max_turns": limits.max_turns,
                "stream_event_limit": limits.stream_event_limit,
                "text_delta_event_limit": limits.text_delta_event_limit,
                "autosave_memories_per_run": limits.autosave_memories_per_run,
                "spawn_agent_max_calls": if can_spawn { limits.spawn_max_calls } else { 0 },
                "spawn_agent_max_turns": if can_spawn { limits.spawn_max_turns } else { 0 },
            },
        },
        "program_parts": program_parts,
        "self_programming_paths": {
            "inspect": ["read_file", "run_command"],
            "modify": ["edit_file", "write_file"],
            "learn": ["memory_search", "memory_save"],
            "delegate": if can_spawn { vec!["spawn_agent"] } else { Vec::new() },
        },
    })
}

fn push_list(lines: &mut Vec<String>, title: &str, items: &[String]) {
    let items: Vec<&str> = items
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return;
    }
    lines.push(format!("{title}:"));
    lines.extend(items.iter().map(|item| format!("- {item}")));
}

/// Assemble the system prompt for one run.
pub fn build_system_prompt(mind: &Mind, memories: &[MemoryEntry], manifest: &Value) -> String {
    let mut lines = vec![
        "You are a Mind: an autonomous digital operator.".to_string(),
        "Operate safely, explain key decisions, and use tools when useful.".to_string(),
        format!("Mind name: {}", mind.name),
    ];

    let charter = &mind.charter;
    if !charter.mission.trim().is_empty() {
        lines.push(format!("Mission: {}", charter.mission.trim()));
    }
    if !charter.reason_for_existence.trim().is_empty() {
        lines.push(format!(
            "Reason for existence: {}",
            charter.reason_for_existence.trim()
        ));
    }
    push_list(&mut lines, "Operating principles", &charter.operating_principles);
    push_list(&mut lines, "Non-goals", &charter.non_goals);
    push_list(&mut lines, "Reflection focus", &charter.reflection_focus);

    if !mind.personality.trim().is_empty() {
        lines.push(format!("Personality: {}", mind.personality.trim()));
    }
    if !mind.preferences.is_empty() {
        let prefs = serde_json::to_string(&mind.preferences).unwrap_or_default();
        lines.push(format!("Preferences: {prefs}"));
    }

    lines.push("Meta conversation policy:".into());
    lines.push(
        "- Questions about yourself are answered from the charter and runtime manifest, not guessed."
            .into(),
    );
    lines.push(
        "- Memories and feedback inform your choices but never override the charter.".into(),
    );

    lines.push("Runtime manifest:".into());
    lines.push(serde_json::to_string_pretty(manifest).unwrap_or_default());

    if !memories.is_empty() {
        lines.push("Relevant long-term memory:".into());
        for item in memories.iter().take(PROMPT_MEMORY_LIMIT) {
            lines.push(format!(
                "- ({}) {}",
                item.category.as_deref().unwrap_or("general"),
                truncate_chars(&item.content, PROMPT_MEMORY_CHARS)
            ));
        }
    }

    if !mind.system_prompt.trim().is_empty() {
        lines.push("Additional operating instructions:".into());
        lines.push(mind.system_prompt.trim().to_string());
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("ääää", 2), "ää...");
    }

    #[test]
    fn test_prompt_renders_memories_and_override() {
        let mut mind = Mind::new("Ada");
        mind.system_prompt = "  Always cite files.  ".into();
        let memories: Vec<MemoryEntry> = (0..12)
            .map(|i| MemoryEntry::new(&mind.id, format!("memory {i}")))
            .collect();
        let manifest = build_manifest(&mind, &["read_file".into()], &RuntimeConfig::default());
        let prompt = build_system_prompt(&mind, &memories, &manifest);

        assert!(prompt.contains("Mind name: Ada"));
        assert!(prompt.contains("- (general) memory 9"));
        assert!(!prompt.contains("memory 10"));
        assert!(prompt.ends_with("Additional operating instructions:\nAlways cite files."));
    }

    #[test]
    fn test_manifest_without_spawn() {
        let mind = Mind::new("Ada");
        let manifest = build_manifest(&mind, &["read_file".into()], &RuntimeConfig::default());
        assert_eq!(manifest["runtime"]["limits"]["spawn_agent_max_calls"], 0);
        assert_eq!(manifest["self_programming_paths"]["delegate"], json!([]));
        assert_eq!(manifest["identity"]["mind_name"], "Ada");
    }
}
