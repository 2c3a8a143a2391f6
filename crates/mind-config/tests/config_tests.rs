#[cfg(test)]
mod tests {
    use mind_config::ConfigLoader;
    use mind_config::schema::*;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_runtime_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_turns, 40);
        assert_eq!(config.stream_event_limit, 250);
        assert_eq!(config.text_delta_event_limit, 5000);
        assert_eq!(config.memory_context_limit, 12);
        assert_eq!(config.memory_search_top_k, 8);
        assert_eq!(config.category_context_limit, 4);
        assert_eq!(config.autosave_memories_per_run, 1);
        assert_eq!(config.spawn_default_turns, 12);
        assert_eq!(config.spawn_max_turns, 20);
    }

    #[test]
    fn test_sandbox_defaults() {
        let config = SandboxConfig::default();
        assert!(config.workspace_dir.is_none());
        assert_eq!(config.max_read_bytes, 1024 * 1024);
        assert_eq!(config.max_output_bytes, 128 * 1024);
        assert_eq!(config.default_timeout_secs, 30);
        assert_eq!(config.max_timeout_secs, 300);
        assert!(config.env_passthrough.iter().any(|v| v == "PATH"));
        assert!(config.env_passthrough.iter().any(|v| v == "LC_*"));
        assert!(!config.env_passthrough.iter().any(|v| v.contains("KEY")));
    }

    #[test]
    fn test_feedback_defaults() {
        let config = FeedbackConfig::default();
        assert_eq!(config.refinement_window_minutes, 15);
        assert_eq!(config.similarity_threshold, 0.3);
        assert_eq!(config.min_token_len, 3);
    }

    #[test]
    fn test_llm_and_logging_defaults() {
        let config = MindConfig::default();
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.max_tokens, 4096);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
        assert!(config.store.path.ends_with("mind.db"));
    }

    // ── Parsing tests ──────────────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = MindConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: MindConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.llm.model, config.llm.model);
        assert_eq!(restored.runtime.max_turns, config.runtime.max_turns);
        assert_eq!(
            restored.sandbox.env_passthrough,
            config.sandbox.env_passthrough
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ConfigLoader::parse(
            r#"
            [runtime]
            max_turns = 7

            [feedback]
            similarity_threshold = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.runtime.max_turns, 7);
        assert_eq!(config.runtime.stream_event_limit, 250);
        assert_eq!(config.feedback.similarity_threshold, 0.5);
        assert_eq!(config.feedback.refinement_window_minutes, 15);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = ConfigLoader::parse("").unwrap();
        assert_eq!(config.runtime.max_turns, 40);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mind.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[llm]\nprovider = \"mock\"\nmodel = \"scripted\"").unwrap();
        writeln!(file, "[store]\npath = \"/tmp/custom.db\"").unwrap();

        let loader = ConfigLoader::load(Some(&path)).unwrap();
        let config = loader.get();
        assert_eq!(config.llm.provider, "mock");
        assert_eq!(loader.path(), path.as_path());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(&path)).unwrap();
        assert_eq!(loader.get().runtime.spawn_max_calls, 3);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mind.toml");
        std::fs::write(&path, "[runtime\nmax_turns = ").unwrap();
        let err = ConfigLoader::load(Some(&path)).err().unwrap();
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mind.toml");
        std::fs::write(&path, "[llm]\nprovider = \"carrier-pigeon\"\n").unwrap();
        let err = ConfigLoader::load(Some(&path)).err().unwrap();
        assert!(err.to_string().contains("llm.provider"));
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        let explicit = std::path::Path::new("/etc/mind/custom.toml");
        assert_eq!(ConfigLoader::resolve_path(Some(explicit)), explicit);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_default_config_is_valid() {
        let warnings = MindConfig::default().validate().unwrap();
        assert!(
            warnings
                .iter()
                .all(|w| w.severity != WarningSeverity::Error)
        );
    }

    #[test]
    fn test_zero_max_turns_is_error() {
        let mut config = MindConfig::default();
        config.runtime.max_turns = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("runtime.max_turns"));
    }

    #[test]
    fn test_threshold_out_of_range_is_error() {
        let mut config = MindConfig::default();
        config.feedback.similarity_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_passthrough_warns() {
        let mut config = MindConfig::default();
        config.llm.provider = "mock".into();
        config
            .sandbox
            .env_passthrough
            .push("ANTHROPIC_API_KEY".into());
        let warnings = config.validate().unwrap();
        let hit = warnings
            .iter()
            .find(|w| w.field == "sandbox.env_passthrough")
            .unwrap();
        assert_eq!(hit.severity, WarningSeverity::Warning);
    }

    #[test]
    fn test_missing_api_key_is_info() {
        let mut config = MindConfig::default();
        config.llm.api_key = None;
        let warnings = config.validate().unwrap();
        assert!(
            warnings
                .iter()
                .any(|w| w.field == "llm.api_key" && w.severity == WarningSeverity::Info)
        );
    }

    #[test]
    fn test_warning_display_includes_hint() {
        let warning = ConfigWarning {
            field: "logging.format".into(),
            message: "unknown log format 'xml'".into(),
            severity: WarningSeverity::Warning,
            hint: Some("Valid values: pretty, json, compact".into()),
        };
        let text = warning.to_string();
        assert!(text.starts_with("[warning] logging.format"));
        assert!(text.contains("hint: Valid values"));
    }
}
