use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `mind.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MindConfig {
    pub store: StoreConfig,
    pub sandbox: SandboxConfig,
    pub runtime: RuntimeConfig,
    pub feedback: FeedbackConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database holding minds, tasks, traces, drones, and memories.
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".mind")
                .join("mind.db"),
        }
    }
}

// ── Sandbox ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Fixed workspace directory. When unset, every run gets a fresh temp dir.
    pub workspace_dir: Option<PathBuf>,
    /// Files larger than this are refused by `read_file`.
    pub max_read_bytes: u64,
    /// Global output ceiling for `run_command`; each stream gets half.
    pub max_output_bytes: usize,
    /// Timeout used when the model does not pass one.
    pub default_timeout_secs: u64,
    /// Hard upper bound on any requested timeout.
    pub max_timeout_secs: u64,
    /// Environment variables passed to commands. Entries ending in `*` match a prefix.
    pub env_passthrough: Vec<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            workspace_dir: None,
            max_read_bytes: 1024 * 1024,
            max_output_bytes: 128 * 1024,
            default_timeout_secs: 30,
            max_timeout_secs: 300,
            env_passthrough: [
                "PATH", "HOME", "USER", "LOGNAME", "SHELL", "TERM", "TMPDIR", "TZ", "LANG",
                "LANGUAGE", "LC_*",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

// ── Runtime ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Model turns per delegation before the run is aborted.
    pub max_turns: u32,
    /// Cap on non-incremental events streamed by one run.
    pub stream_event_limit: usize,
    /// Cap on `text_delta` events streamed by one run.
    pub text_delta_event_limit: usize,
    /// Maximum memories merged into the run context.
    pub memory_context_limit: usize,
    /// Free-text search results considered for the run context.
    pub memory_search_top_k: usize,
    /// Most recent entries pulled from each priority category.
    pub category_context_limit: usize,
    /// `task_result` memories written per run.
    pub autosave_memories_per_run: usize,
    /// `memory_save` calls allowed per run.
    pub memory_save_max_calls: u32,
    /// `spawn_agent` calls allowed per run.
    pub spawn_max_calls: u32,
    /// Drone turn budget when the model does not pass one.
    pub spawn_default_turns: u32,
    /// Upper clamp for a drone's turn budget.
    pub spawn_max_turns: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_turns: 40,
            stream_event_limit: 250,
            text_delta_event_limit: 5000,
            memory_context_limit: 12,
            memory_search_top_k: 8,
            category_context_limit: 4,
            autosave_memories_per_run: 1,
            memory_save_max_calls: 5,
            spawn_max_calls: 3,
            spawn_default_turns: 12,
            spawn_max_turns: 20,
        }
    }
}

// ── Feedback inference ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// A follow-up within this many minutes of a completed task may be a refinement.
    pub refinement_window_minutes: i64,
    /// Jaccard similarity at or above which two descriptions count as related.
    pub similarity_threshold: f64,
    /// Tokens shorter than this are ignored when comparing descriptions.
    pub min_token_len: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            refinement_window_minutes: 15,
            similarity_threshold: 0.3,
            min_token_len: 3,
        }
    }
}

// ── LLM ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "anthropic" or "mock".
    pub provider: String,
    pub model: String,
    /// API key. Falls back to `ANTHROPIC_API_KEY`.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key: None,
            base_url: None,
            max_tokens: 4096,
            temperature: 0.2,
            request_timeout_secs: 120,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", label, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   hint: {}", h)?;
        }
        Ok(())
    }
}

impl MindConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Runtime budgets ───
        if self.runtime.max_turns == 0 {
            warnings.push(ConfigWarning {
                field: "runtime.max_turns".into(),
                message: "max_turns is 0, no model call would ever be made".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 40".into()),
            });
        }
        if self.runtime.stream_event_limit == 0 {
            warnings.push(ConfigWarning {
                field: "runtime.stream_event_limit".into(),
                message: "stream_event_limit is 0, every run would fail".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 250".into()),
            });
        }
        if self.runtime.text_delta_event_limit < self.runtime.stream_event_limit {
            warnings.push(ConfigWarning {
                field: "runtime.text_delta_event_limit".into(),
                message: "text delta limit is smaller than the event limit".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Streaming produces many more deltas than whole events".into()),
            });
        }
        if self.runtime.spawn_default_turns > self.runtime.spawn_max_turns {
            warnings.push(ConfigWarning {
                field: "runtime.spawn_default_turns".into(),
                message: format!(
                    "default drone turns ({}) exceed the cap ({}) and will be clamped",
                    self.runtime.spawn_default_turns, self.runtime.spawn_max_turns
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Sandbox ───
        if self.sandbox.max_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "sandbox.max_timeout_secs".into(),
                message: "max_timeout_secs is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 300".into()),
            });
        }
        if self.sandbox.default_timeout_secs > self.sandbox.max_timeout_secs {
            warnings.push(ConfigWarning {
                field: "sandbox.default_timeout_secs".into(),
                message: "default timeout exceeds max_timeout_secs and will be clamped".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if self.sandbox.max_output_bytes < 2 {
            warnings.push(ConfigWarning {
                field: "sandbox.max_output_bytes".into(),
                message: "output ceiling too small to split across stdout and stderr".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 131072".into()),
            });
        }
        if self.sandbox.env_passthrough.iter().any(|v| {
            let upper = v.to_ascii_uppercase();
            upper.contains("KEY") || upper.contains("TOKEN") || upper.contains("SECRET")
        }) {
            warnings.push(ConfigWarning {
                field: "sandbox.env_passthrough".into(),
                message: "passthrough list exposes a credential-like variable to commands".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Commands are chosen by the model; keep secrets out of their environment".into()),
            });
        }

        // ── Feedback ───
        if !(0.0..=1.0).contains(&self.feedback.similarity_threshold) {
            warnings.push(ConfigWarning {
                field: "feedback.similarity_threshold".into(),
                message: format!(
                    "threshold {} is outside 0.0-1.0",
                    self.feedback.similarity_threshold
                ),
                severity: WarningSeverity::Error,
                hint: Some("Jaccard similarity ranges from 0.0 to 1.0".into()),
            });
        }

        // ── LLM ───
        let valid_providers = ["anthropic", "mock"];
        if !valid_providers.contains(&self.llm.provider.as_str()) {
            warnings.push(ConfigWarning {
                field: "llm.provider".into(),
                message: format!("unknown provider '{}'", self.llm.provider),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", valid_providers.join(", "))),
            });
        }
        if self.llm.model.is_empty() {
            warnings.push(ConfigWarning {
                field: "llm.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'claude-sonnet-4-20250514'".into()),
            });
        }
        if self.llm.temperature < 0.0 || self.llm.temperature > 1.0 {
            warnings.push(ConfigWarning {
                field: "llm.temperature".into(),
                message: format!("temperature {} is out of range", self.llm.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 1.0".into()),
            });
        }
        if self.llm.provider == "anthropic" && self.llm.api_key.is_none() {
            warnings.push(ConfigWarning {
                field: "llm.api_key".into(),
                message: "no API key configured".into(),
                severity: WarningSeverity::Info,
                hint: Some("Set llm.api_key or export ANTHROPIC_API_KEY before delegating".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  - {}", errors.join("\n  - ")));
        }

        Ok(warnings)
    }
}
