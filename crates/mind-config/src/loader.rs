use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::MindConfig;

/// Loads the Mind configuration from disk and the environment.
pub struct ConfigLoader {
    config: Arc<MindConfig>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > MIND_CONFIG env > ~/.mind/mind.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("MIND_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mind")
            .join("mind.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> mind_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw).map_err(|e| {
                mind_core::MindError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            MindConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(mind_core::MindError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(config),
            config_path,
        })
    }

    /// Parse a TOML document without touching the environment.
    pub fn parse(raw: &str) -> Result<MindConfig, toml::de::Error> {
        toml::from_str::<MindConfig>(raw)
    }

    /// Shared handle to the loaded config.
    pub fn get(&self) -> Arc<MindConfig> {
        Arc::clone(&self.config)
    }

    /// Path the config was resolved from (it may not exist).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (MIND_DB_PATH, MIND_MODEL, etc.)
    pub fn apply_env_overrides(mut config: MindConfig) -> MindConfig {
        if let Ok(v) = std::env::var("MIND_DB_PATH") {
            config.store.path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("MIND_MODEL") {
            config.llm.model = v;
        }
        if let Ok(v) = std::env::var("MIND_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("MIND_MAX_TURNS") {
            if let Ok(turns) = v.parse::<u32>() {
                config.runtime.max_turns = turns;
            }
        }
        // The config file wins; the env var only fills a missing key.
        if config.llm.api_key.is_none() {
            if let Ok(v) = std::env::var("ANTHROPIC_API_KEY") {
                config.llm.api_key = Some(v);
            }
        }
        config
    }
}
