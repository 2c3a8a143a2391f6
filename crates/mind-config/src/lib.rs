//! # mind-config
//!
//! Configuration for the Mind runtime. Reads `mind.toml`, then applies
//! environment variable overrides. The result is built once at startup and
//! handed to every component that needs it.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::MindConfig;
pub use schema::{
    ConfigWarning, FeedbackConfig, LlmConfig, LoggingConfig, RuntimeConfig, SandboxConfig,
    StoreConfig, WarningSeverity,
};
