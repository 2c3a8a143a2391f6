//! # mind-core
//!
//! Core types, traits, and primitives for the Mind agent runtime.
//! This crate defines the shared vocabulary used by every other crate in the workspace.

pub mod error;
pub mod event;
pub mod message;
pub mod tool;
pub mod types;

pub use error::{MindError, Result};
pub use event::{Event, EventKind, RawEvent, ResultSubtype, RunResult, Trace, TraceEvent};
pub use message::{Message, MessageContent, Role};
pub use tool::{Tool, ToolCall, ToolExecutor, ToolResult};
pub use types::*;
