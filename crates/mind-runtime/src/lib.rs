//! # mind-runtime
//!
//! The Mind runtime: everything between "delegate this task" and a finished,
//! persisted Task.
//!
//! ```text
//!   MindService::delegate
//!          │
//!          ▼
//!   ┌──────────────┐   load identity, infer implicit feedback,
//!   │   Pipeline   │   merge memory context, budget events,
//!   └──────┬───────┘   persist task + trace + insight
//!          │ RawEvent (unbounded channel)
//!   ┌──────┴───────┐
//!   │ ReasoningLoop│ ◄──► LlmProvider (stream)
//!   └──────┬───────┘
//!          │ ToolCall
//!   ┌──────┴───────┐
//!   │ ToolRegistry │ ──► Sandbox (files, commands), memory, drones
//!   └──────────────┘
//!          │
//!          ▼
//!   EventStream (seq, id, trace_id, dedup) ──► caller
//! ```

pub mod agent_loop;
pub mod drone;
pub mod pipeline;
pub mod prompt;
pub mod sandbox;
pub mod service;
pub mod signals;
pub mod stream;
pub mod tools;

pub use agent_loop::{AgentRunner, ReasoningLoop, RunRequest};
pub use drone::DroneRunner;
pub use pipeline::{Pipeline, PipelineDeps};
pub use sandbox::{CommandOutput, Sandbox, SandboxLimits};
pub use service::{CharterUpdate, FeedbackInput, MindService, MindUpdate, NewMind};
pub use stream::EventStream;
pub use tools::{DroneSpawner, ToolRegistry};
