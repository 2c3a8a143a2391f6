//! # mind-memory
//!
//! Durable state for the Mind runtime, backed by SQLite:
//!
//! - **Database**: connection factory, WAL mode, idempotent migrations
//! - **MemoryStore**: per-identity memory entries with FTS5 search
//! - **MindStore**: identities, tasks, drones, traces, runtime tools

pub mod db;
pub mod memory;
pub mod store;

pub use db::Database;
pub use memory::MemoryStore;
pub use store::{MindStore, TraceKind};
