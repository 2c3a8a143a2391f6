//! Tools exposed to the reasoning loop.

mod builtin;
mod memory;
mod registry;
mod runtime;
mod spawn;

pub use builtin::SandboxTools;
pub use memory::{MAX_SEARCH_RESULTS, MemoryTools};
pub use registry::ToolRegistry;
pub use runtime::{RESERVED_TOOL_NAMES, RuntimeTools, validate_tool_name};
pub use spawn::{DroneSpawner, SpawnTool};

use mind_config::RuntimeConfig;
use mind_core::{Result, RuntimeToolSpec};
use mind_memory::MemoryStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::sandbox::Sandbox;

/// Everything needed to assemble the tool set for one run.
pub struct ToolContext {
    pub sandbox: Arc<Sandbox>,
    pub memory: MemoryStore,
    pub mind_id: String,
    pub runtime_tools: Vec<RuntimeToolSpec>,
    pub cancel: CancellationToken,
    /// `None` for drones, which must not spawn further drones.
    pub spawner: Option<Arc<dyn DroneSpawner>>,
}

/// Register the built-in, memory, spawn, and runtime tools.
pub fn build_registry(ctx: ToolContext, limits: &RuntimeConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(SandboxTools::new(ctx.sandbox, ctx.cancel)))?;
    registry.register(Arc::new(MemoryTools::new(
        ctx.memory,
        ctx.mind_id,
        limits.memory_save_max_calls,
    )))?;
    if let Some(spawner) = ctx.spawner {
        registry.register(Arc::new(SpawnTool::new(spawner, limits)))?;
    }
    if !ctx.runtime_tools.is_empty() {
        registry.register(Arc::new(RuntimeTools::new(ctx.runtime_tools)))?;
    }
    Ok(registry)
}
