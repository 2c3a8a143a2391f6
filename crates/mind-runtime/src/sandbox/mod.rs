//! Workspace-confined file and command primitives.
//!
//! Every path is resolved against the workspace root and must stay inside it
//! after `..` elimination and symlink resolution. Commands run with an
//! allow-listed environment in their own process group.

mod command;
mod fs;

pub use command::CommandOutput;

use mind_config::SandboxConfig;
use mind_core::{MindError, Result};
use std::path::{Component, Path, PathBuf};

/// Resource bounds applied by the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    pub max_read_bytes: u64,
    pub max_output_bytes: usize,
    pub default_timeout_secs: u64,
    pub max_timeout_secs: u64,
    pub env_passthrough: Vec<String>,
}

impl From<&SandboxConfig> for SandboxLimits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            max_read_bytes: config.max_read_bytes,
            max_output_bytes: config.max_output_bytes,
            default_timeout_secs: config.default_timeout_secs,
            max_timeout_secs: config.max_timeout_secs,
            env_passthrough: config.env_passthrough.clone(),
        }
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self::from(&SandboxConfig::default())
    }
}

/// A workspace root plus the limits enforced inside it.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    limits: SandboxLimits,
}

impl Sandbox {
    /// Create a sandbox over an existing directory.
    pub fn new(root: &Path, limits: SandboxLimits) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| {
            MindError::Validation(format!("workspace {} is unusable: {e}", root.display()))
        })?;
        if !root.is_dir() {
            return Err(MindError::Validation(format!(
                "workspace {} is not a directory",
                root.display()
            )));
        }
        Ok(Self { root, limits })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Resolve an absolute or workspace-relative path, rejecting escapes.
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        let raw = Path::new(path);
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        };
        let resolved = resolve_symlinks(&normalize(&joined))?;
        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(MindError::PathEscape(path.to_string()))
        }
    }

    /// Path relative to the root, for messages shown to the model.
    pub(crate) fn display(&self, resolved: &Path) -> String {
        resolved
            .strip_prefix(&self.root)
            .unwrap_or(resolved)
            .display()
            .to_string()
    }
}

/// Remove `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonicalize the deepest existing ancestor and re-append the rest, so
/// symlinks inside the workspace cannot point outside it.
fn resolve_symlinks(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut tail = Vec::new();
    while !existing.exists() {
        match existing.file_name() {
            Some(name) => tail.push(name.to_os_string()),
            None => break,
        }
        if !existing.pop() {
            break;
        }
    }
    let mut resolved = existing.canonicalize()?;
    for name in tail.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_dots() {
        assert_eq!(normalize(Path::new("/w/./a/../b")), PathBuf::from("/w/b"));
        assert_eq!(normalize(Path::new("/w/../../..")), PathBuf::from("/"));
    }
}
