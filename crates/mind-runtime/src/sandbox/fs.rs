use mind_core::{MindError, Result};
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

use super::Sandbox;

impl Sandbox {
    /// Read a file inside the workspace as text.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let resolved = self.resolve(path)?;
        let meta = match tokio::fs::metadata(&resolved).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(MindError::NotFound(format!("File not found: {path}")));
            }
            Err(e) => return Err(e.into()),
        };
        if meta.is_dir() {
            return Err(MindError::Validation(format!("{path} is a directory")));
        }
        if meta.len() > self.limits.max_read_bytes {
            return Err(MindError::ResourceLimitExceeded(format!(
                "File too large: {} bytes exceeds the {} byte read limit",
                meta.len(),
                self.limits.max_read_bytes
            )));
        }
        let bytes = tokio::fs::read(&resolved).await?;
        debug!(path = %self.display(&resolved), bytes = bytes.len(), "read file");
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Create or overwrite a file, creating parent directories as needed.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<String> {
        let resolved = self.resolve(path)?;
        if resolved.is_dir() {
            return Err(MindError::Validation(format!("{path} is a directory")));
        }
        write_atomic(&resolved, content.as_bytes()).await?;
        debug!(path = %self.display(&resolved), bytes = content.len(), "wrote file");
        Ok(format!(
            "Wrote {} bytes to {}",
            content.len(),
            self.display(&resolved)
        ))
    }

    /// Replace the first occurrence of `old_text` with `new_text`.
    pub async fn edit_file(&self, path: &str, old_text: &str, new_text: &str) -> Result<String> {
        if old_text.is_empty() {
            return Err(MindError::Validation("old_text must not be empty".into()));
        }
        let content = self.read_file(path).await?;
        if !content.contains(old_text) {
            return Err(MindError::NotFound(format!("old_text not found in {path}")));
        }
        let updated = content.replacen(old_text, new_text, 1);
        let resolved = self.resolve(path)?;
        write_atomic(&resolved, updated.as_bytes()).await?;
        Ok(format!("Edited {}", self.display(&resolved)))
    }
}

/// Write to a sibling temp file, then rename over the target.
async fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| MindError::Validation(format!("{} has no parent", target.display())))?;
    tokio::fs::create_dir_all(parent).await?;

    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{name}.{}.tmp", uuid::Uuid::new_v4().simple()));

    tokio::fs::write(&tmp, bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, target).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
