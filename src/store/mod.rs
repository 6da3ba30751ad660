//! Persistence: the content-addressed chunk store, repository/preset
//! metadata and per-repository tree snapshots.

pub mod chunks;
pub mod metadata;
pub mod tree;

use anyhow::{Context, Result};
use std::path::Path;

/// Write `data` to `path` via a temp file + rename so readers never observe a
/// half-written document.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, data)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
