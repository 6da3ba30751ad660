use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::models::{RepoRef, TreeNode};
use crate::tree::{self, FileEntry};

/// Per-repository tree snapshots, one JSON file each under
/// `{trees_dir}/{owner}/{name}.json`.
pub struct TreeStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl TreeStore {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, repo: &RepoRef) -> PathBuf {
        self.dir.join(&repo.owner).join(format!("{}.json", repo.name))
    }

    fn write(&self, repo: &RepoRef, nodes: &[TreeNode]) -> Result<()> {
        let data = serde_json::to_vec(nodes)?;
        super::write_atomic(&self.path_for(repo), &data)
    }

    pub fn load(&self, repo: &RepoRef) -> Result<Option<Vec<TreeNode>>> {
        let path = self.path_for(repo);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&path)
            .with_context(|| format!("Failed to read tree {}", path.display()))?;
        let nodes = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse tree {}", path.display()))?;
        Ok(Some(nodes))
    }

    /// Replace the whole snapshot (full ingestion).
    pub fn replace(&self, repo: &RepoRef, nodes: &[TreeNode]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write(repo, nodes)
    }

    /// Patch changed/removed files into the snapshot and re-aggregate.
    pub fn apply_delta(
        &self,
        repo: &RepoRef,
        upserts: &[FileEntry],
        removals: &[String],
    ) -> Result<Vec<TreeNode>> {
        let _guard = self.write_lock.lock();
        let current = self.load(repo)?.unwrap_or_default();
        let patched = tree::apply_delta(repo, current, upserts, removals);
        self.write(repo, &patched)?;
        Ok(patched)
    }

    pub fn set_chunk_counts(&self, repo: &RepoRef, counts: &HashMap<String, usize>) -> Result<()> {
        let _guard = self.write_lock.lock();
        let Some(mut nodes) = self.load(repo)? else {
            return Ok(());
        };
        tree::set_chunk_counts(&mut nodes, counts);
        self.write(repo, &nodes)
    }
}
