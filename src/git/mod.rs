//! Source-control host access.
//!
//! The ingestion pipeline only needs four operations from a host: resolve a
//! branch to a commit, list the recursive blob tree of a commit, fetch one
//! file's content and diff two commits. [`SourceHost`] is that seam;
//! [`github::GithubHost`] talks to the GitHub REST API and
//! [`local::LocalGitHost`] reads a checkout on disk.

pub mod filter;
pub mod github;
pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::RepoRef;

/// A file (blob) in a commit's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobEntry {
    pub path: String,
    pub size: u64,
    /// Host blob hash; changes whenever the file content changes.
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub content: String,
    pub sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
    Renamed { previous: String },
}

/// One entry of a commit comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(flatten)]
    pub status: ChangeStatus,
}

#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Resolve a branch name to the commit it points at.
    async fn resolve_commit(&self, repo: &RepoRef, branch: &str) -> Result<String>;

    /// All blobs reachable from `commit`, recursively.
    async fn list_tree(&self, repo: &RepoRef, commit: &str) -> Result<Vec<BlobEntry>>;

    /// Content of `path` at `commit`, decoded as UTF-8.
    async fn fetch_file(&self, repo: &RepoRef, commit: &str, path: &str) -> Result<FileContent>;

    /// Files that differ between `base` and `head`.
    async fn compare(&self, repo: &RepoRef, base: &str, head: &str) -> Result<Vec<FileChange>>;
}
