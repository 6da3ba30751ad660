use anyhow::{Context, Result};
use async_trait::async_trait;
use git2::{Delta, DiffFindOptions, ObjectType, Repository, TreeWalkMode, TreeWalkResult};
use std::path::{Path, PathBuf};

use super::{BlobEntry, ChangeStatus, FileChange, FileContent, SourceHost};
use crate::models::RepoRef;

/// Serves a single local git repository, whatever owner/name is requested.
///
/// git2 handles are not `Sync`, so every call opens the repository on the
/// blocking pool.
pub struct LocalGitHost {
    path: PathBuf,
}

impl LocalGitHost {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn with_repo<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&path)
                .with_context(|| format!("Failed to open git repository at {}", path.display()))?;
            f(&repo)
        })
        .await
        .context("git task panicked")?
    }
}

fn find_commit<'r>(repo: &'r Repository, spec: &str) -> Result<git2::Commit<'r>> {
    let object = repo
        .revparse_single(spec)
        .or_else(|_| repo.revparse_single(&format!("refs/remotes/origin/{spec}")))
        .with_context(|| format!("Unknown revision {spec}"))?;
    object
        .peel_to_commit()
        .with_context(|| format!("{spec} does not point at a commit"))
}

fn list_blobs(repo: &Repository, commit: &str) -> Result<Vec<BlobEntry>> {
    let tree = find_commit(repo, commit)?.tree()?;
    let odb = repo.odb()?;
    let mut blobs = Vec::new();
    let mut failure = None;

    let walked = tree.walk(TreeWalkMode::PreOrder, |root, entry| {
        if entry.kind() != Some(ObjectType::Blob) {
            return TreeWalkResult::Ok;
        }
        let Some(name) = entry.name() else {
            return TreeWalkResult::Skip;
        };
        match odb.read_header(entry.id()) {
            Ok((size, _)) => {
                blobs.push(BlobEntry {
                    path: format!("{root}{name}"),
                    size: size as u64,
                    sha: entry.id().to_string(),
                });
                TreeWalkResult::Ok
            }
            Err(e) => {
                failure = Some(e);
                TreeWalkResult::Abort
            }
        }
    });

    if let Some(e) = failure {
        return Err(e).context("Failed to read blob header");
    }
    walked.context("Failed to walk commit tree")?;
    Ok(blobs)
}

fn read_file(repo: &Repository, commit: &str, path: &str) -> Result<FileContent> {
    let tree = find_commit(repo, commit)?.tree()?;
    let entry = tree
        .get_path(Path::new(path))
        .with_context(|| format!("{path} not found at {commit}"))?;
    let blob = entry
        .to_object(repo)?
        .peel_to_blob()
        .with_context(|| format!("{path} is not a file"))?;
    let content = std::str::from_utf8(blob.content())
        .with_context(|| format!("{path} is not valid UTF-8"))?
        .to_string();
    Ok(FileContent {
        content,
        sha: blob.id().to_string(),
    })
}

fn diff_commits(repo: &Repository, base: &str, head: &str) -> Result<Vec<FileChange>> {
    let base_tree = find_commit(repo, base)?.tree()?;
    let head_tree = find_commit(repo, head)?.tree()?;
    let mut diff = repo.diff_tree_to_tree(Some(&base_tree), Some(&head_tree), None)?;
    diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;

    let path_of = |file: git2::DiffFile<'_>| file.path().map(|p| p.to_string_lossy().to_string());

    let mut changes = Vec::new();
    for delta in diff.deltas() {
        let old = path_of(delta.old_file());
        let new = path_of(delta.new_file());
        let change = match (delta.status(), old, new) {
            (Delta::Added | Delta::Copied, _, Some(path)) => FileChange {
                path,
                status: ChangeStatus::Added,
            },
            (Delta::Deleted, Some(path), _) => FileChange {
                path,
                status: ChangeStatus::Removed,
            },
            (Delta::Renamed, Some(previous), Some(path)) => FileChange {
                path,
                status: ChangeStatus::Renamed { previous },
            },
            (Delta::Modified | Delta::Typechange, _, Some(path)) => FileChange {
                path,
                status: ChangeStatus::Modified,
            },
            _ => continue,
        };
        changes.push(change);
    }
    Ok(changes)
}

#[async_trait]
impl SourceHost for LocalGitHost {
    async fn resolve_commit(&self, _repo: &RepoRef, branch: &str) -> Result<String> {
        let branch = branch.to_string();
        self.with_repo(move |repo| Ok(find_commit(repo, &branch)?.id().to_string()))
            .await
    }

    async fn list_tree(&self, _repo: &RepoRef, commit: &str) -> Result<Vec<BlobEntry>> {
        let commit = commit.to_string();
        self.with_repo(move |repo| list_blobs(repo, &commit)).await
    }

    async fn fetch_file(&self, _repo: &RepoRef, commit: &str, path: &str) -> Result<FileContent> {
        let (commit, path) = (commit.to_string(), path.to_string());
        self.with_repo(move |repo| read_file(repo, &commit, &path)).await
    }

    async fn compare(&self, _repo: &RepoRef, base: &str, head: &str) -> Result<Vec<FileChange>> {
        let (base, head) = (base.to_string(), head.to_string());
        self.with_repo(move |repo| diff_commits(repo, &base, &head)).await
    }
}
