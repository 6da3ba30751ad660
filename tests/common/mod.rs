//! Scripted in-memory source host shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use repo_atlas::config::Config;
use repo_atlas::git::{BlobEntry, ChangeStatus, FileChange, FileContent, SourceHost};
use repo_atlas::models::{IngestJob, IngestRequest, RepoRef};
use repo_atlas::state::AppState;

pub fn sha(content: &str) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[derive(Default)]
struct Script {
    branches: HashMap<String, String>,
    commits: HashMap<String, BTreeMap<String, String>>,
    broken: HashSet<String>,
    fetch_delay: Option<Duration>,
}

/// Commits are snapshots of `path → content`; branches point at commits.
#[derive(Default)]
pub struct FakeHost {
    script: Mutex<Script>,
}

impl FakeHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn commit(&self, commit: &str, files: &[(&str, &str)]) {
        let snapshot = files
            .iter()
            .map(|(path, content)| (path.to_string(), content.to_string()))
            .collect();
        self.script.lock().commits.insert(commit.to_string(), snapshot);
    }

    pub fn point(&self, branch: &str, commit: &str) {
        self.script
            .lock()
            .branches
            .insert(branch.to_string(), commit.to_string());
    }

    /// Make every fetch of `path` fail.
    pub fn break_file(&self, path: &str) {
        self.script.lock().broken.insert(path.to_string());
    }

    /// Make every fetch take at least `delay`.
    pub fn slow_down(&self, delay: Duration) {
        self.script.lock().fetch_delay = Some(delay);
    }

    fn snapshot(&self, commit: &str) -> Result<BTreeMap<String, String>> {
        self.script
            .lock()
            .commits
            .get(commit)
            .cloned()
            .ok_or_else(|| anyhow!("unknown commit {commit}"))
    }
}

#[async_trait]
impl SourceHost for FakeHost {
    async fn resolve_commit(&self, repo: &RepoRef, branch: &str) -> Result<String> {
        self.script
            .lock()
            .branches
            .get(branch)
            .cloned()
            .ok_or_else(|| anyhow!("branch {branch} not found in {repo}"))
    }

    async fn list_tree(&self, _repo: &RepoRef, commit: &str) -> Result<Vec<BlobEntry>> {
        Ok(self
            .snapshot(commit)?
            .into_iter()
            .map(|(path, content)| BlobEntry {
                size: content.len() as u64,
                sha: sha(&content),
                path,
            })
            .collect())
    }

    async fn fetch_file(&self, _repo: &RepoRef, commit: &str, path: &str) -> Result<FileContent> {
        let delay = self.script.lock().fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.lock().broken.contains(path) {
            return Err(anyhow!("connection reset while fetching {path}"));
        }
        let content = self
            .snapshot(commit)?
            .remove(path)
            .ok_or_else(|| anyhow!("{path} not found at {commit}"))?;
        Ok(FileContent {
            sha: sha(&content),
            content,
        })
    }

    async fn compare(&self, _repo: &RepoRef, base: &str, head: &str) -> Result<Vec<FileChange>> {
        let before = self.snapshot(base)?;
        let after = self.snapshot(head)?;
        let mut changes = Vec::new();
        for (path, content) in &after {
            match before.get(path) {
                None => changes.push(FileChange {
                    path: path.clone(),
                    status: ChangeStatus::Added,
                }),
                Some(old) if old != content => changes.push(FileChange {
                    path: path.clone(),
                    status: ChangeStatus::Modified,
                }),
                Some(_) => {}
            }
        }
        for path in before.keys().filter(|p| !after.contains_key(*p)) {
            changes.push(FileChange {
                path: path.clone(),
                status: ChangeStatus::Removed,
            });
        }
        Ok(changes)
    }
}

pub fn state_with(host: Arc<FakeHost>, data_dir: &std::path::Path) -> AppState {
    let mut config = Config::default();
    config.data_dir = data_dir.to_path_buf();
    config.ingest.concurrency = 2;
    AppState::with_host(config, host).unwrap()
}

pub fn repo() -> RepoRef {
    RepoRef::new("acme", "widgets")
}

pub fn ingest_request(branch: &str) -> IngestRequest {
    IngestRequest {
        owner: "acme".to_string(),
        name: "widgets".to_string(),
        branch: Some(branch.to_string()),
        root_path: None,
        exclude: Vec::new(),
    }
}

/// Poll until the job reaches a terminal state.
pub async fn wait_for(state: &AppState, id: Uuid) -> IngestJob {
    for _ in 0..1000 {
        if let Some(job) = state.jobs.get(id) {
            // The guard is released just after the job turns terminal
            if job.state.is_terminal() && !state.guards.is_active(&job.repo) {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} did not finish");
}

/// A TypeScript module: one 40-line exported function followed by eight
/// 10-line helpers, 120 lines in total.
pub fn typescript_module() -> String {
    let mut lines = vec!["export function handleRequest(input: string): number {".to_string()];
    for i in 0..38 {
        lines.push(format!("  const value{i} = input.length * {i} + {i};"));
    }
    lines.push("}".to_string());
    for h in 0..8 {
        lines.push(format!("export function helper{h}(x: number): number {{"));
        for j in 0..8 {
            lines.push(format!("  x = x + {j};"));
        }
        lines.push("}".to_string());
    }
    assert_eq!(lines.len(), 120);
    lines.join("\n") + "\n"
}

/// A README with five headings, each followed by enough prose to stand alone.
pub fn readme(titles: &[&str]) -> String {
    let mut out = String::new();
    for (i, title) in titles.iter().enumerate() {
        out.push_str(&format!("{} {title}\n\n", if i == 0 { "#" } else { "##" }));
        for p in 0..10 {
            out.push_str(&format!("{} {p}\n", "lorem ipsum dolor sit amet".repeat(3)));
        }
        out.push('\n');
    }
    out
}
