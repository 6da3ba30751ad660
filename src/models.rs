use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunking::SymbolKind;
use crate::diagram::{DiagramFilters, DiagramKind, Entity, LayoutKind, Relationship};

/// Owner/name pair identifying a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Stable key used by every store: `owner/name`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A tracked repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoRecord {
    pub owner: String,
    pub name: String,
    pub branch: String,
    pub status: IndexStatus,
    pub added_at: DateTime<Utc>,
    pub indexed_at: Option<DateTime<Utc>>,
    pub last_commit: Option<String>,
    pub file_count: usize,
    pub chunk_count: usize,
    pub last_error: Option<String>,
    /// Filtering used by the last full ingestion, reused by delta updates
    #[serde(default)]
    pub root_path: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl RepoRecord {
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(&self.owner, &self.name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Idle,
    Indexing,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Directory,
}

/// One file or directory in an indexed repository.
///
/// `id` is `{owner}/{name}:{path}` and is stable across runs. The root node
/// has path `/`, depth 0 and no parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: String,
    pub repo: String,
    pub path: String,
    pub name: String,
    pub kind: NodeKind,
    pub parent_id: Option<String>,
    pub depth: usize,
    pub size: u64,
    pub cumulative_size: u64,
    pub cumulative_file_count: u64,
    pub language: Option<String>,
    pub extension: Option<String>,
    pub content_hash: Option<String>,
    pub chunk_count: usize,
    pub has_chunks: bool,
}

impl TreeNode {
    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }
}

/// A chunk ready to be written to the chunk store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub repo: String,
    pub branch: String,
    pub path: String,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content_hash: String,
    pub symbol_name: Option<String>,
    pub symbol_kind: Option<SymbolKind>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Done,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Error)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Full,
    Delta,
}

/// Progress record of one ingestion run, polled by callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub id: Uuid,
    pub repo: String,
    pub kind: JobKind,
    pub state: JobState,
    pub files_total: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub chunks_produced: usize,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Full ingestion request
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub owner: String,
    pub name: String,
    pub branch: Option<String>,
    /// Only index files below this directory
    pub root_path: Option<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl IngestRequest {
    pub fn repo_ref(&self) -> RepoRef {
        RepoRef::new(self.owner.trim(), self.name.trim())
    }

    pub fn branch(&self) -> String {
        self.branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .unwrap_or("main")
            .to_string()
    }

    /// Root path without surrounding slashes, `None` for the whole repository.
    pub fn root_path(&self) -> Option<String> {
        self.root_path
            .as_deref()
            .map(|p| p.trim().trim_matches('/').to_string())
            .filter(|p| !p.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_segment("owner", &self.owner)?;
        validate_segment("name", &self.name)?;
        if let Some(branch) = &self.branch {
            if branch.chars().any(char::is_whitespace) {
                return Err("branch must not contain whitespace".to_string());
            }
        }
        if let Some(root) = self.root_path() {
            if root.split('/').any(|s| s == "..") {
                return Err("root_path must not contain '..'".to_string());
            }
        }
        if self.exclude.iter().any(|p| p.trim().is_empty()) {
            return Err("exclude patterns must not be empty".to_string());
        }
        Ok(())
    }
}

/// Validate an owner or repository name as accepted by common hosts.
pub fn validate_segment(field: &str, value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{field} is required"));
    }
    if value == "." || value == ".." {
        return Err(format!("{field} is not a valid name"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(format!(
            "{field} may only contain letters, digits, '-', '_' and '.'"
        ));
    }
    Ok(())
}

/// Delta update request (before/after commit pair, e.g. from a push event)
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaRequest {
    pub before: String,
    pub after: String,
    pub branch: Option<String>,
}

impl DeltaRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.before.trim().is_empty() || self.after.trim().is_empty() {
            return Err("before and after commits are required".to_string());
        }
        Ok(())
    }
}

/// Returned when a job was accepted for background processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
}

/// Saved diagram configuration for one repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramPreset {
    pub repo: String,
    pub name: String,
    pub kind: DiagramKind,
    pub layout: Option<LayoutKind>,
    #[serde(default)]
    pub filters: DiagramFilters,
    pub updated_at: DateTime<Utc>,
}

/// Preset upsert request
#[derive(Debug, Clone, Deserialize)]
pub struct PresetRequest {
    pub name: String,
    pub kind: DiagramKind,
    pub layout: Option<LayoutKind>,
    #[serde(default)]
    pub filters: DiagramFilters,
}

/// File-tree diagram request. Fields set here override the named preset.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagramRequest {
    pub preset: Option<String>,
    pub layout: Option<LayoutKind>,
    pub filters: Option<DiagramFilters>,
}

/// Conceptual diagram over caller-supplied entities and relationships
#[derive(Debug, Clone, Deserialize)]
pub struct ConceptualRequest {
    pub kind: DiagramKind,
    pub layout: Option<LayoutKind>,
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub filters: DiagramFilters,
}
