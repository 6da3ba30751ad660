//! Ingestion orchestrator.
//!
//! A request creates a queued [`IngestJob`](crate::models::IngestJob) and
//! returns its id immediately; the run itself continues on a detached task.
//! Files are processed in strict batches of `ingest.concurrency`: a batch is
//! fetched, chunked and stored concurrently, the orchestrator waits for the
//! whole batch, records progress, then starts the next one.
//!
//! Failures resolving the branch, listing the tree or persisting the tree are
//! fatal to the job. Failures on a single file are logged, counted as skipped
//! and otherwise ignored.

pub mod guard;
pub mod jobs;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::chunking;
use crate::git::filter::{detect_language, parse_gitignore, ExcludeMatcher, FileFilter};
use crate::git::{BlobEntry, ChangeStatus};
use crate::models::{
    ChunkMetadata, ChunkRecord, DeltaRequest, IndexStatus, IngestRequest, JobKind, RepoRef,
};
use crate::state::AppState;
use crate::store::chunks::chunk_id;
use crate::tree::{self, FileEntry};

use self::guard::RepoGuard;

/// Why a run could not be started. Nothing has been created when this is
/// returned.
#[derive(Debug)]
pub enum StartError {
    Invalid(String),
    UnknownRepo(RepoRef),
    Busy(RepoRef),
}

impl fmt::Display for StartError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartError::Invalid(msg) => write!(f, "{msg}"),
            StartError::UnknownRepo(repo) => write!(f, "Repository {repo} has not been ingested"),
            StartError::Busy(repo) => write!(f, "An ingestion for {repo} is already running"),
        }
    }
}

impl std::error::Error for StartError {}

/// Parameters of one full run.
#[derive(Debug, Clone)]
struct FullRun {
    repo: RepoRef,
    branch: String,
    root_path: Option<String>,
    exclude: Vec<String>,
}

/// Parameters of one delta run.
#[derive(Debug, Clone)]
struct DeltaRun {
    repo: RepoRef,
    branch: String,
    before: String,
    after: String,
    root_path: Option<String>,
    exclude: Vec<String>,
}

/// Identity of the commit whose files are being chunked.
struct Snapshot<'a> {
    repo: &'a RepoRef,
    repo_key: String,
    branch: &'a str,
    commit: &'a str,
}

/// Outcome of one successfully processed file.
struct ProcessedFile {
    chunks: usize,
    size: u64,
    sha: String,
}

/// Validate `req`, claim the repository and start a full ingestion in the
/// background.
pub fn start_ingest(state: &AppState, req: &IngestRequest) -> Result<Uuid, StartError> {
    req.validate().map_err(StartError::Invalid)?;
    let run = FullRun {
        repo: req.repo_ref(),
        branch: req.branch(),
        root_path: req.root_path(),
        exclude: req.exclude.iter().map(|p| p.trim().to_string()).collect(),
    };

    let guard = state
        .guards
        .try_acquire(&run.repo.key())
        .ok_or_else(|| StartError::Busy(run.repo.clone()))?;
    let job = state.jobs.create(&run.repo, JobKind::Full);
    tracing::info!("Queued full ingestion {} of {}@{}", job.id, run.repo, run.branch);

    let state = state.clone();
    tokio::spawn(async move {
        let _guard: RepoGuard = guard;
        if let Err(e) = run_full(&state, job.id, &run).await {
            fail_run(&state, job.id, &run.repo, &run.branch, &e);
        }
    });

    Ok(job.id)
}

/// Start a delta update between two commits of an already ingested
/// repository.
pub fn start_delta(state: &AppState, repo: &RepoRef, req: &DeltaRequest) -> Result<Uuid, StartError> {
    req.validate().map_err(StartError::Invalid)?;
    let record = state
        .metadata
        .get_repo(repo)
        .ok_or_else(|| StartError::UnknownRepo(repo.clone()))?;
    let branch = req
        .branch
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(&record.branch)
        .to_string();
    let run = DeltaRun {
        repo: repo.clone(),
        branch,
        before: req.before.trim().to_string(),
        after: req.after.trim().to_string(),
        root_path: record.root_path.clone(),
        exclude: record.exclude.clone(),
    };

    let guard = state
        .guards
        .try_acquire(&repo.key())
        .ok_or_else(|| StartError::Busy(repo.clone()))?;
    let job = state.jobs.create(repo, JobKind::Delta);
    tracing::info!(
        "Queued delta update {} of {} ({}...{})",
        job.id,
        run.repo,
        run.before,
        run.after
    );

    let state = state.clone();
    tokio::spawn(async move {
        let _guard: RepoGuard = guard;
        if let Err(e) = run_delta(&state, job.id, &run).await {
            fail_run(&state, job.id, &run.repo, &run.branch, &e);
        }
    });

    Ok(job.id)
}

fn fail_run(state: &AppState, job_id: Uuid, repo: &RepoRef, branch: &str, e: &anyhow::Error) {
    let message = format!("{e:#}");
    tracing::error!("Ingestion job {job_id} for {repo} failed: {message}");
    state.jobs.fail(job_id, message.clone());
    if let Err(persist_err) = state.metadata.update_repo(repo, branch, |r| {
        r.status = IndexStatus::Error;
        r.last_error = Some(message);
    }) {
        tracing::warn!("Failed to record error status for {repo}: {persist_err:#}");
    }
}

async fn run_full(state: &AppState, job_id: Uuid, run: &FullRun) -> Result<()> {
    state.jobs.start(job_id);
    state.metadata.update_repo(&run.repo, &run.branch, |r| {
        r.branch = run.branch.clone();
        r.status = IndexStatus::Indexing;
        r.last_error = None;
        r.root_path = run.root_path.clone();
        r.exclude = run.exclude.clone();
    })?;

    let commit = state
        .host
        .resolve_commit(&run.repo, &run.branch)
        .await
        .with_context(|| format!("Failed to resolve {}@{}", run.repo, run.branch))?;
    let blobs = state
        .host
        .list_tree(&run.repo, &commit)
        .await
        .with_context(|| format!("Failed to list files of {}@{commit}", run.repo))?;
    tracing::info!("{}@{} resolved to {commit} ({} files)", run.repo, run.branch, blobs.len());

    let filter = build_filter(state, &run.repo, &commit, &blobs, run.root_path.clone(), &run.exclude).await?;
    let admitted: Vec<&BlobEntry> = blobs.iter().filter(|b| filter.admits(&b.path)).collect();

    let entries: Vec<FileEntry> = admitted.iter().map(|b| file_entry(b)).collect();
    let previous = state.trees.load(&run.repo).unwrap_or_else(|e| {
        tracing::warn!("Ignoring unreadable tree snapshot of {}: {e:#}", run.repo);
        None
    });
    let nodes = tree::build_tree(&run.repo, &entries);
    state
        .trees
        .replace(&run.repo, &nodes)
        .context("Failed to persist file tree")?;

    let (binary, text): (Vec<&BlobEntry>, Vec<&BlobEntry>) =
        admitted.iter().copied().partition(|b| filter.is_binary(&b.path, b.size));
    state.jobs.set_total(job_id, admitted.len());
    state.jobs.add_progress(job_id, 0, binary.len(), 0);

    let snapshot = Snapshot {
        repo: &run.repo,
        repo_key: run.repo.key(),
        branch: &run.branch,
        commit: &commit,
    };
    // Binary now, so nothing indexed earlier for these paths is still valid
    let binary_paths = binary.iter().map(|b| b.path.clone()).collect();
    delete_chunks(state, &snapshot.repo_key, binary_paths, "binary").await;

    let mut counts: HashMap<String, usize> = HashMap::new();
    let total_chunks = process_batches(state, job_id, &snapshot, &text, |blob, file| {
        counts.insert(blob.path.clone(), file.chunks);
    })
    .await;

    // Files indexed by an earlier run that are gone or now filtered out
    if let Some(previous) = previous {
        let current: HashSet<&str> = admitted.iter().map(|b| b.path.as_str()).collect();
        let stale = previous
            .into_iter()
            .filter(|n| n.is_file() && !current.contains(n.path.as_str()))
            .map(|n| n.path)
            .collect();
        delete_chunks(state, &snapshot.repo_key, stale, "stale").await;
    }

    state
        .trees
        .set_chunk_counts(&run.repo, &counts)
        .context("Failed to persist chunk counts")?;

    let file_count = admitted.len();
    state.metadata.update_repo(&run.repo, &run.branch, |r| {
        r.status = IndexStatus::Done;
        r.indexed_at = Some(Utc::now());
        r.last_commit = Some(commit.clone());
        r.file_count = file_count;
        r.chunk_count = total_chunks;
    })?;
    state.jobs.finish(job_id);
    tracing::info!("Indexed {} at {commit}: {file_count} files, {total_chunks} chunks", run.repo);
    Ok(())
}

async fn run_delta(state: &AppState, job_id: Uuid, run: &DeltaRun) -> Result<()> {
    state.jobs.start(job_id);
    state.metadata.update_repo(&run.repo, &run.branch, |r| {
        r.status = IndexStatus::Indexing;
        r.last_error = None;
    })?;

    let changes = state
        .host
        .compare(&run.repo, &run.before, &run.after)
        .await
        .with_context(|| format!("Failed to compare {}...{}", run.before, run.after))?;
    let blobs = state
        .host
        .list_tree(&run.repo, &run.after)
        .await
        .with_context(|| format!("Failed to list files of {}@{}", run.repo, run.after))?;
    let by_path: HashMap<&str, &BlobEntry> = blobs.iter().map(|b| (b.path.as_str(), b)).collect();
    let filter = build_filter(state, &run.repo, &run.after, &blobs, run.root_path.clone(), &run.exclude).await?;

    let mut removals: Vec<String> = Vec::new();
    let mut changed: Vec<&BlobEntry> = Vec::new();
    for change in &changes {
        match &change.status {
            ChangeStatus::Removed => {
                removals.push(change.path.clone());
                continue;
            }
            ChangeStatus::Renamed { previous } => removals.push(previous.clone()),
            ChangeStatus::Added | ChangeStatus::Modified => {}
        }
        match by_path.get(change.path.as_str()).copied() {
            Some(blob) if filter.admits(&blob.path) => changed.push(blob),
            Some(_) => {
                // Now excluded: drop whatever an earlier run indexed
                removals.push(change.path.clone());
            }
            None => tracing::warn!("{} is missing from the tree of {}", change.path, run.after),
        }
    }

    let repo_key = run.repo.key();
    delete_chunks(state, &repo_key, removals.clone(), "removed").await;

    let (binary, text): (Vec<&BlobEntry>, Vec<&BlobEntry>) =
        changed.iter().copied().partition(|b| filter.is_binary(&b.path, b.size));
    state.jobs.set_total(job_id, changed.len());
    state.jobs.add_progress(job_id, 0, binary.len(), 0);

    let snapshot = Snapshot {
        repo: &run.repo,
        repo_key: repo_key.clone(),
        branch: &run.branch,
        commit: &run.after,
    };
    // Binary now, so nothing indexed earlier for these paths is still valid
    let binary_paths = binary.iter().map(|b| b.path.clone()).collect();
    delete_chunks(state, &repo_key, binary_paths, "binary").await;
    let mut upserts: Vec<FileEntry> = binary.iter().map(|b| file_entry(b)).collect();
    let mut counts: HashMap<String, usize> = HashMap::new();
    process_batches(state, job_id, &snapshot, &text, |blob, file| {
        upserts.push(FileEntry {
            path: blob.path.clone(),
            size: file.size,
            content_hash: Some(file.sha.clone()),
            language: detect_language(&blob.path).map(str::to_string),
        });
        counts.insert(blob.path.clone(), file.chunks);
    })
    .await;

    let mut nodes = state
        .trees
        .apply_delta(&run.repo, &upserts, &removals)
        .context("Failed to patch file tree")?;
    tree::set_chunk_counts(&mut nodes, &counts);
    state
        .trees
        .set_chunk_counts(&run.repo, &counts)
        .context("Failed to persist chunk counts")?;

    let file_count = nodes.iter().filter(|n| n.is_file()).count();
    let chunk_count: usize = nodes.iter().map(|n| n.chunk_count).sum();
    state.metadata.update_repo(&run.repo, &run.branch, |r| {
        r.status = IndexStatus::Done;
        r.indexed_at = Some(Utc::now());
        r.last_commit = Some(run.after.clone());
        r.file_count = file_count;
        r.chunk_count = chunk_count;
    })?;
    state.jobs.finish(job_id);
    tracing::info!(
        "Applied delta {}...{} to {}: {} changed, {} removed",
        run.before,
        run.after,
        run.repo,
        changed.len(),
        removals.len()
    );
    Ok(())
}

/// Default excludes + the repository's `.gitignore` at `commit` (best effort)
/// + caller patterns.
async fn build_filter(
    state: &AppState,
    repo: &RepoRef,
    commit: &str,
    blobs: &[BlobEntry],
    root_path: Option<String>,
    exclude: &[String],
) -> Result<FileFilter> {
    let gitignore = if blobs.iter().any(|b| b.path == ".gitignore") {
        match state.host.fetch_file(repo, commit, ".gitignore").await {
            Ok(file) => parse_gitignore(&file.content),
            Err(e) => {
                tracing::warn!("Ignoring unreadable .gitignore of {repo}: {e:#}");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };
    let excludes = ExcludeMatcher::with_defaults(&gitignore, exclude)?;
    Ok(FileFilter::new(root_path, excludes, state.config.ingest.max_file_bytes))
}

fn file_entry(blob: &BlobEntry) -> FileEntry {
    FileEntry {
        path: blob.path.clone(),
        size: blob.size,
        content_hash: Some(blob.sha.clone()),
        language: detect_language(&blob.path).map(str::to_string),
    }
}

/// Run `files` through [`process_file`] in strict batches, recording progress
/// after each batch. `on_success` sees every file that made it into the
/// store. Returns the number of chunks written.
async fn process_batches<'a, F>(
    state: &AppState,
    job_id: Uuid,
    snapshot: &Snapshot<'_>,
    files: &[&'a BlobEntry],
    mut on_success: F,
) -> usize
where
    F: FnMut(&'a BlobEntry, &ProcessedFile),
{
    let batch_size = state.config.ingest.concurrency.max(1);
    let mut total_chunks = 0;

    for (batch_no, batch) in files.chunks(batch_size).enumerate() {
        let results = join_all(batch.iter().map(|blob| process_file(state, snapshot, &blob.path))).await;

        let (mut processed, mut skipped, mut chunks) = (0, 0, 0);
        // join_all preserves input order, so results line up with the batch
        for (blob, result) in batch.iter().zip(results) {
            match result {
                Ok(file) => {
                    processed += 1;
                    chunks += file.chunks;
                    on_success(*blob, &file);
                }
                Err(e) => {
                    skipped += 1;
                    tracing::warn!("Skipping {}: {e:#}", blob.path);
                }
            }
        }

        total_chunks += chunks;
        state.jobs.add_progress(job_id, processed, skipped, chunks);
        tracing::debug!(
            "Batch {} of {}: {processed} processed, {skipped} skipped, {chunks} chunks",
            batch_no + 1,
            snapshot.repo
        );
    }

    total_chunks
}

/// Fetch, chunk and store one file. Stale chunks of the file are always
/// deleted, even when the new content yields none.
async fn process_file(state: &AppState, snapshot: &Snapshot<'_>, path: &str) -> Result<ProcessedFile> {
    let file = state
        .host
        .fetch_file(snapshot.repo, snapshot.commit, path)
        .await
        .with_context(|| format!("Failed to fetch {path}"))?;
    let size = file.content.len() as u64;
    if size > state.config.ingest.max_file_bytes {
        anyhow::bail!("{path} is larger than {} bytes", state.config.ingest.max_file_bytes);
    }

    let language = detect_language(path).unwrap_or("text");
    let records: Vec<ChunkRecord> = chunking::chunk_content(&file.content, language, &state.config.chunking)
        .into_iter()
        .filter(|chunk| !chunk.content.trim().is_empty())
        .map(|chunk| {
            let (symbol_name, symbol_kind) = match chunk.symbol {
                Some(symbol) => (Some(symbol.name), Some(symbol.kind)),
                None => (None, None),
            };
            ChunkRecord {
                id: chunk_id(
                    &snapshot.repo_key,
                    snapshot.branch,
                    path,
                    chunk.start_line,
                    chunk.end_line,
                    &file.sha,
                ),
                text: chunk.content,
                metadata: ChunkMetadata {
                    repo: snapshot.repo_key.clone(),
                    branch: snapshot.branch.to_string(),
                    path: path.to_string(),
                    language: language.to_string(),
                    start_line: chunk.start_line,
                    end_line: chunk.end_line,
                    content_hash: file.sha.clone(),
                    symbol_name,
                    symbol_kind,
                },
            }
        })
        .collect();

    // Tantivy commits block, so keep them off the runtime
    let store = state.chunks.clone();
    let repo_key = snapshot.repo_key.clone();
    let owned_path = path.to_string();
    let chunks = tokio::task::spawn_blocking(move || -> Result<usize> {
        store
            .delete_file(&repo_key, &owned_path)
            .with_context(|| format!("Failed to delete old chunks of {owned_path}"))?;
        store
            .upsert(&records)
            .with_context(|| format!("Failed to store chunks of {owned_path}"))?;
        Ok(records.len())
    })
    .await
    .with_context(|| format!("Chunk store task for {path} panicked"))??;

    tracing::debug!("Indexed {path} ({chunks} chunks)");
    Ok(ProcessedFile {
        chunks,
        size,
        sha: file.sha,
    })
}

/// Delete every chunk of `paths` on the blocking pool. Failures are logged per
/// path and otherwise ignored.
async fn delete_chunks(state: &AppState, repo_key: &str, paths: Vec<String>, reason: &'static str) {
    if paths.is_empty() {
        return;
    }
    let store = state.chunks.clone();
    let repo_key = repo_key.to_string();
    let result = tokio::task::spawn_blocking(move || {
        for path in &paths {
            if let Err(e) = store.delete_file(&repo_key, path) {
                tracing::warn!("Failed to delete chunks of {reason} file {path}: {e:#}");
            }
        }
    })
    .await;
    if let Err(e) = result {
        tracing::error!("Chunk deletion task failed: {e}");
    }
}
