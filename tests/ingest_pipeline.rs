//! End-to-end ingestion against a scripted source host: full runs, re-runs,
//! delta updates, filtering and failure handling.

mod common;

use common::{ingest_request, readme, repo, sha, state_with, typescript_module, wait_for, FakeHost};
use repo_atlas::chunking::SymbolKind;
use repo_atlas::ingest::{self, StartError};
use repo_atlas::models::{DeltaRequest, IndexStatus, JobKind, JobState, NodeKind};
use repo_atlas::state::AppState;
use std::time::Duration;

const A_TS: &str = "export function a() {\n  return 1;\n}\n";
const B_TS: &str = "export function b() {\n  return 2;\n}\n";

fn ids(state: &AppState, path: &str) -> Vec<String> {
    state.chunks.ids(&repo().key(), Some(path)).unwrap()
}

async fn ingest(state: &AppState, branch: &str) -> repo_atlas::models::IngestJob {
    let id = ingest::start_ingest(state, &ingest_request(branch)).unwrap();
    wait_for(state, id).await
}

async fn delta(state: &AppState, before: &str, after: &str) -> repo_atlas::models::IngestJob {
    let req = DeltaRequest {
        before: before.to_string(),
        after: after.to_string(),
        branch: None,
    };
    let id = ingest::start_delta(state, &repo(), &req).unwrap();
    wait_for(state, id).await
}

#[tokio::test]
async fn test_full_ingest_populates_tree_chunks_and_record() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    host.commit("c1", &[("src/a.ts", A_TS), ("src/b.ts", B_TS), ("README.md", "# Widgets\n\nHello.\n")]);
    host.point("main", "c1");
    let state = state_with(host, dir.path());

    let job = ingest(&state, "main").await;
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.kind, JobKind::Full);
    assert_eq!(job.files_total, 3);
    assert_eq!(job.files_processed, 3);
    assert_eq!(job.files_skipped, 0);
    assert!(job.error.is_none());

    let record = state.metadata.get_repo(&repo()).unwrap();
    assert_eq!(record.status, IndexStatus::Done);
    assert_eq!(record.last_commit.as_deref(), Some("c1"));
    assert_eq!(record.file_count, 3);
    assert_eq!(record.chunk_count, job.chunks_produced);

    let tree = state.trees.load(&repo()).unwrap().unwrap();
    let root = &tree[0];
    assert_eq!(root.path, "/");
    assert_eq!(root.cumulative_file_count, 3);
    let a = tree.iter().find(|n| n.path == "src/a.ts").unwrap();
    assert_eq!(a.kind, NodeKind::File);
    assert_eq!(a.language.as_deref(), Some("typescript"));
    assert_eq!(a.content_hash.as_deref(), Some(sha(A_TS).as_str()));
    assert_eq!(a.chunk_count, ids(&state, "src/a.ts").len());
    assert!(a.has_chunks);
}

#[tokio::test]
async fn test_reingest_unchanged_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    host.commit("c1", &[("src/a.ts", A_TS), ("src/b.ts", B_TS)]);
    host.point("main", "c1");
    let state = state_with(host, dir.path());

    ingest(&state, "main").await;
    let first_ids = state.chunks.ids(&repo().key(), None).unwrap();
    let first_tree = state.trees.load(&repo()).unwrap().unwrap();

    ingest(&state, "main").await;
    let second_ids = state.chunks.ids(&repo().key(), None).unwrap();
    let second_tree = state.trees.load(&repo()).unwrap().unwrap();

    assert!(!first_ids.is_empty());
    assert_eq!(first_ids, second_ids);
    assert_eq!(first_tree, second_tree);
}

#[tokio::test]
async fn test_edit_changes_only_that_files_ids() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    host.commit("c1", &[("src/a.ts", A_TS), ("src/b.ts", B_TS), ("old.ts", B_TS)]);
    host.commit(
        "c2",
        &[("src/a.ts", "export function a() {\n  return 42;\n}\n"), ("src/b.ts", B_TS)],
    );
    host.point("main", "c1");
    let state = state_with(host.clone(), dir.path());

    ingest(&state, "main").await;
    let a_before = ids(&state, "src/a.ts");
    let b_before = ids(&state, "src/b.ts");
    assert!(!ids(&state, "old.ts").is_empty());

    host.point("main", "c2");
    ingest(&state, "main").await;
    let a_after = ids(&state, "src/a.ts");

    assert!(!a_after.is_empty());
    assert!(a_before.iter().all(|id| !a_after.contains(id)));
    assert_eq!(ids(&state, "src/b.ts"), b_before);
    // Gone from the new tree, so gone from the store
    assert!(ids(&state, "old.ts").is_empty());
    for id in &a_before {
        assert!(state.chunks.get(id).unwrap().is_none());
    }
}

#[tokio::test]
async fn test_delta_removal_deletes_chunks_and_patches_tree() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    host.commit("c1", &[("src/a.ts", A_TS), ("src/b.ts", B_TS), ("docs/guide.md", "# Guide\n")]);
    host.commit("c2", &[("src/a.ts", A_TS), ("src/b.ts", B_TS)]);
    host.point("main", "c1");
    let state = state_with(host, dir.path());

    ingest(&state, "main").await;
    let a_before = ids(&state, "src/a.ts");
    assert!(!ids(&state, "docs/guide.md").is_empty());

    let job = delta(&state, "c1", "c2").await;
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.kind, JobKind::Delta);
    assert_eq!(job.files_processed, 0);

    assert!(ids(&state, "docs/guide.md").is_empty());
    assert_eq!(ids(&state, "src/a.ts"), a_before);

    let tree = state.trees.load(&repo()).unwrap().unwrap();
    assert!(tree.iter().all(|n| n.path != "docs/guide.md" && n.path != "docs"));
    assert_eq!(tree[0].cumulative_file_count, 2);

    let record = state.metadata.get_repo(&repo()).unwrap();
    assert_eq!(record.last_commit.as_deref(), Some("c2"));
    assert_eq!(record.file_count, 2);
}

#[tokio::test]
async fn test_delta_modification_and_addition() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    let b_v2 = "export function b() {\n  return 3;\n}\n";
    host.commit("c1", &[("src/a.ts", A_TS), ("src/b.ts", B_TS)]);
    host.commit("c2", &[("src/a.ts", A_TS), ("src/b.ts", b_v2), ("src/c.ts", A_TS)]);
    host.point("main", "c1");
    let state = state_with(host, dir.path());

    ingest(&state, "main").await;
    let a_before = ids(&state, "src/a.ts");
    let b_before = ids(&state, "src/b.ts");

    let job = delta(&state, "c1", "c2").await;
    assert_eq!(job.files_total, 2);
    assert_eq!(job.files_processed, 2);

    let b_after = ids(&state, "src/b.ts");
    assert!(!b_after.is_empty());
    assert!(b_before.iter().all(|id| !b_after.contains(id)));
    assert_eq!(ids(&state, "src/a.ts"), a_before);
    assert!(!ids(&state, "src/c.ts").is_empty());

    let tree = state.trees.load(&repo()).unwrap().unwrap();
    let b = tree.iter().find(|n| n.path == "src/b.ts").unwrap();
    assert_eq!(b.content_hash.as_deref(), Some(sha(b_v2).as_str()));
    assert_eq!(b.chunk_count, b_after.len());
    let src = tree.iter().find(|n| n.path == "src").unwrap();
    assert_eq!(src.cumulative_file_count, 3);
    assert_eq!(
        src.cumulative_size,
        (A_TS.len() + b_v2.len() + A_TS.len()) as u64
    );
}

#[tokio::test]
async fn test_delta_requires_ingested_repo() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(FakeHost::new(), dir.path());
    let req = DeltaRequest {
        before: "c1".to_string(),
        after: "c2".to_string(),
        branch: None,
    };
    assert!(matches!(
        ingest::start_delta(&state, &repo(), &req),
        Err(StartError::UnknownRepo(_))
    ));
}

#[tokio::test]
async fn test_unresolvable_branch_fails_job_and_repo() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(FakeHost::new(), dir.path());

    let job = ingest(&state, "missing").await;
    assert_eq!(job.state, JobState::Error);
    assert!(job.error.as_deref().unwrap().contains("missing"));
    assert!(job.finished_at.is_some());

    let record = state.metadata.get_repo(&repo()).unwrap();
    assert_eq!(record.status, IndexStatus::Error);
    assert!(record.last_error.is_some());
}

#[tokio::test]
async fn test_per_file_failure_is_counted_as_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    host.commit("c1", &[("src/a.ts", A_TS), ("src/b.ts", B_TS), ("src/c.ts", A_TS)]);
    host.point("main", "c1");
    host.break_file("src/b.ts");
    let state = state_with(host, dir.path());

    let job = ingest(&state, "main").await;
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.files_processed, 2);
    assert_eq!(job.files_skipped, 1);
    assert!(ids(&state, "src/b.ts").is_empty());

    let tree = state.trees.load(&repo()).unwrap().unwrap();
    let b = tree.iter().find(|n| n.path == "src/b.ts").unwrap();
    assert!(!b.has_chunks);
}

#[tokio::test]
async fn test_excludes_gitignore_and_binaries() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    host.commit(
        "c1",
        &[
            (".gitignore", "# local\n/secrets/\n"),
            ("src/a.ts", A_TS),
            ("node_modules/left-pad/index.js", "module.exports = 1;\n"),
            ("dist/bundle.min.js", "x\n"),
            ("secrets/key.ts", "export const KEY = 1;\n"),
            ("assets/logo.png", "not really a png"),
            ("generated/api.ts", A_TS),
        ],
    );
    host.point("main", "c1");
    let state = state_with(host, dir.path());

    let mut req = ingest_request("main");
    req.exclude = vec!["generated/*".to_string()];
    let id = ingest::start_ingest(&state, &req).unwrap();
    let job = wait_for(&state, id).await;

    let tree = state.trees.load(&repo()).unwrap().unwrap();
    let paths: Vec<&str> = tree.iter().map(|n| n.path.as_str()).collect();
    for excluded in ["node_modules", "dist/bundle.min.js", "secrets/key.ts", "generated/api.ts"] {
        assert!(!paths.iter().any(|p| p.starts_with(excluded)), "{excluded} should be excluded");
        assert!(ids(&state, excluded).is_empty());
    }
    assert!(paths.contains(&"assets/logo.png"));
    assert!(ids(&state, "assets/logo.png").is_empty());

    // .gitignore, src/a.ts and the binary
    assert_eq!(job.files_total, 3);
    assert_eq!(job.files_skipped, 1);
    assert_eq!(job.files_processed, 2);

    let record = state.metadata.get_repo(&repo()).unwrap();
    assert_eq!(record.exclude, vec!["generated/*".to_string()]);
}

#[tokio::test]
async fn test_root_path_restricts_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    host.commit("c1", &[("src/a.ts", A_TS), ("docs/intro.md", "# Intro\n")]);
    host.point("main", "c1");
    let state = state_with(host, dir.path());

    let mut req = ingest_request("main");
    req.root_path = Some("/src/".to_string());
    let id = ingest::start_ingest(&state, &req).unwrap();
    let job = wait_for(&state, id).await;

    assert_eq!(job.files_total, 1);
    assert!(ids(&state, "docs/intro.md").is_empty());
    let record = state.metadata.get_repo(&repo()).unwrap();
    assert_eq!(record.root_path.as_deref(), Some("src"));
}

#[tokio::test]
async fn test_concurrent_run_for_same_repo_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    host.commit("c1", &[("src/a.ts", A_TS)]);
    host.point("main", "c1");
    let state = state_with(host, dir.path());

    let held = state.guards.try_acquire(&repo().key()).unwrap();
    assert!(matches!(
        ingest::start_ingest(&state, &ingest_request("main")),
        Err(StartError::Busy(_))
    ));
    drop(held);

    let job = ingest(&state, "main").await;
    assert_eq!(job.state, JobState::Done);
}

#[tokio::test]
async fn test_invalid_request_creates_no_job() {
    let dir = tempfile::tempdir().unwrap();
    let state = state_with(FakeHost::new(), dir.path());
    let mut req = ingest_request("main");
    req.owner = "../etc".to_string();
    assert!(matches!(ingest::start_ingest(&state, &req), Err(StartError::Invalid(_))));
    assert!(state.metadata.list_repos().is_empty());
}

#[tokio::test]
async fn test_typescript_and_readme_chunking() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    let titles = ["Overview", "Install", "Usage", "Configuration", "License"];
    let module = typescript_module();
    let doc = readme(&titles);
    host.commit("c1", &[("src/a.ts", module.as_str()), ("README.md", doc.as_str())]);
    host.point("main", "c1");
    let state = state_with(host, dir.path());

    let job = ingest(&state, "main").await;
    assert_eq!(job.state, JobState::Done);

    let chunks_of = |path: &str| {
        let mut chunks: Vec<_> = ids(&state, path)
            .iter()
            .map(|id| state.chunks.get(id).unwrap().unwrap())
            .collect();
        chunks.sort_by_key(|c| c.metadata.start_line);
        chunks
    };

    let ts = chunks_of("src/a.ts");
    assert!(!ts.is_empty());
    let first = &ts[0];
    assert_eq!(first.metadata.start_line, 1);
    assert_eq!(first.metadata.end_line, 40);
    assert_eq!(first.metadata.symbol_name.as_deref(), Some("handleRequest"));
    assert_eq!(first.metadata.symbol_kind, Some(SymbolKind::Function));
    for chunk in &ts {
        if let Some(name) = &chunk.metadata.symbol_name {
            assert!(chunk.text.contains(&format!("function {name}")));
        }
    }
    assert_eq!(ts.last().unwrap().metadata.end_line, 120);

    let md = chunks_of("README.md");
    assert_eq!(md.len(), titles.len());
    for (chunk, title) in md.iter().zip(titles) {
        assert_eq!(chunk.metadata.symbol_name.as_deref(), Some(title));
        assert_eq!(chunk.metadata.symbol_kind, Some(SymbolKind::Section));
        assert_eq!(chunk.metadata.language, "markdown");
    }
}

#[tokio::test]
async fn test_file_turned_binary_loses_its_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    let grown = format!("export const blob = \"{}\";\n", "x".repeat(3600));
    host.commit("c1", &[("src/a.ts", A_TS), ("src/b.ts", B_TS)]);
    host.commit("c2", &[("src/a.ts", grown.as_str()), ("src/b.ts", B_TS)]);
    host.point("main", "c1");
    let mut state = state_with(host.clone(), dir.path());
    state.config.ingest.max_file_bytes = 1024;

    ingest(&state, "main").await;
    let before = ids(&state, "src/a.ts");
    assert!(!before.is_empty());

    host.point("main", "c2");
    let job = ingest(&state, "main").await;
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.files_skipped, 1);
    assert!(ids(&state, "src/a.ts").is_empty());
    for id in &before {
        assert!(state.chunks.get(id).unwrap().is_none());
    }
    assert!(!ids(&state, "src/b.ts").is_empty());

    let tree = state.trees.load(&repo()).unwrap().unwrap();
    let a = tree.iter().find(|n| n.path == "src/a.ts").unwrap();
    assert_eq!(a.content_hash.as_deref(), Some(sha(&grown).as_str()));
    assert_eq!(a.chunk_count, 0);
    assert!(!a.has_chunks);
}

#[tokio::test]
async fn test_progress_is_recorded_per_batch() {
    let dir = tempfile::tempdir().unwrap();
    let host = FakeHost::new();
    let files: Vec<(String, String)> = (0..5)
        .map(|i| (format!("src/f{i}.ts"), format!("export function f{i}() {{\n  return {i};\n}}\n")))
        .collect();
    let snapshot: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    host.commit("c1", &snapshot);
    host.point("main", "c1");
    host.slow_down(Duration::from_millis(60));
    // concurrency 2: batches of 2, 2 and 1
    let state = state_with(host, dir.path());

    let id = ingest::start_ingest(&state, &ingest_request("main")).unwrap();
    let mut seen = Vec::new();
    loop {
        let job = state.jobs.get(id).unwrap();
        if seen.last() != Some(&job.files_processed) {
            seen.push(job.files_processed);
        }
        if job.state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let job = wait_for(&state, id).await;

    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.files_total, 5);
    assert_eq!(job.files_processed + job.files_skipped, 5);
    assert_eq!(job.chunks_produced, state.chunks.ids(&repo().key(), None).unwrap().len());
    // Counts only move at batch boundaries
    assert!(seen.iter().all(|n| [0, 2, 4, 5].contains(n)), "observed {seen:?}");
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "observed {seen:?}");
    assert!(seen.contains(&2) || seen.contains(&4), "no intermediate progress in {seen:?}");
}
