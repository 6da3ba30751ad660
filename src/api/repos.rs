use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::models::{RepoRecord, TreeNode};
use crate::state::AppState;

/// GET /api/repos - All known repositories, most recently added first
pub async fn list_repos(State(state): State<AppState>) -> Json<Vec<RepoRecord>> {
    let mut repos = state.metadata.list_repos();
    repos.sort_by(|a, b| b.added_at.cmp(&a.added_at));
    Json(repos)
}

/// GET /api/repos/{owner}/{name}
pub async fn get_repo(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Json<RepoRecord>, (StatusCode, String)> {
    let repo = super::repo_from_path(&owner, &name)?;
    state
        .metadata
        .get_repo(&repo)
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Repository {repo} not found")))
}

/// GET /api/repos/{owner}/{name}/tree - Persisted file tree, root first
pub async fn get_tree(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Json<Vec<TreeNode>>, (StatusCode, String)> {
    let repo = super::repo_from_path(&owner, &name)?;
    match state.trees.load(&repo) {
        Ok(Some(nodes)) => Ok(Json(nodes)),
        Ok(None) => Err((StatusCode::NOT_FOUND, format!("No tree for {repo}"))),
        Err(e) => {
            tracing::error!("Failed to load tree of {repo}: {e:#}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
        }
    }
}
