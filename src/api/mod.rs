//! Axum handlers. Routes are wired up in `main.rs`.

pub mod diagrams;
pub mod ingest;
pub mod repos;

use axum::http::StatusCode;

use crate::models::{validate_segment, RepoRef};

/// Repository reference from `/{owner}/{name}` path segments.
pub(crate) fn repo_from_path(owner: &str, name: &str) -> Result<RepoRef, (StatusCode, String)> {
    validate_segment("owner", owner).map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    validate_segment("name", name).map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    Ok(RepoRef::new(owner.trim(), name.trim()))
}
