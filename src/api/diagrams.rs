use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;

use crate::diagram::{self, filter, Diagram, DiagramError, DiagramFilters, DiagramKind, LayoutKind};
use crate::models::{ConceptualRequest, DiagramPreset, DiagramRequest, PresetRequest, RepoRef};
use crate::state::AppState;

fn diagram_error(e: DiagramError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn require_repo(state: &AppState, repo: &RepoRef) -> Result<(), (StatusCode, String)> {
    if state.metadata.get_repo(repo).is_none() {
        return Err((StatusCode::NOT_FOUND, format!("Repository {repo} not found")));
    }
    Ok(())
}

/// POST /api/repos/{owner}/{name}/diagram - Lay out the repository's file tree
pub async fn repo_diagram(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<DiagramRequest>,
) -> Result<Json<Diagram>, (StatusCode, String)> {
    let repo = super::repo_from_path(&owner, &name)?;

    let mut layout: Option<LayoutKind> = None;
    let mut filters = DiagramFilters::default();
    if let Some(preset_name) = req.preset.as_deref() {
        let preset = state
            .metadata
            .get_preset(&repo, preset_name)
            .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Preset '{preset_name}' not found")))?;
        if !preset.kind.is_file_tree() {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("Preset '{preset_name}' is a {} diagram", preset.kind),
            ));
        }
        layout = preset.layout;
        filters = preset.filters;
    }
    if req.layout.is_some() {
        layout = req.layout;
    }
    if let Some(f) = req.filters {
        filters = f;
    }

    let nodes = match state.trees.load(&repo) {
        Ok(Some(nodes)) => nodes,
        Ok(None) => return Err((StatusCode::NOT_FOUND, format!("No tree for {repo}"))),
        Err(e) => {
            tracing::error!("Failed to load tree of {repo}: {e:#}");
            return Err((StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")));
        }
    };

    let diagram = diagram::tree_diagram(&nodes, layout, &filters).map_err(diagram_error)?;
    tracing::debug!(
        "Rendered {} diagram of {repo}: {} nodes, {} edges",
        diagram.layout,
        diagram.stats.node_count,
        diagram.stats.edge_count
    );
    Ok(Json(diagram))
}

/// POST /api/diagram - Lay out caller-supplied entities and relationships
pub async fn conceptual_diagram(Json(req): Json<ConceptualRequest>) -> Result<Json<Diagram>, (StatusCode, String)> {
    if req.kind == DiagramKind::FileTree {
        return Err((
            StatusCode::BAD_REQUEST,
            "file_tree diagrams are rendered from an ingested repository".to_string(),
        ));
    }
    diagram::conceptual_diagram(req.kind, req.layout, &req.entities, &req.relationships, &req.filters)
        .map(Json)
        .map_err(diagram_error)
}

/// GET /api/repos/{owner}/{name}/presets
pub async fn list_presets(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
) -> Result<Json<Vec<DiagramPreset>>, (StatusCode, String)> {
    let repo = super::repo_from_path(&owner, &name)?;
    require_repo(&state, &repo)?;
    let mut presets = state.metadata.list_presets(&repo);
    presets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(presets))
}

/// PUT /api/repos/{owner}/{name}/presets - Create or replace a preset by name
pub async fn put_preset(
    State(state): State<AppState>,
    Path((owner, name)): Path<(String, String)>,
    Json(req): Json<PresetRequest>,
) -> Result<Json<DiagramPreset>, (StatusCode, String)> {
    let repo = super::repo_from_path(&owner, &name)?;
    require_repo(&state, &repo)?;

    let preset_name = req.name.trim();
    if preset_name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Preset name is required".to_string()));
    }
    diagram::resolve_layout(req.kind, req.layout).map_err(diagram_error)?;
    filter::validate(&req.filters).map_err(diagram_error)?;

    let preset = DiagramPreset {
        repo: repo.key(),
        name: preset_name.to_string(),
        kind: req.kind,
        layout: req.layout,
        filters: req.filters,
        updated_at: Utc::now(),
    };
    state.metadata.upsert_preset(preset.clone()).map_err(|e| {
        tracing::error!("Failed to save preset {preset_name} for {repo}: {e:#}");
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
    })?;
    Ok(Json(preset))
}

/// DELETE /api/repos/{owner}/{name}/presets/{preset}
pub async fn delete_preset(
    State(state): State<AppState>,
    Path((owner, name, preset)): Path<(String, String, String)>,
) -> Result<StatusCode, (StatusCode, String)> {
    let repo = super::repo_from_path(&owner, &name)?;
    match state.metadata.delete_preset(&repo, &preset) {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err((StatusCode::NOT_FOUND, format!("Preset '{preset}' not found"))),
        Err(e) => {
            tracing::error!("Failed to delete preset {preset} of {repo}: {e:#}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}")))
        }
    }
}
