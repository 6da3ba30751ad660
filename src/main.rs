use axum::routing::{delete, get, post};
use axum::Router;
use tracing_subscriber::EnvFilter;

use repo_atlas::api;
use repo_atlas::config::Config;
use repo_atlas::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    tracing::info!("Data directory: {}", config.data_dir.display());
    match &config.local_repo {
        Some(path) => tracing::info!("Source host: local checkout {}", path.display()),
        None => tracing::info!("Source host: {}", config.github.api_url),
    }

    let state = AppState::new(config.clone())?;

    let app = Router::new()
        .route("/api/ingest", post(api::ingest::start_ingest))
        .route("/api/jobs/{id}", get(api::ingest::get_job))
        .route("/api/repos", get(api::repos::list_repos))
        .route("/api/repos/{owner}/{name}", get(api::repos::get_repo))
        .route("/api/repos/{owner}/{name}/tree", get(api::repos::get_tree))
        .route("/api/repos/{owner}/{name}/delta", post(api::ingest::start_delta))
        .route("/api/repos/{owner}/{name}/diagram", post(api::diagrams::repo_diagram))
        .route(
            "/api/repos/{owner}/{name}/presets",
            get(api::diagrams::list_presets).put(api::diagrams::put_preset),
        )
        .route(
            "/api/repos/{owner}/{name}/presets/{preset}",
            delete(api::diagrams::delete_preset),
        )
        .route("/api/diagram", post(api::diagrams::conceptual_diagram))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
