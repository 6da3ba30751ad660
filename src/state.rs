use std::sync::Arc;

use crate::config::Config;
use crate::git::github::GithubHost;
use crate::git::local::LocalGitHost;
use crate::git::SourceHost;
use crate::ingest::guard::RepoGuards;
use crate::ingest::jobs::JobRegistry;
use crate::store::chunks::{ChunkStore, TantivyChunkStore};
use crate::store::metadata::MetadataStore;
use crate::store::tree::TreeStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub metadata: Arc<MetadataStore>,
    pub trees: Arc<TreeStore>,
    pub chunks: Arc<dyn ChunkStore>,
    pub host: Arc<dyn SourceHost>,
    pub jobs: Arc<JobRegistry>,
    pub guards: Arc<RepoGuards>,
}

impl AppState {
    /// State backed by the host selected in `config`: a local checkout when
    /// `local_repo` is set, GitHub otherwise.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let host: Arc<dyn SourceHost> = match &config.local_repo {
            Some(path) => Arc::new(LocalGitHost::new(path)),
            None => Arc::new(GithubHost::new(&config.github)?),
        };
        Self::with_host(config, host)
    }

    pub fn with_host(config: Config, host: Arc<dyn SourceHost>) -> anyhow::Result<Self> {
        // Ensure data directories exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(config.index_dir())?;

        let metadata = MetadataStore::open(&config.db_path())?;
        let trees = TreeStore::open(&config.trees_dir())?;
        let chunks = TantivyChunkStore::open_or_create(&config.index_dir())?;
        let jobs = JobRegistry::new(config.ingest.job_ttl_secs, config.ingest.job_capacity);

        Ok(Self {
            config,
            metadata: Arc::new(metadata),
            trees: Arc::new(trees),
            chunks: Arc::new(chunks),
            host,
            jobs: Arc::new(jobs),
            guards: Arc::new(RepoGuards::default()),
        })
    }
}
